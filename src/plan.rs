//! Shot plan: what one capture session should produce.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Capture directory used when no output root is given.
pub const DEFAULT_CAPTURE_ROOT: &str = "/home/pi/captures";

/// Parameters of a single capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotPlan {
    subject: String,
    frame_count: u32,
    exposure_secs: f64,
    output_root: PathBuf,
}

impl ShotPlan {
    /// Plan a single one-second frame of `subject` under the default root.
    pub fn new<S: Into<String>>(subject: S) -> Self {
        Self {
            subject: subject.into(),
            frame_count: 1,
            exposure_secs: 1.0,
            output_root: PathBuf::from(DEFAULT_CAPTURE_ROOT),
        }
    }

    /// Set the number of frames.
    #[must_use]
    pub const fn with_frames(mut self, frame_count: u32) -> Self {
        self.frame_count = frame_count;
        self
    }

    /// Set the per-frame exposure in seconds.
    #[must_use]
    pub const fn with_exposure_secs(mut self, exposure_secs: f64) -> Self {
        self.exposure_secs = exposure_secs;
        self
    }

    /// Set the directory that session folders are created under.
    #[must_use]
    pub fn with_output_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.output_root = root.into();
        self
    }

    /// Name of the photographed object.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Number of frames to capture.
    pub const fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Per-frame exposure in seconds.
    pub const fn exposure_secs(&self) -> f64 {
        self.exposure_secs
    }

    /// Per-frame exposure, or `None` if it is not a positive finite number.
    pub fn exposure(&self) -> Option<Duration> {
        if self.exposure_secs > 0.0 {
            Duration::try_from_secs_f64(self.exposure_secs).ok()
        } else {
            None
        }
    }

    /// Root directory for captured files.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let plan = ShotPlan::new("M31");
        assert_eq!(plan.subject(), "M31");
        assert_eq!(plan.frame_count(), 1);
        assert_eq!(plan.exposure(), Some(Duration::from_secs(1)));
        assert_eq!(plan.output_root(), Path::new(DEFAULT_CAPTURE_ROOT));
    }

    #[test]
    fn test_exposure_rejects_non_positive() {
        assert_eq!(ShotPlan::new("M31").with_exposure_secs(0.0).exposure(), None);
        assert_eq!(ShotPlan::new("M31").with_exposure_secs(-5.0).exposure(), None);
        assert_eq!(
            ShotPlan::new("M31").with_exposure_secs(f64::NAN).exposure(),
            None
        );
        assert_eq!(
            ShotPlan::new("M31")
                .with_exposure_secs(f64::INFINITY)
                .exposure(),
            None
        );
    }

    #[test]
    fn test_fractional_exposure() {
        let plan = ShotPlan::new("Moon").with_exposure_secs(0.25);
        assert_eq!(plan.exposure(), Some(Duration::from_millis(250)));
    }
}
