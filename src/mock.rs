//! Scripted device and fixed clock for testing without a camera.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};

use crate::settings::ISO;
use crate::traits::{
    Clock, ExposureDevice, ExposureRequest, ExposureResult, FailureKind, FrameFailure,
};

/// What the scripted device does on one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Report success.
    Succeed,
    /// Report a failure of the given kind.
    Fail(FailureKind),
    /// Sleep, then report success.
    Stall(Duration),
}

/// A request as seen by the scripted device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Requested target path.
    pub path: PathBuf,
    /// Requested exposure.
    pub exposure: Duration,
    /// Requested deadline.
    pub deadline: Duration,
    /// ISO value the device was asked to use.
    pub iso: Option<String>,
}

/// Device that replays a script of outcomes.
///
/// Once the script runs out, every further call uses the fallback step.
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    script: VecDeque<Step>,
    fallback: Step,
    fail_directories: bool,
    calls: Vec<RecordedCall>,
    prepared_dirs: Vec<PathBuf>,
}

impl ScriptedDevice {
    /// Device whose calls all succeed.
    #[must_use]
    pub fn always_succeed() -> Self {
        Self::with_fallback(Step::Succeed)
    }

    /// Device whose calls all fail as a disconnected camera would.
    #[must_use]
    pub fn always_fail() -> Self {
        Self::with_fallback(Step::Fail(FailureKind::Device))
    }

    /// Device that plays `steps` in order, then succeeds.
    #[must_use]
    pub fn with_script<I: IntoIterator<Item = Step>>(steps: I) -> Self {
        let mut device = Self::always_succeed();
        device.script = steps.into_iter().collect();
        device
    }

    const fn with_fallback(fallback: Step) -> Self {
        Self {
            script: VecDeque::new(),
            fallback,
            fail_directories: false,
            calls: Vec::new(),
            prepared_dirs: Vec::new(),
        }
    }

    /// Make directory preparation fail.
    #[must_use]
    pub const fn failing_directories(mut self) -> Self {
        self.fail_directories = true;
        self
    }

    /// Exposure requests received so far.
    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    /// Directories the session asked to prepare.
    pub fn prepared_dirs(&self) -> &[PathBuf] {
        &self.prepared_dirs
    }
}

impl ExposureDevice for ScriptedDevice {
    fn expose_and_download(&mut self, request: &ExposureRequest<'_>) -> ExposureResult {
        self.calls.push(RecordedCall {
            path: request.path.to_path_buf(),
            exposure: request.exposure,
            deadline: request.deadline,
            iso: request.settings.current(ISO).map(str::to_owned),
        });

        match self.script.pop_front().unwrap_or(self.fallback) {
            Step::Succeed => Ok(()),
            Step::Fail(kind) => Err(FrameFailure::new(kind, "scripted failure")
                .with_stderr("*** Error: scripted ***")
                .with_exit_code(1)),
            Step::Stall(pause) => {
                thread::sleep(pause);
                Ok(())
            }
        }
    }

    fn prepare_directory(&mut self, dir: &Path) -> ExposureResult {
        self.prepared_dirs.push(dir.to_path_buf());
        if self.fail_directories {
            return Err(FrameFailure::new(
                FailureKind::Filesystem,
                format!("cannot create {}", dir.display()),
            ));
        }
        Ok(())
    }
}

/// Clock that always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Clock frozen at the given local date and time.
    ///
    /// # Panics
    ///
    /// Panics if the date or time is invalid.
    #[must_use]
    pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        let time = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, min, sec))
            .expect("valid fixed clock time");
        Self(time)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CameraConfig;

    fn request<'a>(path: &'a Path, config: &'a CameraConfig) -> ExposureRequest<'a> {
        ExposureRequest {
            path,
            exposure: Duration::from_secs(1),
            deadline: Duration::from_secs(11),
            settings: config,
        }
    }

    #[test]
    fn test_script_then_fallback() {
        let config = CameraConfig::default();
        let path = PathBuf::from("/tmp/frame.cr2");
        let mut device = ScriptedDevice::with_script([Step::Fail(FailureKind::Transfer)]);

        let first = device
            .expose_and_download(&request(&path, &config))
            .expect_err("scripted failure");
        assert_eq!(first.kind, FailureKind::Transfer);
        assert!(device.expose_and_download(&request(&path, &config)).is_ok());
        assert_eq!(device.calls().len(), 2);
    }

    #[test]
    fn test_always_fail() {
        let config = CameraConfig::default();
        let path = PathBuf::from("/tmp/frame.cr2");
        let mut device = ScriptedDevice::always_fail();

        for _ in 0..3 {
            assert!(device.expose_and_download(&request(&path, &config)).is_err());
        }
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::at(2024, 1, 2, 3, 4, 5);
        assert_eq!(clock.now().to_string(), "2024-01-02 03:04:05");
    }
}
