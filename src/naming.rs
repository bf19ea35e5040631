//! Output path construction for captured frames.
//!
//! Every frame lands at
//!
//! ```text
//! <output_root>/<YYYY-MM-DD>/<subject>/<name>
//! <name> = ISO<iso>-f<aperture>-<exposure>s-<focal>mm-<timestamp>.<ext>
//! ```
//!
//! Downstream stacking tools rely on this layout, so it must not change.

use std::path::{Component, Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::plan::ShotPlan;
use crate::settings::{CameraConfig, APERTURE, IMAGE_FORMAT, ISO};

/// Format of the per-session date directory.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Format of the per-frame timestamp in file names.
pub const TIMESTAMP_FORMAT: &str = "%m-%d-%y_%H:%M:%S";
/// Extension of raw frames (Canon CR2).
pub const RAW_EXTENSION: &str = "cr2";
/// Extension of JPEG frames.
pub const JPEG_EXTENSION: &str = "jpg";

/// Errors raised while deriving output paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The output root is empty.
    #[error("output root is empty")]
    EmptyRoot,
    /// The output root walks up the directory tree.
    #[error("output root {} contains a parent-directory component", .0.display())]
    UnsafeRoot(PathBuf),
    /// The subject cannot be turned into a single directory name.
    #[error("subject name {0:?} cannot be used as a directory name")]
    UnsafeSubject(String),
    /// A setting used in file names is missing.
    #[error("configuration has no {0} setting")]
    MissingSetting(&'static str),
}

/// Reject output roots that are empty or contain `..`.
pub fn check_output_root(root: &Path) -> Result<(), PathError> {
    if root.as_os_str().is_empty() {
        return Err(PathError::EmptyRoot);
    }
    if root
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(PathError::UnsafeRoot(root.to_path_buf()));
    }
    Ok(())
}

/// Turn a subject name into exactly one safe path component.
///
/// Separators, control characters and `%` are replaced with `_`. Names that
/// end up empty, `.` or `..` are rejected.
pub fn sanitize_subject(subject: &str) -> Result<String, PathError> {
    let sanitized = sanitize_component(subject.trim());
    let mut components = Path::new(&sanitized).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(sanitized),
        _ => Err(PathError::UnsafeSubject(subject.to_owned())),
    }
}

/// Replace characters that must not appear inside a single file name.
fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '%' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Aperture without its `f/` prefix (`f/5.6` becomes `5.6`).
pub fn aperture_label(value: &str) -> &str {
    let value = value.trim();
    let value = value
        .strip_prefix('f')
        .or_else(|| value.strip_prefix('F'))
        .unwrap_or(value);
    value.strip_prefix('/').unwrap_or(value)
}

/// Exposure seconds in shortest decimal form (`30`, `2.5`).
pub fn exposure_label(exposure_secs: f64) -> String {
    format!("{exposure_secs}")
}

/// File extension implied by the camera's image format.
pub fn extension_for(image_format: Option<&str>) -> &'static str {
    match image_format {
        Some(format) if format.to_ascii_uppercase().contains("RAW") => RAW_EXTENSION,
        _ => JPEG_EXTENSION,
    }
}

/// Builds unique frame paths for one session.
///
/// Apart from the timestamp, every path is fully determined by the
/// configuration, the shot plan and the session date. Timestamps never go
/// backwards, and frames that share a timestamp get their sequence index
/// appended.
#[derive(Debug, Clone)]
pub struct FrameNamer {
    session_dir: PathBuf,
    prefix: String,
    extension: &'static str,
    last: Option<NaiveDateTime>,
}

impl FrameNamer {
    /// Prepare naming for a session started on `session_date`.
    pub fn new(
        config: &CameraConfig,
        plan: &ShotPlan,
        session_date: NaiveDate,
    ) -> Result<Self, PathError> {
        check_output_root(plan.output_root())?;
        let subject = sanitize_subject(plan.subject())?;

        let iso = config.current(ISO).ok_or(PathError::MissingSetting(ISO))?;
        let aperture = config
            .current(APERTURE)
            .ok_or(PathError::MissingSetting(APERTURE))?;

        let prefix = sanitize_component(&format!(
            "ISO{iso}-f{}-{}s-{}mm",
            aperture_label(aperture),
            exposure_label(plan.exposure_secs()),
            config.focal_length_mm()
        ));

        let session_dir = plan
            .output_root()
            .join(session_date.format(DATE_FORMAT).to_string())
            .join(subject);

        Ok(Self {
            session_dir,
            prefix,
            extension: extension_for(config.current(IMAGE_FORMAT)),
            last: None,
        })
    }

    /// Directory all frames of this session are written to.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Path for frame `index` captured at `captured_at`.
    pub fn path_for(&mut self, captured_at: NaiveDateTime, index: u32) -> PathBuf {
        let at = match self.last {
            Some(last) if captured_at < last => last,
            _ => captured_at,
        };
        let stamp = at.format(TIMESTAMP_FORMAT).to_string();
        let collides = self
            .last
            .is_some_and(|last| last.format(TIMESTAMP_FORMAT).to_string() == stamp);
        self.last = Some(at);

        let name = if collides {
            format!("{}-{stamp}-{index:03}.{}", self.prefix, self.extension)
        } else {
            format!("{}-{stamp}.{}", self.prefix, self.extension)
        };
        self.session_dir.join(name)
    }
}
