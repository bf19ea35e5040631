//! Core traits and types for the device command boundary.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use crate::naming::PathError;
use crate::settings::CameraConfig;

/// Parameters of a single expose-and-download operation.
#[derive(Debug, Clone, Copy)]
pub struct ExposureRequest<'a> {
    /// Where the downloaded frame must be written.
    pub path: &'a Path,
    /// How long the shutter is held open.
    pub exposure: Duration,
    /// Upper bound for the whole operation, exposure plus transfer margin.
    pub deadline: Duration,
    /// Camera and lens settings resolved for this session.
    pub settings: &'a CameraConfig,
}

/// Category of a failed frame attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The device or control tool reported an error.
    Device,
    /// The exposure finished but the file never arrived.
    Transfer,
    /// The operation did not finish before its deadline.
    Timeout,
    /// The control tool could not be launched.
    Spawn,
    /// The output directory could not be prepared.
    Filesystem,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Device => "device error",
            Self::Transfer => "transfer error",
            Self::Timeout => "timeout",
            Self::Spawn => "spawn error",
            Self::Filesystem => "filesystem error",
        };
        f.write_str(label)
    }
}

/// Diagnostics for a frame that could not be captured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FrameFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable summary.
    pub message: String,
    /// Standard error captured from the control tool, if any.
    pub stderr: Option<String>,
    /// Exit code of the control tool, if it exited normally.
    pub exit_code: Option<i32>,
    /// Signal that terminated the control tool, if any.
    pub signal: Option<i32>,
}

impl FrameFailure {
    /// Create a failure with no process diagnostics attached.
    pub fn new<S: Into<String>>(kind: FailureKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            stderr: None,
            exit_code: None,
            signal: None,
        }
    }

    /// Failure for an operation that outlived its deadline.
    #[must_use]
    pub fn timeout(deadline: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("no result within {:.1}s", deadline.as_secs_f64()),
        )
    }

    /// Attach captured standard error text. Blank text is ignored.
    #[must_use]
    pub fn with_stderr<S: Into<String>>(mut self, stderr: S) -> Self {
        let stderr = stderr.into();
        if !stderr.trim().is_empty() {
            self.stderr = Some(stderr);
        }
        self
    }

    /// Attach the exit code of the control tool.
    #[must_use]
    pub const fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attach the signal that terminated the control tool.
    #[must_use]
    pub const fn with_signal(mut self, signal: i32) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Result of one expose-and-download operation.
pub type ExposureResult = std::result::Result<(), FrameFailure>;

/// Errors that stop a session before any device interaction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StartError {
    /// A setting's current value is not one of its permitted choices.
    #[error("invalid configuration: {setting} = {value:?} is not a permitted choice")]
    InvalidConfiguration {
        /// Setting name.
        setting: String,
        /// Offending current value.
        value: String,
    },
    /// The shot plan cannot be executed.
    #[error("invalid shot plan: {0}")]
    InvalidShotPlan(String),
    /// The output path for the session would be unsafe or incomplete.
    #[error("cannot build output paths: {0}")]
    PathBuildFailure(#[from] PathError),
}

/// Abstraction over a device that can expose and download one frame.
///
/// Implementations block for at least the requested exposure and return
/// once the frame is on disk at `request.path` or the attempt has failed.
/// Success means both the exposure and the file transfer completed. On
/// failure no usable file may be left behind at `request.path`.
///
/// Implementations must honour `request.deadline`: return within that time
/// of the call, abandoning the attempt if needed. The session cannot
/// interrupt a device call, so a device that blocks past the deadline
/// stalls the session. A late return is still recorded as a timeout.
pub trait ExposureDevice {
    /// Expose one frame and download it to `request.path`.
    fn expose_and_download(&mut self, request: &ExposureRequest<'_>) -> ExposureResult;

    /// Make sure `dir` exists before a frame is written into it.
    fn prepare_directory(&mut self, dir: &Path) -> ExposureResult {
        fs::create_dir_all(dir).map_err(|err| {
            FrameFailure::new(
                FailureKind::Filesystem,
                format!("cannot create {}: {err}", dir.display()),
            )
        })
    }
}

impl<D: ExposureDevice + ?Sized> ExposureDevice for &mut D {
    fn expose_and_download(&mut self, request: &ExposureRequest<'_>) -> ExposureResult {
        (**self).expose_and_download(request)
    }

    fn prepare_directory(&mut self, dir: &Path) -> ExposureResult {
        (**self).prepare_directory(dir)
    }
}

impl<D: ExposureDevice + ?Sized> ExposureDevice for Box<D> {
    fn expose_and_download(&mut self, request: &ExposureRequest<'_>) -> ExposureResult {
        (**self).expose_and_download(request)
    }

    fn prepare_directory(&mut self, dir: &Path) -> ExposureResult {
        (**self).prepare_directory(dir)
    }
}

/// Source of wall-clock time for frame timestamps.
pub trait Clock {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// Clock backed by the system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}
