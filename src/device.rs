//! Exposure device implementation that shells out to `gphoto2`.
//!
//! Each frame is one `gphoto2` invocation that pushes the session settings,
//! presses the EOS remote release, waits out the exposure, releases the
//! shutter and downloads the resulting file:
//!
//! ```text
//! gphoto2 --filename <path> --set-config-value iso=100 ... \
//!     --set-config eosremoterelease=5 --wait-event=30s \
//!     --set-config eosremoterelease=11 --wait-event-and-download=FILEADDED
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::runtime;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::naming::aperture_label;
use crate::query::{parse_get_config, QueriedSetting, QueryError};
use crate::settings::{
    APERTURE, CAPTURE_TARGET, IMAGE_FORMAT, ISO, REMOTE_RELEASE, REVIEW_TIME, SHUTTER_SPEED,
    WHITE_BALANCE,
};
use crate::traits::{ExposureDevice, ExposureRequest, ExposureResult, FailureKind, FrameFailure};

/// Name of the control tool looked up on `PATH` by default.
pub const DEFAULT_BINARY: &str = "gphoto2";

/// Remote release value that presses the shutter fully.
const RELEASE_PRESS_FULL: &str = "5";
/// Remote release value that lets go of the fully pressed shutter.
const RELEASE_RELEASE_FULL: &str = "11";
/// Camera event that ends the download wait once the frame is saved.
const DOWNLOAD_EVENT: &str = "FILEADDED";

/// Settings pushed to the camera before every exposure, in this order.
const APPLIED_SETTINGS: [&str; 7] = [
    ISO,
    APERTURE,
    SHUTTER_SPEED,
    IMAGE_FORMAT,
    WHITE_BALANCE,
    CAPTURE_TARGET,
    REVIEW_TIME,
];

/// Upper bound for a configuration query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Marker `gphoto2` prints on standard error when something went wrong.
const ERROR_MARKER: &str = "*** Error";

/// How a finished `gphoto2` process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
}

impl ProcessExit {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    const fn success(&self) -> bool {
        matches!(self.code, Some(0)) && self.signal.is_none()
    }
}

/// Captured result of one `gphoto2` run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the process was killed at its deadline.
    pub exit: Option<ProcessExit>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// [`ExposureDevice`] backed by the `gphoto2` command-line tool.
#[derive(Debug, Clone)]
pub struct Gphoto2Device {
    binary: PathBuf,
}

impl Default for Gphoto2Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Gphoto2Device {
    /// Use `gphoto2` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }

    /// Use a specific `gphoto2` executable.
    #[must_use]
    pub fn with_binary<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Executable this device runs.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Read a setting's current value and choices from the camera.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if `gphoto2` cannot be run, reports an error,
    /// times out, or prints output without a current value.
    pub fn query(&self, setting: &str) -> Result<QueriedSetting, QueryError> {
        let args = vec!["--get-config".to_owned(), setting.to_owned()];
        let output = self.run(&args, QUERY_TIMEOUT)?;

        match output.exit {
            None => Err(QueryError::Timeout),
            Some(exit) if !exit.success() || output.stderr.contains(ERROR_MARKER) => {
                Err(QueryError::Device(error_summary(&output.stderr, exit)))
            }
            Some(_) => parse_get_config(setting, &output.stdout),
        }
    }

    /// Spawn `gphoto2` and wait for it, killing it once `deadline` passes.
    fn run(&self, args: &[String], deadline: Duration) -> io::Result<ProcessOutput> {
        debug!(binary = %self.binary.display(), ?args, "running gphoto2");

        let runtime = runtime::Builder::new_current_thread().enable_all().build()?;
        let output = runtime.block_on(self.run_with_deadline(args, deadline))?;

        for line in output.stdout.lines().filter(|line| line.contains("Saving file")) {
            debug!("{line}");
        }
        Ok(output)
    }

    async fn run_with_deadline(
        &self,
        args: &[String],
        deadline: Duration,
    ) -> io::Result<ProcessOutput> {
        // Killed on drop as well as at the deadline.
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let finished = timeout(deadline, async {
            let (status, (), ()) = tokio::join!(
                child.wait(),
                read_pipe(stdout_pipe, &mut stdout),
                read_pipe(stderr_pipe, &mut stderr),
            );
            status
        })
        .await;

        let exit = match finished {
            Ok(status) => Some(ProcessExit::from_status(status?)),
            Err(_) => {
                warn!(
                    deadline_secs = deadline.as_secs_f64(),
                    "gphoto2 overran its deadline, killing it"
                );
                if matches!(child.try_wait(), Ok(None)) {
                    if let Err(err) = child.kill().await {
                        warn!(%err, "cannot kill gphoto2");
                    }
                }
                None
            }
        };

        Ok(ProcessOutput {
            exit,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

impl ExposureDevice for Gphoto2Device {
    fn expose_and_download(&mut self, request: &ExposureRequest<'_>) -> ExposureResult {
        let args = capture_args(request);

        let output = self.run(&args, request.deadline).map_err(|err| {
            error!(binary = %self.binary.display(), %err, "cannot launch gphoto2");
            FrameFailure::new(
                FailureKind::Spawn,
                format!("cannot run {}: {err}", self.binary.display()),
            )
        })?;

        let file_present = request.path.is_file();
        let outcome = classify(&output, file_present, request.deadline);

        if outcome.is_err() && file_present {
            // A failed attempt must not leave a file that looks like a frame.
            if let Err(err) = fs::remove_file(request.path) {
                warn!(path = %request.path.display(), %err, "cannot remove partial frame");
            }
        }
        outcome
    }
}

/// Command-line arguments for one bulb exposure and download.
pub fn capture_args(request: &ExposureRequest<'_>) -> Vec<String> {
    let mut args = vec![
        "--filename".to_owned(),
        escape_filename(&request.path.to_string_lossy()),
    ];

    for name in APPLIED_SETTINGS {
        if let Some(value) = request.settings.current(name) {
            let value = if name == APERTURE {
                aperture_label(value)
            } else {
                value
            };
            args.push("--set-config-value".to_owned());
            args.push(format!("{name}={value}"));
        }
    }
    if let Some(artist) = request.settings.artist() {
        args.push("--set-config-value".to_owned());
        args.push(format!("artist={artist}"));
    }
    if let Some(owner) = request.settings.owner_name() {
        args.push("--set-config-value".to_owned());
        args.push(format!("ownername={owner}"));
    }

    args.extend([
        "--set-config".to_owned(),
        format!("{REMOTE_RELEASE}={RELEASE_PRESS_FULL}"),
        format!("--wait-event={}", wait_spec(request.exposure)),
        "--set-config".to_owned(),
        format!("{REMOTE_RELEASE}={RELEASE_RELEASE_FULL}"),
        format!("--wait-event-and-download={DOWNLOAD_EVENT}"),
    ]);
    args
}

/// `gphoto2` wait duration: whole seconds when exact, milliseconds otherwise.
fn wait_spec(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis().max(1))
    }
}

/// `gphoto2` expands `%` patterns in `--filename`; keep paths literal.
fn escape_filename(path: &str) -> String {
    path.replace('%', "%%")
}

/// Decide a frame's outcome from the process result and the file on disk.
pub fn classify(
    output: &ProcessOutput,
    file_present: bool,
    deadline: Duration,
) -> ExposureResult {
    let Some(exit) = output.exit else {
        return Err(FrameFailure::timeout(deadline).with_stderr(output.stderr.trim()));
    };

    if let Some(signal) = exit.signal {
        return Err(FrameFailure::new(
            FailureKind::Device,
            format!("gphoto2 terminated by signal {signal}"),
        )
        .with_signal(signal)
        .with_stderr(output.stderr.trim()));
    }

    if !exit.success() || output.stderr.contains(ERROR_MARKER) {
        let mut failure =
            FrameFailure::new(FailureKind::Device, error_summary(&output.stderr, exit))
                .with_stderr(output.stderr.trim());
        if let Some(code) = exit.code {
            failure = failure.with_exit_code(code);
        }
        return Err(failure);
    }

    if !file_present {
        return Err(FrameFailure::new(
            FailureKind::Transfer,
            "exposure finished but no file was downloaded",
        )
        .with_stderr(output.stderr.trim())
        .with_exit_code(0));
    }

    Ok(())
}

/// First meaningful error detail from `gphoto2` standard error.
fn error_summary(stderr: &str, exit: ProcessExit) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.contains(ERROR_MARKER))
        .or_else(|| stderr.lines().map(str::trim).find(|line| !line.is_empty()))
        .map_or_else(
            || match exit.code {
                Some(code) => format!("gphoto2 exited with status {code}"),
                None => "gphoto2 failed".to_owned(),
            },
            str::to_owned,
        )
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) {
    let Some(mut pipe) = pipe else {
        return;
    };
    if let Err(err) = pipe.read_to_end(buf).await {
        debug!(%err, "cannot read gphoto2 output");
    }
}
