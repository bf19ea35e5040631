//! Capture session orchestration.
//!
//! An [`Orchestrator`] owns the exposure device. Each call to
//! [`Orchestrator::start`] validates a configuration and shot plan and
//! returns a [`CaptureSession`] that borrows the device exclusively, so two
//! sessions can never drive the same camera at once. [`CaptureSession::run`]
//! exposes the planned frames one after another and always produces a
//! [`SessionResult`]; individual frame failures are recorded, never
//! propagated.
//!
//! Cancellation and progress go through a cloneable [`SessionHandle`].
//! Cancelling is cooperative: an exposure in progress is never interrupted,
//! the session stops once that frame's result is recorded.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, debug_span, info, info_span, warn};

use crate::naming::FrameNamer;
use crate::plan::ShotPlan;
use crate::settings::CameraConfig;
use crate::traits::{
    Clock, ExposureDevice, ExposureRequest, ExposureResult, FailureKind, FrameFailure,
    StartError, SystemClock,
};
use crate::validation::{validate_configuration, validate_shot_plan};

/// Consecutive failed frames that abort a session by default.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// Grace period after the exposure for the frame download.
pub const DEFAULT_TRANSFER_MARGIN: Duration = Duration::from_secs(10);

/// Tunables for how a session paces frames and reacts to failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Consecutive failures that abort the session. Zero is treated as one.
    pub failure_threshold: u32,
    /// Time allowed beyond the exposure before a frame counts as timed out.
    pub transfer_margin: Duration,
    /// Pause between the end of one frame and the start of the next.
    pub frame_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            transfer_margin: DEFAULT_TRANSFER_MARGIN,
            frame_interval: Duration::ZERO,
        }
    }
}

/// Where a session is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Validated but no frame issued yet.
    Idle,
    /// Frames are being captured.
    Running(FramePhase),
    /// Every planned frame was attempted.
    Complete,
    /// Stopped early.
    Aborted,
}

/// Per-frame sub-state of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames.
    AwaitingFrame,
    /// The device is exposing and downloading.
    Exposing,
    /// The device returned and the outcome is being recorded.
    Evaluating,
}

/// Outcome of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was exposed and downloaded.
    Succeeded,
    /// The frame is unusable.
    Failed,
}

/// Record of one capture attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameResult {
    index: u32,
    path: PathBuf,
    failure: Option<FrameFailure>,
    elapsed: Duration,
}

impl FrameResult {
    fn new(index: u32, path: PathBuf, outcome: ExposureResult, elapsed: Duration) -> Self {
        Self {
            index,
            path,
            failure: outcome.err(),
            elapsed,
        }
    }

    /// One-based position of the frame in the session.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Target file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the frame succeeded.
    pub const fn status(&self) -> FrameStatus {
        if self.failure.is_some() {
            FrameStatus::Failed
        } else {
            FrameStatus::Succeeded
        }
    }

    /// Shorthand for a succeeded status.
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Failure diagnostics, present only for failed frames.
    pub const fn failure(&self) -> Option<&FrameFailure> {
        self.failure.as_ref()
    }

    /// Wall-clock time spent on the attempt.
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Overall outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// All planned frames succeeded.
    Complete,
    /// All planned frames were attempted, some failed.
    Partial,
    /// The session stopped before attempting every frame.
    Aborted,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Aborted => "aborted",
        })
    }
}

/// Why a session stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Too many frames failed back to back.
    ConsecutiveFailures(u32),
    /// The caller asked the session to stop.
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsecutiveFailures(count) => write!(f, "{count} consecutive frame failures"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal summary of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    status: SessionStatus,
    abort_reason: Option<AbortReason>,
    planned: u32,
    frames: Vec<FrameResult>,
}

impl SessionResult {
    /// Overall status.
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Reason for an aborted session.
    pub const fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
    }

    /// Number of frames the shot plan asked for.
    pub const fn planned(&self) -> u32 {
        self.planned
    }

    /// Frame results in capture order.
    pub fn frames(&self) -> &[FrameResult] {
        &self.frames
    }

    /// Number of succeeded frames.
    pub fn succeeded(&self) -> usize {
        self.frames.iter().filter(|frame| frame.is_success()).count()
    }

    /// Number of failed frames.
    pub fn failed(&self) -> usize {
        self.frames.len() - self.succeeded()
    }

    /// Paths of the usable frames, for stacking tools.
    pub fn successful_paths(&self) -> impl Iterator<Item = &Path> {
        self.frames
            .iter()
            .filter(|frame| frame.is_success())
            .map(FrameResult::path)
    }
}

/// Progress notification delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A frame result was recorded.
    FrameRecorded {
        /// Snapshot of the recorded result.
        frame: FrameResult,
        /// Frames in the plan.
        planned: u32,
    },
    /// The session ended.
    Finished {
        /// Final status.
        status: SessionStatus,
        /// Frames that succeeded.
        succeeded: usize,
        /// Frames that failed.
        failed: usize,
    },
}

#[derive(Debug, Default)]
struct HandleInner {
    cancelled: AtomicBool,
    wake: Condvar,
    wake_lock: Mutex<()>,
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

/// Cloneable handle to observe or cancel a running session.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    /// Ask the session to stop after the frame in flight.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _guard = self
            .inner
            .wake_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.wake.notify_all();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receive a [`SessionEvent`] after each recorded frame and at the end.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (sender, receiver) = mpsc::channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    fn publish(&self, event: &SessionEvent) {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Sleep for `pause` unless cancelled first. Returns `true` if cancelled.
    ///
    /// A pause too long to represent as an instant waits until cancelled.
    fn wait_unless_cancelled(&self, pause: Duration) -> bool {
        let deadline = Instant::now().checked_add(pause);
        let mut guard = self
            .inner
            .wake_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_cancelled() {
                return true;
            }
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.inner
                        .wake
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .wake
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

type Observer<'a> = Box<dyn FnMut(&SessionEvent) + 'a>;

/// Drives capture sessions against one exposure device.
pub struct Orchestrator<D, C = SystemClock> {
    device: D,
    clock: C,
    options: SessionOptions,
}

impl<D: ExposureDevice> Orchestrator<D> {
    /// Create an orchestrator using the system clock and default options.
    pub fn new(device: D) -> Self {
        Self {
            device,
            clock: SystemClock,
            options: SessionOptions::default(),
        }
    }
}

impl<D: ExposureDevice, C: Clock> Orchestrator<D, C> {
    /// Replace the session options.
    #[must_use]
    pub const fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the clock used for frame timestamps.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Orchestrator<D, C2> {
        Orchestrator {
            device: self.device,
            clock,
            options: self.options,
        }
    }

    /// Current session options.
    pub const fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The exposure device.
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Give back the exposure device.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Validate inputs and prepare a session.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` if a setting holds a value outside its choices
    /// - `InvalidShotPlan` if the frame count, exposure or subject is unusable
    /// - `PathBuildFailure` if output paths would be unsafe or incomplete
    pub fn start(
        &mut self,
        config: CameraConfig,
        plan: ShotPlan,
    ) -> Result<CaptureSession<'_, D, C>, StartError> {
        validate_configuration(&config)?;
        let exposure = validate_shot_plan(&plan)?;
        let namer = FrameNamer::new(&config, &plan, self.clock.now().date())?;

        Ok(CaptureSession {
            device: &mut self.device,
            clock: &self.clock,
            options: self.options,
            config,
            plan,
            exposure,
            namer,
            state: SessionState::Idle,
            handle: SessionHandle::default(),
            observers: Vec::new(),
            frames: Vec::new(),
            consecutive_failures: 0,
        })
    }
}

/// A validated session, ready to run.
pub struct CaptureSession<'a, D, C> {
    device: &'a mut D,
    clock: &'a C,
    options: SessionOptions,
    config: CameraConfig,
    plan: ShotPlan,
    exposure: Duration,
    namer: FrameNamer,
    state: SessionState,
    handle: SessionHandle,
    observers: Vec<Observer<'a>>,
    frames: Vec<FrameResult>,
    consecutive_failures: u32,
}

impl<'a, D: ExposureDevice, C: Clock> CaptureSession<'a, D, C> {
    /// Handle for cancelling and subscribing to this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Call `observer` synchronously with every event, before the session
    /// decides whether to continue.
    pub fn add_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&SessionEvent) + 'a,
    {
        self.observers.push(Box::new(observer));
    }

    /// Current life-cycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Settings this session captures with.
    pub const fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// The shot plan being executed.
    pub const fn plan(&self) -> &ShotPlan {
        &self.plan
    }

    /// Directory frames are written to.
    pub fn session_dir(&self) -> &Path {
        self.namer.session_dir()
    }

    /// Capture every planned frame, stopping early on repeated failures or
    /// cancellation.
    pub fn run(mut self) -> SessionResult {
        let planned = self.plan.frame_count();
        let span = info_span!("capture_session", subject = %self.plan.subject());
        let _entered = span.enter();
        info!(
            frames = planned,
            exposure_secs = self.plan.exposure_secs(),
            dir = %self.namer.session_dir().display(),
            "capture session started"
        );

        let threshold = self.options.failure_threshold.max(1);
        let mut abort_reason = None;

        for index in 1..=planned {
            self.state = SessionState::Running(FramePhase::AwaitingFrame);
            if self.handle.is_cancelled() {
                abort_reason = Some(AbortReason::Cancelled);
                break;
            }
            if index > 1
                && !self.options.frame_interval.is_zero()
                && self.handle.wait_unless_cancelled(self.options.frame_interval)
            {
                abort_reason = Some(AbortReason::Cancelled);
                break;
            }

            let frame = self.capture_frame(index);
            if frame.is_success() {
                self.consecutive_failures = 0;
            } else {
                self.consecutive_failures += 1;
            }
            self.record(frame, planned);

            if self.consecutive_failures >= threshold {
                warn!(
                    failures = self.consecutive_failures,
                    "aborting session after consecutive frame failures"
                );
                abort_reason = Some(AbortReason::ConsecutiveFailures(
                    self.consecutive_failures,
                ));
                break;
            }
        }

        if abort_reason.is_none() && self.handle.is_cancelled() {
            abort_reason = Some(AbortReason::Cancelled);
        }

        let status = match abort_reason {
            Some(_) => SessionStatus::Aborted,
            None if self.frames.iter().all(FrameResult::is_success) => SessionStatus::Complete,
            None => SessionStatus::Partial,
        };
        self.state = if abort_reason.is_some() {
            SessionState::Aborted
        } else {
            SessionState::Complete
        };

        let result = SessionResult {
            status,
            abort_reason,
            planned,
            frames: std::mem::take(&mut self.frames),
        };

        match abort_reason {
            Some(reason) => warn!(
                %reason,
                succeeded = result.succeeded(),
                failed = result.failed(),
                "capture session aborted"
            ),
            None => info!(
                %status,
                succeeded = result.succeeded(),
                failed = result.failed(),
                "capture session finished"
            ),
        }

        self.notify(&SessionEvent::Finished {
            status,
            succeeded: result.succeeded(),
            failed: result.failed(),
        });
        result
    }

    fn capture_frame(&mut self, index: u32) -> FrameResult {
        let span = debug_span!("frame", index);
        let _entered = span.enter();

        let path = self.namer.path_for(self.clock.now(), index);
        let deadline = self.exposure.saturating_add(self.options.transfer_margin);

        self.state = SessionState::Running(FramePhase::Exposing);
        let started = Instant::now();
        let mut outcome = self.device.prepare_directory(self.namer.session_dir());
        if outcome.is_ok() {
            debug!(path = %path.display(), "exposing frame");
            outcome = self.device.expose_and_download(&ExposureRequest {
                path: &path,
                exposure: self.exposure,
                deadline,
                settings: &self.config,
            });
        }
        let elapsed = started.elapsed();

        self.state = SessionState::Running(FramePhase::Evaluating);
        let outcome = enforce_deadline(outcome, elapsed, deadline);
        if let Err(failure) = &outcome {
            warn!(
                kind = %failure.kind,
                message = %failure.message,
                stderr = failure.stderr.as_deref().unwrap_or_default(),
                "frame failed"
            );
        } else {
            debug!(elapsed_ms = elapsed.as_millis(), "frame captured");
        }

        FrameResult::new(index, path, outcome, elapsed)
    }

    fn record(&mut self, frame: FrameResult, planned: u32) {
        let event = SessionEvent::FrameRecorded {
            frame: frame.clone(),
            planned,
        };
        self.frames.push(frame);
        self.notify(&event);
    }

    fn notify(&mut self, event: &SessionEvent) {
        for observer in &mut self.observers {
            observer(event);
        }
        self.handle.publish(event);
    }
}

/// Attempts that outlive their deadline are timeouts, whatever the device said.
fn enforce_deadline(
    outcome: ExposureResult,
    elapsed: Duration,
    deadline: Duration,
) -> ExposureResult {
    match outcome {
        Err(failure) if failure.kind == FailureKind::Timeout => Err(failure),
        Ok(()) if elapsed > deadline => Err(FrameFailure::timeout(deadline)),
        Err(failure) if elapsed > deadline => Err(FrameFailure {
            kind: FailureKind::Timeout,
            message: format!(
                "{}; device reported {}",
                FrameFailure::timeout(deadline).message,
                failure.message
            ),
            ..failure
        }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FixedClock, ScriptedDevice, Step};
    use crate::settings::{SettingOption, APERTURE, ISO, SHUTTER_SPEED};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn config() -> CameraConfig {
        CameraConfig::builder()
            .setting(
                ISO,
                SettingOption::new("100", ["Auto", "100", "200", "400"]).expect("valid"),
            )
            .setting(
                APERTURE,
                SettingOption::new("f/5.6", ["f/4", "f/5.6", "f/8"]).expect("valid"),
            )
            .setting(
                SHUTTER_SPEED,
                SettingOption::new("bulb", ["bulb", "30", "1/4000"]).expect("valid"),
            )
            .focal_length(55)
            .build()
    }

    fn plan(frames: u32) -> ShotPlan {
        ShotPlan::new("M42")
            .with_frames(frames)
            .with_exposure_secs(30.0)
            .with_output_root("/captures")
    }

    fn orchestrator(device: ScriptedDevice) -> Orchestrator<ScriptedDevice, FixedClock> {
        Orchestrator::new(device).with_clock(FixedClock::at(2024, 3, 9, 22, 0, 0))
    }

    fn statuses(result: &SessionResult) -> Vec<FrameStatus> {
        result.frames().iter().map(FrameResult::status).collect()
    }

    #[test]
    fn test_all_frames_succeed() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed());
        let session = orchestrator.start(config(), plan(3)).expect("start");
        assert_eq!(session.state(), SessionState::Idle);

        let result = session.run();
        assert_eq!(result.status(), SessionStatus::Complete);
        assert_eq!(result.frames().len(), 3);
        assert_eq!(result.succeeded(), 3);
        assert!(result.abort_reason().is_none());

        let indices: Vec<u32> = result.frames().iter().map(FrameResult::index).collect();
        assert_eq!(indices, vec![1, 2, 3]);

        for frame in result.frames() {
            assert!(frame.path().starts_with("/captures/2024-03-09/M42"));
            let name = frame
                .path()
                .file_name()
                .and_then(|name| name.to_str())
                .expect("file name");
            assert!(name.starts_with("ISO100-f5.6-30s-55mm-03-09-24_22:00:00"));
        }
        assert_eq!(orchestrator.device().calls().len(), 3);
    }

    #[test]
    fn test_device_receives_request() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed())
            .with_options(SessionOptions {
                transfer_margin: Duration::from_secs(5),
                ..SessionOptions::default()
            });
        orchestrator
            .start(config(), plan(1))
            .expect("start")
            .run();

        let device = orchestrator.into_device();
        let call = device.calls().first().expect("one call");
        assert_eq!(call.exposure, Duration::from_secs(30));
        assert_eq!(call.deadline, Duration::from_secs(35));
        assert_eq!(call.iso.as_deref(), Some("100"));
        assert_eq!(
            device.prepared_dirs().first().map(PathBuf::as_path),
            Some(Path::new("/captures/2024-03-09/M42"))
        );
    }

    #[test]
    fn test_isolated_failure_is_partial() {
        let device = ScriptedDevice::with_script([
            Step::Succeed,
            Step::Fail(FailureKind::Device),
            Step::Succeed,
            Step::Succeed,
            Step::Succeed,
        ]);
        let mut orchestrator = orchestrator(device);
        let result = orchestrator.start(config(), plan(5)).expect("start").run();

        assert_eq!(result.status(), SessionStatus::Partial);
        assert_eq!(
            statuses(&result),
            vec![
                FrameStatus::Succeeded,
                FrameStatus::Failed,
                FrameStatus::Succeeded,
                FrameStatus::Succeeded,
                FrameStatus::Succeeded,
            ]
        );
        let failure = result.frames()[1].failure().expect("diagnostics");
        assert_eq!(failure.kind, FailureKind::Device);
        assert_eq!(result.successful_paths().count(), 4);
    }

    #[test]
    fn test_three_consecutive_failures_abort() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_fail());
        let result = orchestrator.start(config(), plan(10)).expect("start").run();

        assert_eq!(result.status(), SessionStatus::Aborted);
        assert_eq!(
            result.abort_reason(),
            Some(AbortReason::ConsecutiveFailures(3))
        );
        assert_eq!(result.frames().len(), 3);
        assert_eq!(result.failed(), 3);
        assert_eq!(result.planned(), 10);
        assert_eq!(orchestrator.device().calls().len(), 3);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let device = ScriptedDevice::with_script([
            Step::Fail(FailureKind::Device),
            Step::Fail(FailureKind::Transfer),
            Step::Succeed,
            Step::Fail(FailureKind::Device),
            Step::Fail(FailureKind::Device),
            Step::Succeed,
        ]);
        let mut orchestrator = orchestrator(device);
        let result = orchestrator.start(config(), plan(6)).expect("start").run();

        assert_eq!(result.status(), SessionStatus::Partial);
        assert_eq!(result.frames().len(), 6);
        assert_eq!(result.failed(), 4);
    }

    #[test]
    fn test_custom_threshold() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_fail()).with_options(
            SessionOptions {
                failure_threshold: 1,
                ..SessionOptions::default()
            },
        );
        let result = orchestrator.start(config(), plan(5)).expect("start").run();
        assert_eq!(result.frames().len(), 1);
        assert_eq!(result.status(), SessionStatus::Aborted);
    }

    #[test]
    fn test_zero_threshold_behaves_like_one() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_fail()).with_options(
            SessionOptions {
                failure_threshold: 0,
                ..SessionOptions::default()
            },
        );
        let result = orchestrator.start(config(), plan(5)).expect("start").run();
        assert_eq!(result.frames().len(), 1);
    }

    #[test]
    fn test_cancel_after_second_frame() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed());
        let mut session = orchestrator.start(config(), plan(5)).expect("start");
        let handle = session.handle();
        session.add_observer(move |event| {
            if let SessionEvent::FrameRecorded { frame, .. } = event {
                if frame.index() == 2 {
                    handle.cancel();
                }
            }
        });

        let result = session.run();
        assert_eq!(result.status(), SessionStatus::Aborted);
        assert_eq!(result.abort_reason(), Some(AbortReason::Cancelled));
        assert_eq!(result.frames().len(), 2);
        assert_eq!(orchestrator.device().calls().len(), 2);
    }

    #[test]
    fn test_cancel_before_first_frame() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed());
        let session = orchestrator.start(config(), plan(5)).expect("start");
        session.handle().cancel();

        let result = session.run();
        assert_eq!(result.status(), SessionStatus::Aborted);
        assert!(result.frames().is_empty());
        assert!(orchestrator.device().calls().is_empty());
    }

    #[test]
    fn test_cancel_interrupts_frame_interval() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed()).with_options(
            SessionOptions {
                frame_interval: Duration::from_secs(3600),
                ..SessionOptions::default()
            },
        );
        let session = orchestrator.start(config(), plan(3)).expect("start");
        let handle = session.handle();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            handle.cancel();
        });

        let started = Instant::now();
        let result = session.run();
        canceller.join().expect("canceller thread");
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(result.frames().len(), 1);
        assert_eq!(result.status(), SessionStatus::Aborted);
    }

    #[test]
    fn test_unrepresentable_frame_interval_waits_for_cancel() {
        let app = crate::config::AppConfig::from_toml(
            "[capture]\nframe_interval_secs = 9223372036854775807\n",
        )
        .expect("valid config");
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed())
            .with_options(app.session_options());
        let session = orchestrator.start(config(), plan(2)).expect("start");
        let handle = session.handle();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            handle.cancel();
        });

        let result = session.run();
        canceller.join().expect("canceller thread");
        assert_eq!(result.frames().len(), 1);
        assert_eq!(result.abort_reason(), Some(AbortReason::Cancelled));
    }

    #[test]
    fn test_huge_transfer_margin_saturates_deadline() {
        let mut orchestrator =
            orchestrator(ScriptedDevice::always_succeed()).with_options(SessionOptions {
                transfer_margin: Duration::MAX,
                ..SessionOptions::default()
            });
        let result = orchestrator.start(config(), plan(1)).expect("start").run();

        assert_eq!(result.status(), SessionStatus::Complete);
        assert_eq!(orchestrator.device().calls()[0].deadline, Duration::MAX);
    }

    #[test]
    fn test_invalid_configuration_rejected_before_device_use() {
        let bad = CameraConfig::builder()
            .setting(ISO, SettingOption::unchecked("12800", ["100", "200"]))
            .setting(
                APERTURE,
                SettingOption::new("5.6", ["5.6"]).expect("valid"),
            )
            .build();
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed());
        let err = orchestrator
            .start(bad, plan(3))
            .err()
            .expect("should be rejected");

        assert!(matches!(err, StartError::InvalidConfiguration { .. }));
        assert!(orchestrator.device().calls().is_empty());
    }

    #[test]
    fn test_invalid_plan_rejected() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed());
        let err = orchestrator
            .start(config(), plan(0))
            .err()
            .expect("zero frames");
        assert!(matches!(err, StartError::InvalidShotPlan(_)));

        let err = orchestrator
            .start(config(), plan(3).with_exposure_secs(0.0))
            .err()
            .expect("zero exposure");
        assert!(matches!(err, StartError::InvalidShotPlan(_)));
    }

    #[test]
    fn test_unsafe_root_rejected() {
        let mut orchestrator = orchestrator(ScriptedDevice::always_succeed());
        let err = orchestrator
            .start(config(), plan(3).with_output_root("/captures/../../etc"))
            .err()
            .expect("unsafe root");
        assert!(matches!(err, StartError::PathBuildFailure(_)));
    }

    #[test]
    fn test_slow_device_counts_as_timeout() {
        let device = ScriptedDevice::with_script([
            Step::Stall(Duration::from_millis(300)),
            Step::Succeed,
        ]);
        let mut orchestrator = orchestrator(device).with_options(SessionOptions {
            transfer_margin: Duration::ZERO,
            ..SessionOptions::default()
        });
        let plan = plan(2).with_exposure_secs(0.05);
        let result = orchestrator.start(config(), plan).expect("start").run();

        let failure = result.frames()[0].failure().expect("timed out");
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(result.frames()[1].is_success());
        assert_eq!(result.status(), SessionStatus::Partial);
    }

    #[test]
    fn test_directory_failure_recorded() {
        let device = ScriptedDevice::always_succeed().failing_directories();
        let mut orchestrator = orchestrator(device);
        let result = orchestrator.start(config(), plan(5)).expect("start").run();

        assert_eq!(result.status(), SessionStatus::Aborted);
        assert_eq!(result.frames().len(), 3);
        assert!(result
            .frames()
            .iter()
            .all(|frame| frame.failure().map(|f| f.kind) == Some(FailureKind::Filesystem)));
        assert!(orchestrator.device().calls().is_empty());
    }

    #[test]
    fn test_observers_receive_snapshots() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);

        let mut orchestrator = orchestrator(ScriptedDevice::with_script([
            Step::Succeed,
            Step::Fail(FailureKind::Transfer),
        ]));
        let mut session = orchestrator.start(config(), plan(2)).expect("start");
        let receiver = session.handle().subscribe();
        session.add_observer(move |event| sink.borrow_mut().push(event.clone()));
        let result = session.run();

        let events = events.borrow();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            SessionEvent::FrameRecorded { frame, planned: 2 } if frame.is_success()
        ));
        assert_eq!(
            events[2],
            SessionEvent::Finished {
                status: SessionStatus::Partial,
                succeeded: 1,
                failed: 1,
            }
        );

        let received: Vec<SessionEvent> = receiver.try_iter().collect();
        assert_eq!(received.as_slice(), events.as_slice());
        assert_eq!(result.status(), SessionStatus::Partial);
    }

    #[test]
    fn test_enforce_deadline_keeps_fast_outcomes() {
        let deadline = Duration::from_secs(10);
        assert!(enforce_deadline(Ok(()), Duration::from_secs(9), deadline).is_ok());

        let late = enforce_deadline(
            Err(FrameFailure::new(FailureKind::Device, "io error")),
            Duration::from_secs(11),
            deadline,
        )
        .expect_err("late failure");
        assert_eq!(late.kind, FailureKind::Timeout);
        assert!(late.message.contains("io error"));
    }
}
