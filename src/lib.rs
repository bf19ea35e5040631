//! Pi-Astro-Capture: unattended astrophotography capture for Raspberry Pi
//!
//! This library drives a tethered camera through a sequence of long exposures,
//! names and files each frame by subject and date, and survives individual
//! frame failures. The camera sits behind the [`ExposureDevice`] trait, so
//! sessions run the same way against `gphoto2` and against scripted test
//! devices.

pub mod config;
pub mod device;
pub mod naming;
pub mod plan;
pub mod profiles;
pub mod query;
pub mod session;
pub mod settings;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use config::{AppConfig, ConfigError};
pub use device::Gphoto2Device;
pub use plan::ShotPlan;
pub use profiles::{canon_550d, Lens};
pub use query::{QueriedSetting, QueryError};
pub use session::{
    AbortReason, CaptureSession, FrameResult, FrameStatus, Orchestrator, SessionEvent,
    SessionHandle, SessionOptions, SessionResult, SessionState, SessionStatus,
};
pub use settings::{CameraConfig, CameraConfigBuilder, SettingError, SettingOption};
pub use traits::{
    Clock, ExposureDevice, ExposureRequest, ExposureResult, FailureKind, FrameFailure,
    StartError, SystemClock,
};
