//! Checks run before a capture session touches the device.
//!
//! A session that fails any of these checks never reaches the running
//! state, so no frame is exposed and nothing is written to disk.

use std::time::Duration;

use crate::plan::ShotPlan;
use crate::settings::CameraConfig;
use crate::traits::StartError;

/// Validates that every setting's current value is a permitted choice.
///
/// # Errors
///
/// Returns `InvalidConfiguration` naming the first offending setting, in
/// setting-name order.
pub fn validate_configuration(config: &CameraConfig) -> Result<(), StartError> {
    match config.iter().find(|(_, option)| !option.is_valid()) {
        Some((name, option)) => Err(StartError::InvalidConfiguration {
            setting: name.to_owned(),
            value: option.current().to_owned(),
        }),
        None => Ok(()),
    }
}

/// Validates frame count, exposure and subject of a shot plan.
///
/// Returns the exposure as a [`Duration`] on success.
///
/// # Errors
///
/// Returns `InvalidShotPlan` if:
/// - The frame count is zero
/// - The exposure is not a positive finite number of seconds
/// - The subject name is blank
pub fn validate_shot_plan(plan: &ShotPlan) -> Result<Duration, StartError> {
    if plan.subject().trim().is_empty() {
        return Err(StartError::InvalidShotPlan(
            "subject name is empty".to_owned(),
        ));
    }
    if plan.frame_count() == 0 {
        return Err(StartError::InvalidShotPlan(
            "frame count must be positive".to_owned(),
        ));
    }
    plan.exposure().ok_or_else(|| {
        StartError::InvalidShotPlan(format!(
            "exposure must be a positive number of seconds, got {}",
            plan.exposure_secs()
        ))
    })
}
