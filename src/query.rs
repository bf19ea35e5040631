//! Parsing of `gphoto2 --get-config` output.
//!
//! ```text
//! Label: ISO Speed
//! Readonly: 0
//! Type: RADIO
//! Current: 100
//! Choice: 0 Auto
//! Choice: 1 100
//! END
//! ```

use std::io;

use thiserror::Error;

use crate::settings::SettingOption;

/// Errors raised while reading a setting from the camera.
#[derive(Debug, Error)]
pub enum QueryError {
    /// `gphoto2` could not be run.
    #[error("failed to run gphoto2: {0}")]
    Spawn(#[from] io::Error),
    /// `gphoto2` reported an error.
    #[error("gphoto2 reported: {0}")]
    Device(String),
    /// `gphoto2` did not answer in time.
    #[error("gphoto2 did not answer in time")]
    Timeout,
    /// The output had no `Current:` line.
    #[error("no current value reported for {0}")]
    MissingCurrent(String),
    /// The setting is free text, not a list of choices.
    #[error("{0} is not an enumerated setting")]
    NotEnumerated(String),
}

/// A setting as reported by the camera.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueriedSetting {
    /// Setting name used for the query.
    pub name: String,
    /// Human-readable label.
    pub label: Option<String>,
    /// Widget type (`RADIO`, `MENU`, `TEXT`, `TOGGLE`, ...).
    pub widget: Option<String>,
    /// Whether the camera refuses changes.
    pub readonly: bool,
    /// Current value.
    pub current: String,
    /// Choices in camera order; empty for free-text settings.
    pub choices: Vec<String>,
}

impl QueriedSetting {
    /// Convert into a [`SettingOption`].
    ///
    /// The current value is not checked against the choices here; sessions
    /// check it when they start.
    ///
    /// # Errors
    ///
    /// Returns `NotEnumerated` for settings without choices.
    pub fn into_option(self) -> Result<SettingOption, QueryError> {
        if self.choices.is_empty() {
            return Err(QueryError::NotEnumerated(self.name));
        }
        Ok(SettingOption::unchecked(self.current, self.choices))
    }
}

/// Parse the output of `gphoto2 --get-config <name>`.
///
/// # Errors
///
/// Returns `MissingCurrent` if the output has no `Current:` line.
pub fn parse_get_config(name: &str, output: &str) -> Result<QueriedSetting, QueryError> {
    let mut setting = QueriedSetting {
        name: name.to_owned(),
        ..QueriedSetting::default()
    };
    let mut current = None;

    for line in output.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Label" => setting.label = Some(value.to_owned()),
            "Type" => setting.widget = Some(value.to_owned()),
            "Readonly" => setting.readonly = value == "1",
            "Current" => current = Some(value.to_owned()),
            "Choice" => {
                // "Choice: <n> <value>"; the value itself may contain spaces.
                let choice = value.split_once(' ').map_or("", |(_, rest)| rest.trim());
                setting.choices.push(choice.to_owned());
            }
            _ => {}
        }
    }

    setting.current = current.ok_or_else(|| QueryError::MissingCurrent(name.to_owned()))?;
    Ok(setting)
}
