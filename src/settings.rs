//! Camera and lens configuration model.
//!
//! Every enumerated camera setting is a [`SettingOption`]: a current value
//! constrained to a fixed, ordered list of permitted choices. A
//! [`CameraConfig`] maps setting names (as `gphoto2` knows them) to options
//! and carries the few free-text and lens fields that are not enumerated.

use std::collections::BTreeMap;

use thiserror::Error;

/// Setting name for the sensor sensitivity.
pub const ISO: &str = "iso";
/// Setting name for the lens aperture.
pub const APERTURE: &str = "aperture";
/// Setting name for the shutter speed.
pub const SHUTTER_SPEED: &str = "shutterspeed";
/// Setting name for the image file format.
pub const IMAGE_FORMAT: &str = "imageformat";
/// Setting name for the white balance preset.
pub const WHITE_BALANCE: &str = "whitebalance";
/// Setting name for where the camera stores captures.
pub const CAPTURE_TARGET: &str = "capturetarget";
/// Setting name for the post-capture review time.
pub const REVIEW_TIME: &str = "reviewtime";
/// Setting name for the EOS remote shutter release.
pub const REMOTE_RELEASE: &str = "eosremoterelease";

/// Errors raised when selecting or building settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingError {
    /// The option set has no choices at all.
    #[error("option set has no choices")]
    NoChoices,
    /// The value is not one of the option's permitted choices.
    #[error("{value:?} is not a permitted choice")]
    ValueNotPermitted {
        /// Rejected value.
        value: String,
    },
    /// The value is not one of the named setting's permitted choices.
    #[error("{setting}: {value:?} is not a permitted choice")]
    NotPermitted {
        /// Setting name.
        setting: String,
        /// Rejected value.
        value: String,
    },
    /// No setting with this name exists in the configuration.
    #[error("unknown setting {0:?}")]
    UnknownSetting(String),
    /// The focal length lies outside the lens's range.
    #[error("focal length {focal_length}mm is outside {min}-{max}mm")]
    FocalLengthOutOfRange {
        /// Requested focal length.
        focal_length: u32,
        /// Shortest focal length of the lens.
        min: u32,
        /// Longest focal length of the lens.
        max: u32,
    },
}

/// A current value constrained to a finite ordered set of choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingOption {
    current: String,
    options: Vec<String>,
}

impl SettingOption {
    /// Create an option, rejecting a current value outside `options`.
    pub fn new<S, I, T>(current: S, options: I) -> Result<Self, SettingError>
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let option = Self::unchecked(current, options);
        if option.options.is_empty() {
            return Err(SettingError::NoChoices);
        }
        if !option.is_valid() {
            return Err(SettingError::ValueNotPermitted {
                value: option.current,
            });
        }
        Ok(option)
    }

    /// Create an option whose first choice is selected.
    pub fn first_of<I, T>(options: I) -> Result<Self, SettingError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        let current = options.first().cloned().ok_or(SettingError::NoChoices)?;
        Ok(Self { current, options })
    }

    /// Create an option without checking membership.
    ///
    /// Used for values reported by a device; such options are checked when a
    /// session starts.
    pub fn unchecked<S, I, T>(current: S, options: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            current: current.into(),
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Currently selected value.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Permitted choices, in device order.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Whether `value` is one of the permitted choices.
    pub fn permits(&self, value: &str) -> bool {
        self.options.iter().any(|choice| choice == value)
    }

    /// Whether the current value is one of the permitted choices.
    pub fn is_valid(&self) -> bool {
        self.permits(&self.current)
    }

    /// Select a new current value. Non-members are rejected.
    pub fn select(&mut self, value: &str) -> Result<(), SettingError> {
        if !self.permits(value) {
            return Err(SettingError::ValueNotPermitted {
                value: value.to_owned(),
            });
        }
        value.clone_into(&mut self.current);
        Ok(())
    }
}

/// Camera and lens settings for one device/lens pairing.
///
/// A session takes its own copy by value, so the settings cannot change
/// while frames are being captured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CameraConfig {
    settings: BTreeMap<String, SettingOption>,
    artist: Option<String>,
    owner_name: Option<String>,
    lens_name: Option<String>,
    focal_length_mm: u32,
}

impl CameraConfig {
    /// Start building a configuration.
    pub fn builder() -> CameraConfigBuilder {
        CameraConfigBuilder::default()
    }

    /// Look up a setting by name.
    pub fn get(&self, name: &str) -> Option<&SettingOption> {
        self.settings.get(name)
    }

    /// Current value of a setting, if present.
    pub fn current(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(SettingOption::current)
    }

    /// All settings ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingOption)> {
        self.settings
            .iter()
            .map(|(name, option)| (name.as_str(), option))
    }

    /// Select a new value for a named setting.
    pub fn select(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        let option = self
            .settings
            .get_mut(name)
            .ok_or_else(|| SettingError::UnknownSetting(name.to_owned()))?;
        option.select(value).map_err(|_| SettingError::NotPermitted {
            setting: name.to_owned(),
            value: value.to_owned(),
        })
    }

    /// Artist metadata written by the camera.
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    /// Owner name metadata written by the camera.
    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.as_deref()
    }

    /// Name of the attached lens.
    pub fn lens_name(&self) -> Option<&str> {
        self.lens_name.as_deref()
    }

    /// Focal length the lens is set to, in millimetres.
    pub const fn focal_length_mm(&self) -> u32 {
        self.focal_length_mm
    }
}

/// Builder for [`CameraConfig`].
#[derive(Debug, Clone, Default)]
pub struct CameraConfigBuilder {
    config: CameraConfig,
}

impl CameraConfigBuilder {
    /// Add or replace a setting.
    #[must_use]
    pub fn setting<S: Into<String>>(mut self, name: S, option: SettingOption) -> Self {
        self.config.settings.insert(name.into(), option);
        self
    }

    /// Select a value for a setting that was already added.
    pub fn select(mut self, name: &str, value: &str) -> Result<Self, SettingError> {
        self.config.select(name, value)?;
        Ok(self)
    }

    /// Set the artist metadata.
    #[must_use]
    pub fn artist<S: Into<String>>(mut self, artist: S) -> Self {
        self.config.artist = Some(artist.into());
        self
    }

    /// Set the owner name metadata.
    #[must_use]
    pub fn owner_name<S: Into<String>>(mut self, owner: S) -> Self {
        self.config.owner_name = Some(owner.into());
        self
    }

    /// Set the lens name.
    #[must_use]
    pub fn lens_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.lens_name = Some(name.into());
        self
    }

    /// Set the focal length in millimetres.
    #[must_use]
    pub const fn focal_length(mut self, focal_length_mm: u32) -> Self {
        self.config.focal_length_mm = focal_length_mm;
        self
    }

    /// Finish building.
    pub fn build(self) -> CameraConfig {
        self.config
    }
}
