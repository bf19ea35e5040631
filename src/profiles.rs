//! Option tables for supported camera bodies and lenses.

use crate::settings::{
    CameraConfig, CameraConfigBuilder, SettingError, SettingOption, APERTURE, CAPTURE_TARGET,
    IMAGE_FORMAT, ISO, REMOTE_RELEASE, REVIEW_TIME, SHUTTER_SPEED, WHITE_BALANCE,
};

const ISO_VALUES: [&str; 8] = ["Auto", "100", "200", "400", "800", "1600", "3200", "6400"];

const SHUTTER_SPEEDS: [&str; 53] = [
    "bulb", "30", "25", "20", "15", "13", "10.3", "8", "6.3", "5", "4", "3.2", "2.5", "2", "1.6",
    "1.3", "1", "0.8", "0.6", "0.5", "0.4", "0.3", "1/4", "1/5", "1/6", "1/8", "1/10", "1/13",
    "1/15", "1/20", "1/25", "1/30", "1/40", "1/50", "1/60", "1/80", "1/100", "1/125", "1/160",
    "1/200", "1/250", "1/320", "1/400", "1/500", "1/640", "1/800", "1/1000", "1/1250", "1/1600",
    "1/2000", "1/2500", "1/3200", "1/4000",
];

const REMOTE_RELEASE_VALUES: [&str; 12] = [
    "None",
    "Press Half",
    "Press Full",
    "Release Half",
    "Release Full",
    "Immediate",
    "Press 1",
    "Press 2",
    "Press 3",
    "Release 1",
    "Release 2",
    "Release 3",
];

const REVIEW_TIMES: [&str; 5] = ["None", "2 seconds", "4 seconds", "8 seconds", "Hold"];

const CAPTURE_TARGETS: [&str; 2] = ["Internal RAM", "Memory card"];

const IMAGE_FORMATS: [&str; 8] = [
    "Large Fine JPEG",
    "Large Normal JPEG",
    "Medium Fine JPEG",
    "Medium Normal JPEG",
    "Small Fine JPEG",
    "Small Normal JPEG",
    "RAW + Large Fine JPEG",
    "RAW",
];

const WHITE_BALANCES: [&str; 8] = [
    "Auto",
    "Daylight",
    "Shadow",
    "Cloudy",
    "Tungsten",
    "Fluorescent",
    "Flash",
    "Manual",
];

/// Canon EOS 550D option tables with astrophotography defaults.
///
/// Defaults: ISO 100, bulb shutter, RAW, daylight white balance, captures
/// kept in internal RAM. The lens is added separately with [`Lens::apply`].
pub fn canon_550d() -> CameraConfigBuilder {
    CameraConfig::builder()
        .setting(ISO, fixed("100", &ISO_VALUES))
        .setting(SHUTTER_SPEED, fixed("bulb", &SHUTTER_SPEEDS))
        .setting(REMOTE_RELEASE, fixed("None", &REMOTE_RELEASE_VALUES))
        .setting(REVIEW_TIME, fixed("None", &REVIEW_TIMES))
        .setting(CAPTURE_TARGET, fixed("Internal RAM", &CAPTURE_TARGETS))
        .setting(IMAGE_FORMAT, fixed("RAW", &IMAGE_FORMATS))
        .setting(WHITE_BALANCE, fixed("Daylight", &WHITE_BALANCES))
}

/// Option built from a static table; `current` must be one of `choices`.
fn fixed(current: &str, choices: &[&str]) -> SettingOption {
    SettingOption::unchecked(current, choices.iter().copied())
}

/// Supported lenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lens {
    /// Canon EF-S 18-55mm f/3.5-5.6 IS II.
    Kit18To55,
    /// Canon EF 75-300mm f/4-5.6 III.
    Kit75To300,
    /// Canon EF 50mm f/1.8 II.
    Prime50,
}

impl Lens {
    /// Every supported lens.
    pub const ALL: [Self; 3] = [Self::Kit18To55, Self::Kit75To300, Self::Prime50];

    /// Full lens name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Kit18To55 => "EF-S18-55mm f/3.5-5.6 IS II",
            Self::Kit75To300 => "EF75-300mm f/4-5.6 III",
            Self::Prime50 => "EF50mm f/1.8 II",
        }
    }

    /// Shortest and longest focal length in millimetres.
    pub const fn focal_range(self) -> (u32, u32) {
        match self {
            Self::Kit18To55 => (18, 55),
            Self::Kit75To300 => (75, 300),
            Self::Prime50 => (50, 50),
        }
    }

    /// Aperture stops, widest first.
    pub const fn apertures(self) -> &'static [&'static str] {
        match self {
            Self::Kit18To55 => &[
                "3.5", "4", "4.5", "5", "5.6", "6.3", "7.1", "8", "9", "10", "11", "13", "14",
                "16", "18", "20", "22", "25", "29", "32", "36",
            ],
            Self::Kit75To300 => &[
                "4", "4.5", "5", "5.6", "6.3", "7.1", "8", "9", "10", "11", "13", "14", "16",
                "18", "20", "22", "25", "29", "32", "36", "40", "45",
            ],
            Self::Prime50 => &[
                "1.8", "2", "2.2", "2.5", "2.8", "3.2", "3.5", "4", "4.5", "5", "5.6", "6.3",
                "7.1", "8", "9", "10", "11", "13", "14", "16", "18", "20", "22",
            ],
        }
    }

    /// Aperture option with the widest stop selected.
    pub fn aperture_option(self) -> SettingOption {
        fixed(self.apertures().first().copied().unwrap_or_default(), self.apertures())
    }

    /// Add this lens, set to `focal_length_mm`, to a camera configuration.
    ///
    /// # Errors
    ///
    /// Returns `FocalLengthOutOfRange` if the lens cannot be set to that
    /// focal length.
    pub fn apply(
        self,
        builder: CameraConfigBuilder,
        focal_length_mm: u32,
    ) -> Result<CameraConfigBuilder, SettingError> {
        let (min, max) = self.focal_range();
        if !(min..=max).contains(&focal_length_mm) {
            return Err(SettingError::FocalLengthOutOfRange {
                focal_length: focal_length_mm,
                min,
                max,
            });
        }
        Ok(builder
            .setting(APERTURE, self.aperture_option())
            .lens_name(self.name())
            .focal_length(focal_length_mm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_configuration;

    #[test]
    fn test_canon_550d_defaults_are_valid() {
        let config = canon_550d().build();
        assert!(validate_configuration(&config).is_ok());
        assert_eq!(config.current(ISO), Some("100"));
        assert_eq!(config.current(SHUTTER_SPEED), Some("bulb"));
        assert_eq!(config.current(IMAGE_FORMAT), Some("RAW"));
        assert_eq!(config.current(WHITE_BALANCE), Some("Daylight"));
    }

    #[test]
    fn test_every_lens_default_is_valid() {
        for lens in Lens::ALL {
            let (min, _) = lens.focal_range();
            let config = lens
                .apply(canon_550d(), min)
                .expect("focal length in range")
                .build();
            assert!(validate_configuration(&config).is_ok(), "{lens:?}");
            assert_eq!(config.lens_name(), Some(lens.name()));
        }
    }

    #[test]
    fn test_focal_length_out_of_range() {
        let err = Lens::Kit18To55
            .apply(canon_550d(), 200)
            .expect_err("out of range");
        assert_eq!(
            err,
            SettingError::FocalLengthOutOfRange {
                focal_length: 200,
                min: 18,
                max: 55
            }
        );
    }

    #[test]
    fn test_operator_selection() {
        let config = Lens::Kit18To55
            .apply(canon_550d(), 55)
            .and_then(|builder| builder.select(APERTURE, "5.6"))
            .and_then(|builder| builder.select(ISO, "1600"))
            .expect("valid choices")
            .build();
        assert_eq!(config.current(APERTURE), Some("5.6"));
        assert_eq!(config.current(ISO), Some("1600"));

        let err = canon_550d().select(ISO, "12800").expect_err("not a 550D ISO");
        assert!(matches!(err, SettingError::NotPermitted { .. }));
    }
}
