//! Application configuration: discovery, loading and environment overlay.
//!
//! Load order (later wins):
//! 1. Compiled defaults
//! 2. `/etc/pi-astro-capture/config.toml`
//! 3. `<user config dir>/pi-astro-capture/config.toml`
//! 4. An explicit path (`--config`)
//! 5. `PI_ASTRO_CAPTURE_*` environment variables

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::DEFAULT_BINARY;
use crate::plan::DEFAULT_CAPTURE_ROOT;
use crate::session::{SessionOptions, DEFAULT_FAILURE_THRESHOLD, DEFAULT_TRANSFER_MARGIN};

/// Directory name under the system and user config roots.
pub const APP_DIR: &str = "pi-astro-capture";
/// Config file name.
pub const CONFIG_FILE: &str = "config.toml";
/// Environment variable overriding `capture.output_root`.
pub const ENV_OUTPUT_ROOT: &str = "PI_ASTRO_CAPTURE_ROOT";
/// Environment variable overriding `gphoto2.binary`.
pub const ENV_GPHOTO2: &str = "PI_ASTRO_CAPTURE_GPHOTO2";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A config file is not valid TOML or has values of the wrong type.
    #[error("failed to parse config file {path}: {message}")]
    Parse {
        /// File that failed, or `<merged>` for the combined table.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// A config could not be written back out as TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// `[capture]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    /// Root directory for captured frames.
    pub output_root: PathBuf,
    /// Consecutive failures that abort a session.
    pub failure_threshold: u32,
    /// Seconds allowed beyond the exposure for download.
    pub transfer_margin_secs: u64,
    /// Seconds to pause between frames.
    pub frame_interval_secs: u64,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_CAPTURE_ROOT),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            transfer_margin_secs: DEFAULT_TRANSFER_MARGIN.as_secs(),
            frame_interval_secs: 0,
        }
    }
}

/// `[gphoto2]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gphoto2Section {
    /// Executable name or path.
    pub binary: PathBuf,
}

impl Default for Gphoto2Section {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session defaults.
    pub capture: CaptureSection,
    /// Camera control tool.
    pub gphoto2: Gphoto2Section,
    /// Log output.
    pub logging: LoggingSection,
}

/// Where config values came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    /// Files that were loaded, in order.
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode file values.
    pub env_overrides: Vec<String>,
}

impl AppConfig {
    /// Load from the standard locations, `explicit`, and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered file cannot be read or parsed, or if
    /// `explicit` does not exist.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSources), ConfigError> {
        let mut files = discover_config_files();
        if let Some(path) = explicit {
            files.push(path.to_path_buf());
        }
        Self::load_layered(&files, |key| env::var(key).ok())
    }

    /// Load from `files` in order, then apply overrides from `lookup`.
    ///
    /// Tables are merged key by key, so a later file only needs the values it
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be read or parsed.
    pub fn load_layered<F>(
        files: &[PathBuf],
        lookup: F,
    ) -> Result<(Self, ConfigSources), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = toml::Table::new();
        let mut sources = ConfigSources::default();

        for path in files {
            let contents =
                std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
                    path: path.clone(),
                    source,
                })?;
            let table: toml::Table =
                contents
                    .parse()
                    .map_err(|e: toml::de::Error| ConfigError::Parse {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
            merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let mut config: Self = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: sources
                    .files
                    .last()
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from("<merged>")),
                message: e.to_string(),
            })?;
        config.capture.output_root = expand_path(&config.capture.output_root);

        config.apply_env_overrides(&lookup, &mut sources);
        Ok((config, sources))
    }

    /// Parse a single TOML document over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for invalid TOML or mistyped values.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns `Serialize` if a value cannot be represented.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Session tuning derived from the `[capture]` section.
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            failure_threshold: self.capture.failure_threshold,
            transfer_margin: Duration::from_secs(self.capture.transfer_margin_secs),
            frame_interval: Duration::from_secs(self.capture.frame_interval_secs),
        }
    }

    fn apply_env_overrides<F>(&mut self, lookup: &F, sources: &mut ConfigSources)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_OUTPUT_ROOT).filter(|v| !v.is_empty()) {
            self.capture.output_root = expand_path(Path::new(&root));
            sources.env_overrides.push(ENV_OUTPUT_ROOT.to_owned());
        }
        if let Some(binary) = lookup(ENV_GPHOTO2).filter(|v| !v.is_empty()) {
            self.gphoto2.binary = PathBuf::from(binary);
            sources.env_overrides.push(ENV_GPHOTO2.to_owned());
        }
    }
}

/// Existing config files in the standard locations, system first.
pub fn discover_config_files() -> Vec<PathBuf> {
    let mut candidates = vec![Path::new("/etc").join(APP_DIR).join(CONFIG_FILE)];
    if let Some(dirs) = directories::BaseDirs::new() {
        candidates.push(dirs.config_dir().join(APP_DIR).join(CONFIG_FILE));
    }
    candidates.into_iter().filter(|path| path.exists()).collect()
}

/// Merge `overlay` into `base`; nested tables merge, other values replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    directories::BaseDirs::new()
        .map_or_else(|| path.to_path_buf(), |dirs| dirs.home_dir().join(rest))
}
