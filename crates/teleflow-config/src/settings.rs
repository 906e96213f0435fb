use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid duration format: {0}")]
    InvalidDuration(String),
}

impl From<SettingsError> for teleflow_core::TeleflowError {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;

// ---------------------------------------------------------------------------
// TOML data model
// ---------------------------------------------------------------------------

/// Top-level agent settings file (`teleflow.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub normalize: NormalizeSettings,
}

/// Declaration validation behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationSettings {
    /// Expand backtick pointers in declarations (default: true).
    #[serde(default = "default_true")]
    pub expand: bool,
    /// Upper bound for a host connectivity probe (human-readable, e.g. "5s").
    #[serde(default = "default_connectivity_timeout")]
    pub connectivity_timeout: String,
    /// Delay between connection attempts inside the timeout.
    #[serde(default = "default_connectivity_poll")]
    pub connectivity_poll_interval: String,
    /// Runtime version checked by `nodeSupportVersion` (default: this build).
    #[serde(default)]
    pub runtime_version: Option<String>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            expand: default_true(),
            connectivity_timeout: default_connectivity_timeout(),
            connectivity_poll_interval: default_connectivity_poll(),
            runtime_version: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level for teleflow targets (default: "info").
    #[serde(default = "default_level")]
    pub level: String,
    /// "pretty" or "json" (default: "pretty").
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeSettings {
    /// Properties definitions overriding the built-in ones.
    #[serde(default)]
    pub properties_file: Option<PathBuf>,
    /// Category assigned to events no classification rule matches.
    #[serde(default = "default_event_category")]
    pub events_default_category: String,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            properties_file: None,
            events_default_category: default_event_category(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_connectivity_timeout() -> String {
    "5s".into()
}
fn default_connectivity_poll() -> String {
    "500ms".into()
}
fn default_level() -> String {
    "info".into()
}
fn default_format() -> String {
    "pretty".into()
}
fn default_event_category() -> String {
    "event".into()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load and parse a TOML settings file.
pub fn load(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

/// Parse a TOML string into validated settings.
pub fn parse(toml_str: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(toml_str)?;
    validate(&settings)?;
    Ok(settings)
}

impl ValidationSettings {
    pub fn connectivity_timeout(&self) -> Result<Duration> {
        parse_duration_string(&self.connectivity_timeout)
    }

    pub fn connectivity_poll_interval(&self) -> Result<Duration> {
        parse_duration_string(&self.connectivity_poll_interval)
    }

    /// The configured runtime version, or the version of this build.
    pub fn runtime_version(&self) -> Result<semver::Version> {
        let raw = self
            .runtime_version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"));
        semver::Version::parse(raw).map_err(|e| {
            SettingsError::Validation(format!("runtime_version '{raw}' is not a semver: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(settings: &Settings) -> Result<()> {
    let v = &settings.validation;

    let timeout = v.connectivity_timeout().map_err(|_| {
        SettingsError::Validation(format!(
            "invalid connectivity_timeout format: '{}'",
            v.connectivity_timeout
        ))
    })?;
    if timeout < Duration::from_millis(100) {
        return Err(SettingsError::Validation(format!(
            "connectivity_timeout must be >= 100ms, got {}ms",
            timeout.as_millis()
        )));
    }

    let poll = v.connectivity_poll_interval().map_err(|_| {
        SettingsError::Validation(format!(
            "invalid connectivity_poll_interval format: '{}'",
            v.connectivity_poll_interval
        ))
    })?;
    if poll < Duration::from_millis(10) || poll > timeout {
        return Err(SettingsError::Validation(format!(
            "connectivity_poll_interval must be between 10ms and connectivity_timeout, got {}ms",
            poll.as_millis()
        )));
    }

    v.runtime_version()?;

    if teleflow_core::logging::LogFormat::parse(&settings.logging.format).is_none() {
        return Err(SettingsError::Validation(format!(
            "logging.format must be 'pretty' or 'json', got '{}'",
            settings.logging.format
        )));
    }
    if !matches!(
        settings.logging.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    ) {
        return Err(SettingsError::Validation(format!(
            "logging.level '{}' is not a known level",
            settings.logging.level
        )));
    }

    if settings.normalize.events_default_category.is_empty() {
        return Err(SettingsError::Validation(
            "normalize.events_default_category must not be empty".into(),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Duration string parsing
// ---------------------------------------------------------------------------

/// Parse a human-readable duration ("500ms", "5s", "2m") into a `Duration`.
/// A bare number is taken as milliseconds.
pub fn parse_duration_string(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SettingsError::InvalidDuration("empty string".into()));
    }

    let (num_part, multiplier_ms) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1u64)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1000u64)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60 * 1000u64)
    } else {
        (s, 1u64)
    };

    let num: u64 = num_part.trim().parse().map_err(|_| {
        SettingsError::InvalidDuration(format!("cannot parse number: '{}'", num_part))
    })?;

    let millis = num.checked_mul(multiplier_ms).ok_or_else(|| {
        SettingsError::InvalidDuration(format!("duration out of range: '{}'", s))
    })?;
    Ok(Duration::from_millis(millis))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
