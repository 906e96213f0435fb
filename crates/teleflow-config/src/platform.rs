//! Host platform capabilities the validator depends on.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::settings::{self, ValidationSettings};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("device type lookup failed: {0}")]
    DeviceType(String),

    #[error("secret encryption failed: {0}")]
    Encryption(String),

    #[error("secret vault unavailable on {0}")]
    VaultUnavailable(DeviceType),
}

/// Kind of device the agent runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    BigIp,
    Container,
}

impl DeviceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "bigip" => Some(Self::BigIp),
            "container" => Some(Self::Container),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BigIp => write!(f, "BIG-IP"),
            Self::Container => write!(f, "Container"),
        }
    }
}

/// Platform services used by deferred keyword checks.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn device_type(&self) -> Result<DeviceType, PlatformError>;

    /// Encrypt a plain-text secret into the device vault format.
    async fn encrypt_secret(&self, plain_text: &str) -> Result<String, PlatformError>;
}

/// Platform with a fixed device type and no secret vault.
#[derive(Debug, Clone)]
pub struct LocalPlatform {
    device: DeviceType,
}

impl LocalPlatform {
    pub fn new(device: DeviceType) -> Self {
        Self { device }
    }
}

#[async_trait]
impl Platform for LocalPlatform {
    async fn device_type(&self) -> Result<DeviceType, PlatformError> {
        Ok(self.device)
    }

    async fn encrypt_secret(&self, _plain_text: &str) -> Result<String, PlatformError> {
        Err(PlatformError::VaultUnavailable(self.device))
    }
}

/// Bounds of a host connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConnectivityOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Everything keyword checks may consult besides the document itself.
#[derive(Clone)]
pub struct ValidationContext {
    /// Expand backtick pointers (`f5expand`).
    pub expand: bool,
    pub platform: Arc<dyn Platform>,
    pub connectivity: ConnectivityOptions,
    /// Version compared by `nodeSupportVersion`.
    pub runtime_version: semver::Version,
}

impl ValidationContext {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            expand: true,
            platform,
            connectivity: ConnectivityOptions::default(),
            runtime_version: semver::Version::parse(env!("CARGO_PKG_VERSION"))
                .unwrap_or_else(|_| semver::Version::new(0, 0, 0)),
        }
    }

    pub fn from_settings(
        settings: &ValidationSettings,
        platform: Arc<dyn Platform>,
    ) -> settings::Result<Self> {
        Ok(Self {
            expand: settings.expand,
            platform,
            connectivity: ConnectivityOptions {
                timeout: settings.connectivity_timeout()?,
                poll_interval: settings.connectivity_poll_interval()?,
            },
            runtime_version: settings.runtime_version()?,
        })
    }
}

impl fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("expand", &self.expand)
            .field("connectivity", &self.connectivity)
            .field("runtime_version", &self.runtime_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_device_type() {
        assert_eq!(DeviceType::parse("BIG-IP"), Some(DeviceType::BigIp));
        assert_eq!(DeviceType::parse("big_ip"), Some(DeviceType::BigIp));
        assert_eq!(DeviceType::parse("container"), Some(DeviceType::Container));
        assert_eq!(DeviceType::parse("toaster"), None);
    }

    #[tokio::test]
    async fn local_platform_has_no_vault() {
        let p = LocalPlatform::new(DeviceType::Container);
        assert_eq!(p.device_type().await.unwrap(), DeviceType::Container);
        let err = p.encrypt_secret("x").await.unwrap_err();
        assert!(err.to_string().contains("vault unavailable on Container"));
    }

    #[test]
    fn context_from_settings() {
        let settings = crate::settings::parse(
            "[validation]\nexpand = false\nconnectivity_timeout = \"2s\"\nruntime_version = \"2.0.0\"\n",
        )
        .unwrap();
        let ctx = ValidationContext::from_settings(
            &settings.validation,
            Arc::new(LocalPlatform::new(DeviceType::BigIp)),
        )
        .unwrap();
        assert!(!ctx.expand);
        assert_eq!(ctx.connectivity.timeout, Duration::from_secs(2));
        assert_eq!(ctx.runtime_version, semver::Version::new(2, 0, 0));
    }
}
