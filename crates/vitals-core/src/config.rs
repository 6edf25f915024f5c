//! Client configuration.

use std::time::Duration;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::platform::ScanFilter;
use crate::uuid::VITALS_SERVICE;

/// Fixed scan window: the client scans for the full duration to build a
/// complete device list rather than stopping at the first match.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Default timeout for establishing the BLE link.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery after the link is up.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default advertised-name substring identifying the sensor.
pub const DEFAULT_NAME_FILTER: &str = "Vitals";

/// Configuration for a [`BleClient`](crate::BleClient).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vitals_core::ClientConfig;
///
/// let config = ClientConfig::default()
///     .name_filter("Radar")
///     .connect_timeout(Duration::from_secs(20));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a scan window lasts.
    pub scan_duration: Duration,
    /// Case-insensitive substring an advertised name must contain.
    /// An empty filter matches every named device.
    pub name_filter: String,
    /// Timeout for establishing a BLE connection.
    pub connect_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// Service that must carry the four vitals characteristics.
    pub service_uuid: Uuid,
    /// Ask the platform to only report advertisers of `service_uuid`.
    /// Off by default: many sensors leave the service out of their
    /// advertisement and are only recognisable by name.
    pub scan_for_service: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            name_filter: DEFAULT_NAME_FILTER.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            service_uuid: VITALS_SERVICE,
            scan_for_service: false,
        }
    }
}

impl ClientConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan window.
    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the advertised-name filter.
    #[must_use]
    pub fn name_filter(mut self, filter: impl Into<String>) -> Self {
        self.name_filter = filter.into();
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the service UUID to look for during discovery.
    #[must_use]
    pub fn service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = uuid;
        self
    }

    /// Restrict scans to advertisers of the configured service.
    #[must_use]
    pub fn scan_for_service(mut self, enabled: bool) -> Self {
        self.scan_for_service = enabled;
        self
    }

    /// Scan filter handed to the platform.
    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            services: if self.scan_for_service {
                vec![self.service_uuid]
            } else {
                Vec::new()
            },
        }
    }

    /// Whether an advertised name passes the name filter.
    pub fn matches_name(&self, name: &str) -> bool {
        name.to_lowercase()
            .contains(&self.name_filter.to_lowercase())
    }

    /// Validate the configuration.
    ///
    /// Checks that the scan window and both timeouts are non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.scan_duration.is_zero() {
            return Err(Error::invalid_config("scan_duration must be > 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::invalid_config("connect_timeout must be > 0"));
        }
        if self.discovery_timeout.is_zero() {
            return Err(Error::invalid_config("discovery_timeout must be > 0"));
        }
        Ok(())
    }
}
