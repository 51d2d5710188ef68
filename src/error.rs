//! Error types shared by the credential store and the connection manager.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WifiError>;

/// Error reported by a [`NetworkDriver`](crate::wifi::NetworkDriver) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    /// Platform error code (an `esp_err_t` on ESP32).
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for DriverError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for DriverError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::new(e.code(), format!("{:?}", e))
    }
}

/// Errors surfaced by slot management and connection calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    /// No slot stored at the index, or no such key.
    NotFound,
    /// Input out of range or otherwise unusable.
    InvalidArgument(&'static str),
    /// A stored value does not fit the destination field.
    BufferTooSmall {
        key: String,
        len: usize,
        capacity: usize,
    },
    /// A driver configuration step failed.
    DriverConfigFailed {
        step: &'static str,
        source: DriverError,
    },
    /// Enterprise authentication is not available on this driver.
    Unsupported,
    /// `try_all_slots` found no slot that connected.
    AllSlotsExhausted,
    /// The persistent store failed to commit.
    StorageCommitFailed(String),
    /// Any other failure reported by the persistent store.
    Storage(String),
}

impl WifiError {
    /// Wrap a driver failure with the configuration step that produced it.
    pub fn driver(step: &'static str, source: DriverError) -> Self {
        Self::DriverConfigFailed { step, source }
    }
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            Self::BufferTooSmall { key, len, capacity } => write!(
                f,
                "stored value for '{}' is {} bytes (capacity {})",
                key, len, capacity
            ),
            Self::DriverConfigFailed { step, source } => {
                write!(f, "driver configuration failed ({}): {}", step, source)
            }
            Self::Unsupported => write!(f, "enterprise authentication not supported"),
            Self::AllSlotsExhausted => write!(f, "tried all stored networks, unable to connect"),
            Self::StorageCommitFailed(msg) => write!(f, "storage commit failed: {}", msg),
            Self::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for WifiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DriverConfigFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::new(0x3001, "ESP_ERR_WIFI_NOT_INIT");
        assert_eq!(err.to_string(), "ESP_ERR_WIFI_NOT_INIT (code 12289)");
    }

    #[test]
    fn test_config_failed_has_source() {
        let err = WifiError::driver("set config", DriverError::new(-1, "boom"));
        assert!(err.to_string().contains("set config"));
        assert!(err.source().is_some());
        assert!(WifiError::NotFound.source().is_none());
    }

    #[test]
    fn test_buffer_too_small_display() {
        let err = WifiError::BufferTooSmall {
            key: "s00.ssid".to_string(),
            len: 40,
            capacity: 32,
        };
        assert_eq!(
            err.to_string(),
            "stored value for 's00.ssid' is 40 bytes (capacity 32)"
        );
    }
}
