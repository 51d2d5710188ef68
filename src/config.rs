//! Slot layout constants and connection tuning.
//!
//! Platform-independent configuration shared by the credential store and the
//! connection manager.

use std::fmt;
use std::time::Duration;

/// Number of addressable credential slots.
pub const MAX_SLOTS: u8 = 255;

/// NVS namespace holding the credential slots.
pub const NVS_NAMESPACE: &str = "wifi";

/// Longest key the persistent store accepts (ESP-IDF NVS: 15 chars + terminator).
pub const MAX_KEY_LEN: usize = 15;

/// Maximum SSID length per IEEE 802.11 standard.
pub const SSID_LEN: usize = 32;

/// Maximum passphrase length for WPA2/WPA3 personal.
pub const PASSWORD_LEN: usize = 64;

/// Maximum EAP identity length.
pub const IDENTITY_LEN: usize = 128;

/// Maximum EAP username length.
pub const USERNAME_LEN: usize = 128;

/// Raw retry count that means "retry forever".
pub const INFINITE_RETRIES: u8 = 255;

/// How many times the driver reconnects after a disconnect before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Give up after this many reconnect attempts.
    Limited(u8),
    /// Never give up.
    Infinite,
}

impl RetryPolicy {
    /// Whether another reconnect is allowed after `retry_count` attempts.
    pub fn allows(self, retry_count: u32) -> bool {
        match self {
            Self::Limited(max) => retry_count < u32::from(max),
            Self::Infinite => true,
        }
    }
}

impl From<u8> for RetryPolicy {
    fn from(raw: u8) -> Self {
        if raw == INFINITE_RETRIES {
            Self::Infinite
        } else {
            Self::Limited(raw)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Limited(3)
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{}", max),
            Self::Infinite => write!(f, "infinite"),
        }
    }
}

/// Runtime settings for [`ConnectionManager`](crate::wifi::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Retry policy used for each slot tried by `try_all_slots`.
    pub try_all_retries: RetryPolicy,
    /// How long `try_all_slots` waits on each slot.
    pub try_all_timeout: Duration,
    /// Number of slot indices scanned, starting at 0.
    pub max_slots: u8,
    /// Keep scanning past an empty slot instead of stopping at the first gap.
    pub skip_empty_slots: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            try_all_retries: RetryPolicy::Limited(3),
            try_all_timeout: Duration::from_millis(500),
            max_slots: MAX_SLOTS,
            skip_empty_slots: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_from_sentinel() {
        assert_eq!(RetryPolicy::from(255), RetryPolicy::Infinite);
        assert_eq!(RetryPolicy::from(0), RetryPolicy::Limited(0));
        assert_eq!(RetryPolicy::from(254), RetryPolicy::Limited(254));
    }

    #[test]
    fn test_retry_policy_allows() {
        let policy = RetryPolicy::Limited(2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
        assert!(!RetryPolicy::Limited(0).allows(0));
        assert!(RetryPolicy::Infinite.allows(u32::MAX));
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.try_all_retries, RetryPolicy::Limited(3));
        assert_eq!(config.try_all_timeout, Duration::from_millis(500));
        assert_eq!(config.max_slots, MAX_SLOTS);
        assert!(!config.skip_empty_slots);
    }

    #[test]
    fn test_retry_policy_display() {
        assert_eq!(RetryPolicy::Limited(3).to_string(), "3");
        assert_eq!(RetryPolicy::Infinite.to_string(), "infinite");
    }
}
