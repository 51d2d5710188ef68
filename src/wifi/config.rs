//! WiFi credential data structures.
//!
//! This module contains platform-independent types for the credentials stored
//! in a slot. They can be tested on the host machine.
//!
//! # Example
//!
//! ```
//! use wifi_slots_esp32::wifi::{AuthMode, CredentialSlot};
//!
//! let slot = CredentialSlot::personal("MyNetwork", "MyPassword", AuthMode::Wpa2Psk).unwrap();
//! assert!(slot.validate().is_ok());
//! assert!(!slot.auth_mode.is_enterprise());
//! ```

use crate::config::{IDENTITY_LEN, PASSWORD_LEN, SSID_LEN, USERNAME_LEN};
use crate::error::{Result, WifiError};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum passphrase length for WPA personal modes.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Fixed-capacity byte buffer with an explicit logical length.
///
/// Bytes past `len` are always zero. Contents are not null-terminated and may
/// hold any byte value. The buffer is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldBuf<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> FieldBuf<N> {
    /// Copy `data` into a new buffer.
    ///
    /// Fails with [`WifiError::InvalidArgument`] if `data` exceeds the capacity.
    pub fn new(data: &[u8]) -> Result<Self> {
        if data.len() > N {
            return Err(WifiError::InvalidArgument("field exceeds capacity"));
        }
        let mut bytes = [0u8; N];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            bytes,
            len: data.len(),
        })
    }

    /// The logical contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Logical length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Declared capacity.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Contents as text, replacing invalid UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl<const N: usize> Default for FieldBuf<N> {
    fn default() -> Self {
        Self {
            bytes: [0u8; N],
            len: 0,
        }
    }
}

impl<const N: usize> PartialEq for FieldBuf<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> Eq for FieldBuf<N> {}

impl<const N: usize> TryFrom<&str> for FieldBuf<N> {
    type Error = WifiError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value.as_bytes())
    }
}

impl<const N: usize> fmt::Debug for FieldBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// Station authentication threshold.
///
/// Discriminants follow ESP-IDF's `wifi_auth_mode_t`, which is also the
/// persisted representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    /// WPA2-Enterprise.
    Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    Wpa3Enterprise,
    Wpa2Wpa3Enterprise,
    /// Any other driver value, kept verbatim.
    Other(u32),
}

impl AuthMode {
    /// Whether this mode authenticates through EAP.
    pub fn is_enterprise(self) -> bool {
        matches!(
            self,
            Self::Enterprise | Self::Wpa3Enterprise | Self::Wpa2Wpa3Enterprise
        )
    }

    /// Whether this mode uses a pre-shared passphrase.
    pub fn is_personal(self) -> bool {
        matches!(
            self,
            Self::WpaPsk | Self::Wpa2Psk | Self::WpaWpa2Psk | Self::Wpa3Psk | Self::Wpa2Wpa3Psk
        )
    }

    /// Raw `wifi_auth_mode_t` value.
    pub fn to_raw(self) -> u32 {
        match self {
            Self::Open => 0,
            Self::Wep => 1,
            Self::WpaPsk => 2,
            Self::Wpa2Psk => 3,
            Self::WpaWpa2Psk => 4,
            Self::Enterprise => 5,
            Self::Wpa3Psk => 6,
            Self::Wpa2Wpa3Psk => 7,
            Self::Wpa3Enterprise => 14,
            Self::Wpa2Wpa3Enterprise => 15,
            Self::Other(raw) => raw,
        }
    }

    /// Decode a raw `wifi_auth_mode_t` value.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Wep,
            2 => Self::WpaPsk,
            3 => Self::Wpa2Psk,
            4 => Self::WpaWpa2Psk,
            5 => Self::Enterprise,
            6 => Self::Wpa3Psk,
            7 => Self::Wpa2Wpa3Psk,
            14 => Self::Wpa3Enterprise,
            15 => Self::Wpa2Wpa3Enterprise,
            other => Self::Other(other),
        }
    }
}

/// EAP-TTLS inner authentication method.
///
/// Discriminants follow ESP-IDF's `esp_eap_ttls_phase2_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase2Method {
    #[default]
    Eap,
    MsChapV2,
    MsChap,
    Pap,
    Chap,
    Other(u32),
}

impl Phase2Method {
    /// Raw `esp_eap_ttls_phase2_types` value.
    pub fn to_raw(self) -> u32 {
        match self {
            Self::Eap => 0,
            Self::MsChapV2 => 1,
            Self::MsChap => 2,
            Self::Pap => 3,
            Self::Chap => 4,
            Self::Other(raw) => raw,
        }
    }

    /// Decode a raw `esp_eap_ttls_phase2_types` value.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Eap,
            1 => Self::MsChapV2,
            2 => Self::MsChap,
            3 => Self::Pap,
            4 => Self::Chap,
            other => Self::Other(other),
        }
    }
}

/// Credentials for one stored network.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSlot {
    /// Network SSID.
    pub ssid: FieldBuf<SSID_LEN>,
    /// Passphrase for personal modes, EAP password for enterprise modes.
    pub password: FieldBuf<PASSWORD_LEN>,
    /// EAP outer identity.
    pub identity: FieldBuf<IDENTITY_LEN>,
    /// EAP inner username.
    pub username: FieldBuf<USERNAME_LEN>,
    /// Minimum accepted authentication mode.
    pub auth_mode: AuthMode,
    /// EAP-TTLS phase 2 method.
    pub phase2: Phase2Method,
}

impl CredentialSlot {
    /// Credentials for an open network.
    pub fn open(ssid: &str) -> Result<Self> {
        let slot = Self {
            ssid: ssid.try_into()?,
            ..Default::default()
        };
        slot.validate()?;
        Ok(slot)
    }

    /// Credentials for a passphrase-protected network.
    pub fn personal(ssid: &str, password: &str, auth_mode: AuthMode) -> Result<Self> {
        let slot = Self {
            ssid: ssid.try_into()?,
            password: password.try_into()?,
            auth_mode,
            ..Default::default()
        };
        slot.validate()?;
        Ok(slot)
    }

    /// Credentials for an EAP network.
    pub fn enterprise(
        ssid: &str,
        identity: &str,
        username: &str,
        password: &str,
        auth_mode: AuthMode,
        phase2: Phase2Method,
    ) -> Result<Self> {
        if !auth_mode.is_enterprise() {
            return Err(WifiError::InvalidArgument("auth mode is not enterprise"));
        }
        let slot = Self {
            ssid: ssid.try_into()?,
            password: password.try_into()?,
            identity: identity.try_into()?,
            username: username.try_into()?,
            auth_mode,
            phase2,
        };
        slot.validate()?;
        Ok(slot)
    }

    /// Validate the credentials before they are stored.
    pub fn validate(&self) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(WifiError::InvalidArgument("SSID cannot be empty"));
        }
        if self.auth_mode.is_personal() && self.password.len() < MIN_PASSWORD_LEN {
            return Err(WifiError::InvalidArgument("passphrase too short"));
        }
        Ok(())
    }
}

impl fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSlot")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("identity", &"<redacted>")
            .field("username", &"<redacted>")
            .field("auth_mode", &self.auth_mode)
            .field("phase2", &self.phase2)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== FieldBuf Tests ====================

    #[test]
    fn test_field_buf_tracks_length() {
        let buf = FieldBuf::<32>::new(b"home").unwrap();
        assert_eq!(buf.as_bytes(), b"home");
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.capacity(), 32);
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_field_buf_full_capacity() {
        let data = [b'a'; 32];
        let buf = FieldBuf::<32>::new(&data).unwrap();
        assert_eq!(buf.len(), 32);
        assert_eq!(buf.as_bytes(), &data[..]);
    }

    #[test]
    fn test_field_buf_too_long() {
        let data = [b'a'; 33];
        assert!(matches!(
            FieldBuf::<32>::new(&data),
            Err(WifiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_field_buf_keeps_interior_nul() {
        let buf = FieldBuf::<8>::new(&[b'a', 0, b'b']).unwrap();
        assert_eq!(buf.len(), 3);
        assert_ne!(buf, FieldBuf::<8>::new(b"a").unwrap());
    }

    #[test]
    fn test_field_buf_zeroize_clears_contents() {
        let mut buf = FieldBuf::<16>::new(b"secret").unwrap();
        buf.zeroize();
        assert!(buf.is_empty());
        assert_eq!(buf, FieldBuf::default());
    }

    // ==================== AuthMode Tests ====================

    #[test]
    fn test_auth_mode_raw_values() {
        for mode in [
            AuthMode::Open,
            AuthMode::Wep,
            AuthMode::WpaPsk,
            AuthMode::Wpa2Psk,
            AuthMode::WpaWpa2Psk,
            AuthMode::Enterprise,
            AuthMode::Wpa3Psk,
            AuthMode::Wpa2Wpa3Psk,
            AuthMode::Wpa3Enterprise,
            AuthMode::Wpa2Wpa3Enterprise,
            AuthMode::Other(42),
        ] {
            assert_eq!(AuthMode::from_raw(mode.to_raw()), mode);
        }
        assert_eq!(AuthMode::Wpa2Psk.to_raw(), 3);
        assert_eq!(AuthMode::Enterprise.to_raw(), 5);
    }

    #[test]
    fn test_auth_mode_enterprise_variants() {
        assert!(AuthMode::Enterprise.is_enterprise());
        assert!(AuthMode::Wpa3Enterprise.is_enterprise());
        assert!(AuthMode::Wpa2Wpa3Enterprise.is_enterprise());
        assert!(!AuthMode::Wpa2Psk.is_enterprise());
        assert!(!AuthMode::Open.is_enterprise());
    }

    #[test]
    fn test_phase2_raw_values() {
        assert_eq!(Phase2Method::from_raw(1), Phase2Method::MsChapV2);
        assert_eq!(Phase2Method::Pap.to_raw(), 3);
        assert_eq!(Phase2Method::from_raw(99), Phase2Method::Other(99));
    }

    // ==================== CredentialSlot Tests ====================

    #[test]
    fn test_personal_slot() {
        let slot = CredentialSlot::personal("TestNetwork", "password123", AuthMode::Wpa2Psk).unwrap();
        assert_eq!(slot.ssid.as_bytes(), b"TestNetwork");
        assert_eq!(slot.password.as_bytes(), b"password123");
        assert!(slot.identity.is_empty());
    }

    #[test]
    fn test_open_slot() {
        let slot = CredentialSlot::open("OpenNetwork").unwrap();
        assert_eq!(slot.auth_mode, AuthMode::Open);
        assert!(slot.password.is_empty());
    }

    #[test]
    fn test_empty_ssid_rejected() {
        assert!(matches!(
            CredentialSlot::open(""),
            Err(WifiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_short_passphrase_rejected() {
        let result = CredentialSlot::personal("TestNetwork", "short", AuthMode::Wpa2Psk);
        assert!(matches!(result, Err(WifiError::InvalidArgument(_))));
    }

    #[test]
    fn test_enterprise_slot() {
        let slot = CredentialSlot::enterprise(
            "eduroam",
            "anonymous@example.org",
            "alice@example.org",
            "hunter2",
            AuthMode::Enterprise,
            Phase2Method::MsChapV2,
        )
        .unwrap();
        assert_eq!(slot.username.as_bytes(), b"alice@example.org");
        assert_eq!(slot.phase2, Phase2Method::MsChapV2);
    }

    #[test]
    fn test_enterprise_requires_enterprise_mode() {
        let result = CredentialSlot::enterprise(
            "eduroam",
            "id",
            "user",
            "pass",
            AuthMode::Wpa2Psk,
            Phase2Method::Eap,
        );
        assert!(matches!(result, Err(WifiError::InvalidArgument(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let slot = CredentialSlot::personal("TestNetwork", "supersecret", AuthMode::Wpa2Psk).unwrap();
        let debug_str = format!("{:?}", slot);
        assert!(debug_str.contains("TestNetwork"));
        assert!(!debug_str.contains("supersecret"));
    }
}
