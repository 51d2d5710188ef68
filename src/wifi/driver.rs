//! Network driver abstraction.
//!
//! The connection manager talks to the radio through [`NetworkDriver`]. Calls
//! return immediately; progress is reported later as [`DriverEvent`]s pushed
//! into the [`EventSink`] the manager registers with the driver.

use super::config::{AuthMode, CredentialSlot, FieldBuf, Phase2Method};
use super::connection::EventSink;
use crate::config::{PASSWORD_LEN, SSID_LEN};
use crate::error::DriverError;
use std::fmt;
use std::net::Ipv4Addr;

/// Result of a driver call.
pub type DriverResult = Result<(), DriverError>;

/// Asynchronous notification from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// The station interface started.
    Started,
    /// The station interface stopped.
    Stopped,
    /// The station lost (or never got) its association.
    Disconnected,
    /// DHCP assigned an address.
    AddressAcquired(IpInfo),
}

/// Address assigned to the station interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl fmt::Display for IpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ip {} netmask {} gateway {}",
            self.ip, self.netmask, self.gateway
        )
    }
}

/// Station configuration handed to [`NetworkDriver::set_station_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub ssid: FieldBuf<SSID_LEN>,
    pub password: FieldBuf<PASSWORD_LEN>,
    /// Weakest authentication mode the station accepts.
    pub auth_threshold: AuthMode,
}

impl From<&CredentialSlot> for StationConfig {
    fn from(slot: &CredentialSlot) -> Self {
        Self {
            ssid: slot.ssid.clone(),
            password: slot.password.clone(),
            auth_threshold: slot.auth_mode,
        }
    }
}

/// WiFi station driver.
///
/// Implementations must be callable from the event-delivery context, so
/// methods take `&self` and must not block on events.
pub trait NetworkDriver: Send + Sync {
    /// Bring up the network stack and leave the radio stopped.
    fn init_stack(&self) -> DriverResult;

    /// Put the radio in station mode.
    fn set_station_mode(&self) -> DriverResult;

    /// Configure the network to join.
    fn set_station_config(&self, config: &StationConfig) -> DriverResult;

    /// Whether enterprise (EAP) authentication is available.
    fn supports_enterprise(&self) -> bool {
        true
    }

    fn enable_enterprise(&self) -> DriverResult;

    fn disable_enterprise(&self) -> DriverResult;

    fn set_enterprise_identity(&self, identity: &[u8]) -> DriverResult;

    fn set_enterprise_username(&self, username: &[u8]) -> DriverResult;

    fn set_enterprise_password(&self, password: &[u8]) -> DriverResult;

    fn set_enterprise_phase2(&self, method: Phase2Method) -> DriverResult;

    /// Start the radio. Emits [`DriverEvent::Started`].
    fn start(&self) -> DriverResult;

    /// Stop the radio. Emits [`DriverEvent::Stopped`].
    fn stop(&self) -> DriverResult;

    /// Begin associating with the configured network.
    fn connect(&self) -> DriverResult;

    fn disconnect(&self) -> DriverResult;

    /// Register where events are delivered, replacing any earlier sink.
    fn subscribe(&self, sink: EventSink) -> DriverResult;

    /// Stop delivering events.
    fn unsubscribe(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_config_from_slot() {
        let slot = CredentialSlot::personal("home", "password123", AuthMode::Wpa3Psk).unwrap();
        let config = StationConfig::from(&slot);
        assert_eq!(config.ssid.as_bytes(), b"home");
        assert_eq!(config.password.as_bytes(), b"password123");
        assert_eq!(config.auth_threshold, AuthMode::Wpa3Psk);
    }

    #[test]
    fn test_ip_info_display() {
        let info = IpInfo {
            ip: Ipv4Addr::new(192, 168, 1, 100),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
        };
        assert_eq!(
            info.to_string(),
            "ip 192.168.1.100 netmask 255.255.255.0 gateway 192.168.1.1"
        );
    }
}
