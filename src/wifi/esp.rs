//! ESP-IDF WiFi station driver.
//!
//! Station mode, configuration and start/stop/connect go through `EspWifi`,
//! which also brings up netif and the WiFi driver with its own NVS storage
//! disabled. The EAP client and the 802.11b rate switch have no
//! `esp-idf-svc` wrapper and use `esp-idf-sys` directly. Driver events reach
//! the registered [`EventSink`] from the system event loop task.

use super::config::{AuthMode, Phase2Method};
use super::connection::EventSink;
use super::driver::{DriverEvent, DriverResult, IpInfo, NetworkDriver, StationConfig};
use crate::error::DriverError;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::{self as sys, esp, EspError};
use log::{info, warn};
use std::ffi::c_void;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Event handler registrations and the sink they deliver to.
struct Registration {
    wifi: sys::esp_event_handler_instance_t,
    ip: sys::esp_event_handler_instance_t,
    sink: *mut EventSink,
}

// SAFETY: the handles are opaque tokens owned by the event loop and the sink
// pointer is only dereferenced by `on_event` while registered.
unsafe impl Send for Registration {}

/// [`NetworkDriver`] backed by the ESP-IDF WiFi driver.
pub struct EspDriver {
    wifi: Mutex<EspWifi<'static>>,
    _sysloop: EspSystemEventLoop,
    registration: Mutex<Option<Registration>>,
}

impl EspDriver {
    /// Create the WiFi driver on `modem`.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), None)?;
        Ok(Self {
            wifi: Mutex::new(wifi),
            _sysloop: sysloop,
            registration: Mutex::new(None),
        })
    }

    fn wifi(&self) -> MutexGuard<'_, EspWifi<'static>> {
        self.wifi.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registration(&self) -> MutexGuard<'_, Option<Registration>> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for EspDriver {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl NetworkDriver for EspDriver {
    fn init_stack(&self) -> DriverResult {
        // The stack is brought up by `EspWifi::new`; leave the radio stopped.
        self.wifi().stop()?;
        Ok(())
    }

    fn set_station_mode(&self) -> DriverResult {
        // A client configuration selects station mode.
        self.wifi()
            .set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        Ok(())
    }

    fn set_station_config(&self, config: &StationConfig) -> DriverResult {
        let client = ClientConfiguration {
            ssid: utf8_field(config.ssid.as_bytes(), "SSID")?,
            password: utf8_field(config.password.as_bytes(), "password")?,
            auth_method: auth_method(config.auth_threshold),
            ..Default::default()
        };
        self.wifi()
            .set_configuration(&Configuration::Client(client))?;

        // Disable 802.11b rates on the station interface.
        #[cfg(not(esp32p4))]
        if let Err(e) = esp!(unsafe { sys::esp_wifi_config_11b_rate(sys::wifi_interface_t_WIFI_IF_STA, true) }) {
            warn!("Failed to disable 802.11b rates: {:?}", e);
        }
        Ok(())
    }

    fn supports_enterprise(&self) -> bool {
        !cfg!(esp32p4)
    }

    #[cfg(not(esp32p4))]
    fn enable_enterprise(&self) -> DriverResult {
        esp!(unsafe { sys::esp_wifi_sta_enterprise_enable() })?;
        Ok(())
    }

    #[cfg(not(esp32p4))]
    fn disable_enterprise(&self) -> DriverResult {
        esp!(unsafe { sys::esp_wifi_sta_enterprise_disable() })?;
        Ok(())
    }

    #[cfg(not(esp32p4))]
    fn set_enterprise_identity(&self, identity: &[u8]) -> DriverResult {
        esp!(unsafe { sys::esp_eap_client_set_identity(identity.as_ptr(), identity.len() as i32) })?;
        Ok(())
    }

    #[cfg(not(esp32p4))]
    fn set_enterprise_username(&self, username: &[u8]) -> DriverResult {
        esp!(unsafe { sys::esp_eap_client_set_username(username.as_ptr(), username.len() as i32) })?;
        Ok(())
    }

    #[cfg(not(esp32p4))]
    fn set_enterprise_password(&self, password: &[u8]) -> DriverResult {
        esp!(unsafe { sys::esp_eap_client_set_password(password.as_ptr(), password.len() as i32) })?;
        Ok(())
    }

    #[cfg(not(esp32p4))]
    fn set_enterprise_phase2(&self, method: Phase2Method) -> DriverResult {
        esp!(unsafe {
            sys::esp_eap_client_set_ttls_phase2_method(method.to_raw() as sys::esp_eap_ttls_phase2_types)
        })?;
        Ok(())
    }

    #[cfg(esp32p4)]
    fn enable_enterprise(&self) -> DriverResult {
        Err(not_supported())
    }

    #[cfg(esp32p4)]
    fn disable_enterprise(&self) -> DriverResult {
        Ok(())
    }

    #[cfg(esp32p4)]
    fn set_enterprise_identity(&self, _identity: &[u8]) -> DriverResult {
        Err(not_supported())
    }

    #[cfg(esp32p4)]
    fn set_enterprise_username(&self, _username: &[u8]) -> DriverResult {
        Err(not_supported())
    }

    #[cfg(esp32p4)]
    fn set_enterprise_password(&self, _password: &[u8]) -> DriverResult {
        Err(not_supported())
    }

    #[cfg(esp32p4)]
    fn set_enterprise_phase2(&self, _method: Phase2Method) -> DriverResult {
        Err(not_supported())
    }

    fn start(&self) -> DriverResult {
        self.wifi().start()?;
        Ok(())
    }

    fn stop(&self) -> DriverResult {
        self.wifi().stop()?;
        Ok(())
    }

    fn connect(&self) -> DriverResult {
        self.wifi().connect()?;
        Ok(())
    }

    fn disconnect(&self) -> DriverResult {
        self.wifi().disconnect()?;
        Ok(())
    }

    fn subscribe(&self, sink: EventSink) -> DriverResult {
        self.unsubscribe();

        let sink = Box::into_raw(Box::new(sink));
        let mut wifi: sys::esp_event_handler_instance_t = core::ptr::null_mut();
        let mut ip: sys::esp_event_handler_instance_t = core::ptr::null_mut();

        let registered = esp!(unsafe {
            sys::esp_event_handler_instance_register(
                sys::WIFI_EVENT,
                sys::ESP_EVENT_ANY_ID,
                Some(on_event),
                sink as *mut c_void,
                &mut wifi,
            )
        })
        .and_then(|()| {
            esp!(unsafe {
                sys::esp_event_handler_instance_register(
                    sys::IP_EVENT,
                    sys::ip_event_t_IP_EVENT_STA_GOT_IP as i32,
                    Some(on_event),
                    sink as *mut c_void,
                    &mut ip,
                )
            })
        });

        let registration = Registration { wifi, ip, sink };
        if let Err(e) = registered {
            release(registration);
            return Err(e.into());
        }

        *self.registration() = Some(registration);
        info!("WiFi event handlers registered");
        Ok(())
    }

    fn unsubscribe(&self) {
        if let Some(registration) = self.registration().take() {
            release(registration);
        }
    }
}

/// Unregister both handlers and free the sink.
fn release(registration: Registration) {
    unsafe {
        if !registration.wifi.is_null() {
            sys::esp_event_handler_instance_unregister(
                sys::WIFI_EVENT,
                sys::ESP_EVENT_ANY_ID,
                registration.wifi,
            );
        }
        if !registration.ip.is_null() {
            sys::esp_event_handler_instance_unregister(
                sys::IP_EVENT,
                sys::ip_event_t_IP_EVENT_STA_GOT_IP as i32,
                registration.ip,
            );
        }
        drop(Box::from_raw(registration.sink));
    }
}

unsafe extern "C" fn on_event(
    arg: *mut c_void,
    base: sys::esp_event_base_t,
    id: i32,
    data: *mut c_void,
) {
    let sink = &*(arg as *const EventSink);

    let event = if base == sys::WIFI_EVENT {
        match id as sys::wifi_event_t {
            sys::wifi_event_t_WIFI_EVENT_STA_START => Some(DriverEvent::Started),
            sys::wifi_event_t_WIFI_EVENT_STA_STOP => Some(DriverEvent::Stopped),
            sys::wifi_event_t_WIFI_EVENT_STA_DISCONNECTED => Some(DriverEvent::Disconnected),
            _ => None,
        }
    } else if base == sys::IP_EVENT && id as sys::ip_event_t == sys::ip_event_t_IP_EVENT_STA_GOT_IP {
        let got_ip = &*(data as *const sys::ip_event_got_ip_t);
        Some(DriverEvent::AddressAcquired(IpInfo {
            ip: ipv4(got_ip.ip_info.ip),
            netmask: ipv4(got_ip.ip_info.netmask),
            gateway: ipv4(got_ip.ip_info.gw),
        }))
    } else {
        None
    };

    if let Some(event) = event {
        sink.dispatch(event);
    }
}

/// `esp_ip4_addr_t` holds the address in network byte order.
fn ipv4(addr: sys::esp_ip4_addr_t) -> Ipv4Addr {
    Ipv4Addr::from(addr.addr.to_le_bytes())
}

/// Station threshold for an [`AuthMode`].
fn auth_method(mode: AuthMode) -> AuthMethod {
    match mode {
        AuthMode::Open => AuthMethod::None,
        AuthMode::Wep => AuthMethod::WEP,
        AuthMode::WpaPsk => AuthMethod::WPA,
        AuthMode::Wpa2Psk => AuthMethod::WPA2Personal,
        AuthMode::WpaWpa2Psk => AuthMethod::WPAWPA2Personal,
        AuthMode::Wpa3Psk => AuthMethod::WPA3Personal,
        AuthMode::Wpa2Wpa3Psk => AuthMethod::WPA2WPA3Personal,
        AuthMode::Enterprise | AuthMode::Wpa3Enterprise | AuthMode::Wpa2Wpa3Enterprise => {
            AuthMethod::WPA2Enterprise
        }
        AuthMode::Other(_) => AuthMethod::WPA2Personal,
    }
}

/// `esp-idf-svc` takes SSID and password as UTF-8 strings.
fn utf8_field<T>(bytes: &[u8], what: &str) -> Result<T, DriverError>
where
    T: for<'a> TryFrom<&'a str>,
{
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| T::try_from(text).ok())
        .ok_or_else(|| {
            DriverError::new(
                sys::ESP_ERR_INVALID_ARG as i32,
                format!("{} is not valid UTF-8 or too long", what),
            )
        })
}

#[cfg(esp32p4)]
fn not_supported() -> DriverError {
    DriverError::new(sys::ESP_ERR_NOT_SUPPORTED as i32, "ESP_ERR_NOT_SUPPORTED")
}
