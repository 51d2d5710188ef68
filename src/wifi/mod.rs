//! WiFi credential slots and station connection management.
//!
//! # Components
//!
//! - [`config`] - credential slot types and validation
//! - [`storage`] - slot persistence with compaction on erase
//! - [`driver`] - the [`NetworkDriver`] seam and its event types
//! - [`connection`] - connection state machine and retry policy
//! - [`sim`] - in-process driver for host runs and tests
//! - `esp` - ESP-IDF driver (ESP32 only)

pub mod config;
pub mod connection;
pub mod driver;
#[cfg(feature = "esp32")]
mod esp;
pub mod sim;
pub mod storage;

pub use config::{AuthMode, CredentialSlot, FieldBuf, Phase2Method, MIN_PASSWORD_LEN};
pub use connection::{ConnectionManager, ConnectionPhase, ConnectionState, EventSink};
pub use driver::{DriverEvent, DriverResult, IpInfo, NetworkDriver, StationConfig};
#[cfg(feature = "esp32")]
pub use esp::EspDriver;
pub use sim::SimulatedDriver;
pub use storage::CredentialStore;
