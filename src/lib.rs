//! WiFi slot firmware library.
//!
//! Persistent multi-slot WiFi credentials and a station connection manager
//! with bounded or infinite retries. Everything except the ESP-IDF driver and
//! NVS backend is platform-independent and tested on the host.

pub mod config;
pub mod error;
pub mod persistence;
pub mod wifi;

// Re-export commonly used items
pub use config::{ConnectionConfig, RetryPolicy, MAX_SLOTS};
pub use error::{DriverError, Result, WifiError};
pub use persistence::{KeyValueStore, MemoryStore};
pub use wifi::{
    AuthMode, ConnectionManager, ConnectionPhase, CredentialSlot, CredentialStore, IpInfo,
    NetworkDriver, Phase2Method, SimulatedDriver,
};
