//! Key-value persistence for credential slots.
//!
//! Slots live in a flat, namespaced key space. Each field of slot `i` is stored
//! under its own key, built by [`slot_key`] from a fixed prefix, the index as
//! two hex digits and the field name, e.g. `s0c.password`.
//!
//! # Components
//!
//! - [`KeyValueStore`] - the store contract used by [`CredentialStore`](crate::wifi::CredentialStore)
//! - [`MemoryStore`] - in-memory store for host builds and tests
//! - `NvsStore` - ESP-IDF NVS namespace (ESP32 only)

use crate::error::Result;
use std::fmt;

mod memory;
#[cfg(feature = "esp32")]
mod nvs;

pub use memory::MemoryStore;
#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

/// Namespaced key-value store.
///
/// Writes may become visible to reads before [`commit`](Self::commit), but are
/// only durable after it. Multi-key writes are not atomic.
pub trait KeyValueStore {
    /// Read the bytes stored under `key` into `buf` and return their length.
    ///
    /// Fails with `NotFound` if the key is absent and with `BufferTooSmall`
    /// if the stored value does not fit.
    fn get_bytes(&self, key: &str, buf: &mut [u8]) -> Result<usize>;

    /// Store `value` under `key`.
    fn set_bytes(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Read an integer. Fails with `NotFound` if the key is absent.
    fn get_u32(&self, key: &str) -> Result<u32>;

    /// Store an integer.
    fn set_u32(&mut self, key: &str, value: u32) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    fn erase_key(&mut self, key: &str) -> Result<()>;

    /// Make all previous writes durable.
    fn commit(&mut self) -> Result<()>;
}

/// A field of a stored credential slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotField {
    Ssid,
    Password,
    Identity,
    Username,
    AuthMode,
    Phase2,
}

impl SlotField {
    /// Every field, in storage order.
    pub const ALL: [SlotField; 6] = [
        Self::Ssid,
        Self::Password,
        Self::Identity,
        Self::Username,
        Self::AuthMode,
        Self::Phase2,
    ];

    /// Name used in the persisted key.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ssid => "ssid",
            Self::Password => "password",
            Self::Identity => "identity",
            Self::Username => "username",
            Self::AuthMode => "authmode",
            Self::Phase2 => "phase2",
        }
    }
}

impl fmt::Display for SlotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key for `field` of slot `index`.
///
/// The index is always two hex digits so keys never collide across indices.
pub fn slot_key(index: u8, field: SlotField) -> String {
    format!("s{:02x}.{}", index, field.name())
}
