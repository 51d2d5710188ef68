//! NVS-backed key-value store.
//!
//! Stores credential slot fields in ESP32's Non-Volatile Storage so they
//! persist across reboots. Writes go through the raw NVS handle so nothing is
//! committed until [`KeyValueStore::commit`] is called.
//!
//! # Security
//!
//! Development builds do not encrypt NVS. Enable NVS encryption in the
//! partition table for production devices.

use super::KeyValueStore;
use crate::config::NVS_NAMESPACE;
use crate::error::{Result, WifiError};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_sys::{self as sys, esp, EspError};
use std::ffi::{c_void, CString};
use std::ptr;

/// [`KeyValueStore`] over one NVS namespace of the default partition.
pub struct NvsStore {
    /// Keeps the partition initialized while the handle is open.
    _partition: EspDefaultNvsPartition,
    handle: sys::nvs_handle_t,
}

impl NvsStore {
    /// Open `namespace` read-write on an already taken default partition.
    pub fn open(partition: EspDefaultNvsPartition, namespace: &str) -> Result<Self> {
        let namespace = c_string(namespace)?;
        let mut handle: sys::nvs_handle_t = 0;
        esp!(unsafe {
            sys::nvs_open(
                namespace.as_ptr(),
                sys::nvs_open_mode_t_NVS_READWRITE,
                &mut handle,
            )
        })
        .map_err(storage_error)?;

        Ok(Self {
            _partition: partition,
            handle,
        })
    }

    /// Take the default partition and open the credential namespace.
    ///
    /// Must be called only once; the partition can be taken a single time.
    pub fn take_default() -> Result<Self> {
        let partition = EspDefaultNvsPartition::take().map_err(storage_error)?;
        Self::open(partition, NVS_NAMESPACE)
    }
}

impl Drop for NvsStore {
    fn drop(&mut self) {
        unsafe { sys::nvs_close(self.handle) };
    }
}

impl KeyValueStore for NvsStore {
    fn get_bytes(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        let c_key = c_string(key)?;
        let mut size: usize = 0;
        esp!(unsafe { sys::nvs_get_blob(self.handle, c_key.as_ptr(), ptr::null_mut(), &mut size) })
            .map_err(storage_error)?;

        if size > buf.len() {
            return Err(WifiError::BufferTooSmall {
                key: key.to_string(),
                len: size,
                capacity: buf.len(),
            });
        }

        esp!(unsafe {
            sys::nvs_get_blob(
                self.handle,
                c_key.as_ptr(),
                buf.as_mut_ptr() as *mut c_void,
                &mut size,
            )
        })
        .map_err(storage_error)?;
        Ok(size)
    }

    fn set_bytes(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let c_key = c_string(key)?;
        esp!(unsafe {
            sys::nvs_set_blob(
                self.handle,
                c_key.as_ptr(),
                value.as_ptr() as *const c_void,
                value.len(),
            )
        })
        .map_err(storage_error)
    }

    fn get_u32(&self, key: &str) -> Result<u32> {
        let c_key = c_string(key)?;
        let mut value: u32 = 0;
        esp!(unsafe { sys::nvs_get_u32(self.handle, c_key.as_ptr(), &mut value) })
            .map_err(storage_error)?;
        Ok(value)
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<()> {
        let c_key = c_string(key)?;
        esp!(unsafe { sys::nvs_set_u32(self.handle, c_key.as_ptr(), value) }).map_err(storage_error)
    }

    fn erase_key(&mut self, key: &str) -> Result<()> {
        let c_key = c_string(key)?;
        match esp!(unsafe { sys::nvs_erase_key(self.handle, c_key.as_ptr()) }).map_err(storage_error)
        {
            Err(WifiError::NotFound) => Ok(()),
            other => other,
        }
    }

    fn commit(&mut self) -> Result<()> {
        esp!(unsafe { sys::nvs_commit(self.handle) }).map_err(|e| {
            log::error!("NVS commit failed: {:?}", e);
            WifiError::StorageCommitFailed(format!("{:?}", e))
        })
    }
}

fn c_string(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| WifiError::InvalidArgument("key contains NUL"))
}

fn storage_error(e: EspError) -> WifiError {
    if e.code() == sys::ESP_ERR_NVS_NOT_FOUND as sys::esp_err_t {
        WifiError::NotFound
    } else {
        WifiError::Storage(format!("{:?}", e))
    }
}
