//! In-memory key-value store for host builds and tests.
//!
//! Mirrors NVS handle semantics: writes are visible to reads immediately but
//! only reach the committed map on [`KeyValueStore::commit`].

use super::KeyValueStore;
use crate::error::{Result, WifiError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Bytes(Vec<u8>),
    U32(u32),
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: BTreeMap<String, Value>,
    /// Uncommitted writes; `None` marks an erased key.
    pending: BTreeMap<String, Option<Value>>,
    commits: usize,
    failing_key: Option<String>,
    fail_commit: bool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `key` fail.
    pub fn fail_writes_to(&mut self, key: impl Into<String>) {
        self.failing_key = Some(key.into());
    }

    /// Make [`commit`](KeyValueStore::commit) fail while `fail` is set.
    pub fn set_fail_commit(&mut self, fail: bool) {
        self.fail_commit = fail;
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Whether `key` is present in the committed state.
    pub fn is_committed(&self, key: &str) -> bool {
        self.committed.contains_key(key)
    }

    /// Whether `key` is currently readable.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Number of readable keys.
    pub fn len(&self) -> usize {
        let committed_live = self
            .committed
            .keys()
            .filter(|key| !self.pending.contains_key(*key))
            .count();
        let pending_live = self.pending.values().filter(|v| v.is_some()).count();
        committed_live + pending_live
    }

    /// Whether no key is readable.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        match self.pending.get(key) {
            Some(pending) => pending.as_ref(),
            None => self.committed.get(key),
        }
    }

    fn write(&mut self, key: &str, value: Option<Value>) -> Result<()> {
        if self.failing_key.as_deref() == Some(key) {
            return Err(WifiError::Storage(format!("write to '{}' failed", key)));
        }
        self.pending.insert(key.to_string(), value);
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get_bytes(&self, key: &str, buf: &mut [u8]) -> Result<usize> {
        match self.lookup(key) {
            Some(Value::Bytes(bytes)) => {
                if bytes.len() > buf.len() {
                    return Err(WifiError::BufferTooSmall {
                        key: key.to_string(),
                        len: bytes.len(),
                        capacity: buf.len(),
                    });
                }
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            Some(Value::U32(_)) => Err(WifiError::Storage(format!("'{}' is not a string", key))),
            None => Err(WifiError::NotFound),
        }
    }

    fn set_bytes(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.write(key, Some(Value::Bytes(value.to_vec())))
    }

    fn get_u32(&self, key: &str) -> Result<u32> {
        match self.lookup(key) {
            Some(Value::U32(value)) => Ok(*value),
            Some(Value::Bytes(_)) => Err(WifiError::Storage(format!("'{}' is not a u32", key))),
            None => Err(WifiError::NotFound),
        }
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<()> {
        self.write(key, Some(Value::U32(value)))
    }

    fn erase_key(&mut self, key: &str) -> Result<()> {
        self.write(key, None)
    }

    fn commit(&mut self) -> Result<()> {
        if self.fail_commit {
            return Err(WifiError::StorageCommitFailed("injected failure".to_string()));
        }
        for (key, value) in std::mem::take(&mut self.pending) {
            match value {
                Some(value) => {
                    self.committed.insert(key, value);
                }
                None => {
                    self.committed.remove(&key);
                }
            }
        }
        self.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_not_found() {
        let store = MemoryStore::new();
        let mut buf = [0u8; 8];
        assert_eq!(store.get_bytes("nope", &mut buf), Err(WifiError::NotFound));
        assert_eq!(store.get_u32("nope"), Err(WifiError::NotFound));
    }

    #[test]
    fn test_writes_visible_before_commit() {
        let mut store = MemoryStore::new();
        store.set_bytes("k", b"value").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(store.get_bytes("k", &mut buf), Ok(5));
        assert_eq!(&buf[..5], b"value");
        assert!(!store.is_committed("k"));

        store.commit().unwrap();
        assert!(store.is_committed("k"));
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_buffer_too_small() {
        let mut store = MemoryStore::new();
        store.set_bytes("k", b"too long").unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            store.get_bytes("k", &mut buf),
            Err(WifiError::BufferTooSmall { len: 8, capacity: 4, .. })
        ));
    }

    #[test]
    fn test_erase_then_commit() {
        let mut store = MemoryStore::new();
        store.set_u32("n", 7).unwrap();
        store.commit().unwrap();
        store.erase_key("n").unwrap();
        assert!(!store.contains_key("n"));
        assert!(store.is_committed("n"));
        store.commit().unwrap();
        assert!(!store.is_committed("n"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_erase_missing_key_ok() {
        let mut store = MemoryStore::new();
        assert!(store.erase_key("ghost").is_ok());
    }

    #[test]
    fn test_injected_failures() {
        let mut store = MemoryStore::new();
        store.fail_writes_to("bad");
        assert!(matches!(store.set_u32("bad", 1), Err(WifiError::Storage(_))));
        assert!(store.set_u32("good", 1).is_ok());

        store.set_fail_commit(true);
        assert!(matches!(store.commit(), Err(WifiError::StorageCommitFailed(_))));
        assert_eq!(store.commit_count(), 0);
        assert!(!store.is_committed("good"));
    }

    #[test]
    fn test_type_mismatch() {
        let mut store = MemoryStore::new();
        store.set_u32("n", 1).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(store.get_bytes("n", &mut buf), Err(WifiError::Storage(_))));
    }
}
