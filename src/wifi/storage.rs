//! Slot-indexed credential storage.
//!
//! Credentials live in numbered slots on top of a flat [`KeyValueStore`].
//! Slots are kept dense: if slot `i` exists, so do all slots below it.
//! Erasing a slot shifts every higher slot down by one.

use super::config::{AuthMode, CredentialSlot, FieldBuf, Phase2Method};
use crate::config::MAX_SLOTS;
use crate::error::{Result, WifiError};
use crate::persistence::{slot_key, KeyValueStore, SlotField};
use log::{debug, info, warn};
use zeroize::Zeroize;

/// Dense array of [`CredentialSlot`]s persisted in a key-value store.
#[derive(Debug)]
pub struct CredentialStore<S> {
    kv: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    /// Wrap a key-value store.
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    /// Access the underlying store.
    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Mutable access to the underlying store.
    ///
    /// Writes made through it bypass the density checks.
    pub fn kv_mut(&mut self) -> &mut S {
        &mut self.kv
    }

    /// Load the slot at `index`.
    ///
    /// Fails with `NotFound` if any field is missing and with `BufferTooSmall`
    /// if a stored field exceeds its capacity.
    pub fn get(&self, index: u8) -> Result<CredentialSlot> {
        check_index(index)?;
        self.read_slot(index)
    }

    /// Store `slot` at `index` and commit.
    ///
    /// `index` must be an existing slot or the first empty one. If a field
    /// write fails the store is not committed, but earlier field writes of
    /// this call may already be visible since writes are not atomic.
    pub fn set(&mut self, index: u8, slot: &CredentialSlot) -> Result<()> {
        check_index(index)?;
        slot.validate()?;
        if index > 0 && !self.exists(index - 1)? {
            return Err(WifiError::InvalidArgument("slot index would leave a gap"));
        }

        self.write_slot(index, slot)?;
        self.kv.commit()?;
        info!("Stored network '{}' in slot {}", slot.ssid.to_string_lossy(), index);
        Ok(())
    }

    /// Remove the slot at `index` and shift all higher slots down by one.
    ///
    /// Erasing an empty slot is not an error. Compaction ends at the first
    /// slot that cannot be read; an unreadable slot is treated like the end
    /// of the list, so it and anything above it stay behind a gap.
    pub fn erase(&mut self, index: u8) -> Result<()> {
        check_index(index)?;
        self.remove_slot(index)?;

        let mut move_index = index;
        while let Some(next) = move_index.checked_add(1).filter(|next| *next < MAX_SLOTS) {
            let slot = match self.read_slot(next) {
                Ok(slot) => slot,
                Err(WifiError::NotFound) => break,
                Err(e) => {
                    warn!("Compaction stopped at unreadable slot {}: {}", next, e);
                    break;
                }
            };
            debug!("Moving slot {} to {}", next, move_index);
            self.write_slot(move_index, &slot)?;
            move_index = next;
        }

        if move_index != index {
            self.remove_slot(move_index)?;
        }

        self.kv.commit()?;
        info!(
            "Erased slot {}, shifted {} slot(s) down",
            index,
            move_index - index
        );
        Ok(())
    }

    /// First index without a stored slot, or `None` if every slot is used.
    ///
    /// Scans from index 0 so it stays correct even if density was violated.
    pub fn find_empty_slot(&self) -> Option<u8> {
        (0..MAX_SLOTS).find(|index| matches!(self.read_slot(*index), Err(WifiError::NotFound)))
    }

    fn exists(&self, index: u8) -> Result<bool> {
        match self.read_slot(index) {
            Ok(_) => Ok(true),
            Err(WifiError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_slot(&self, index: u8) -> Result<CredentialSlot> {
        // SSID first: its absence is what marks a slot as missing.
        let ssid = self.read_field(index, SlotField::Ssid)?;
        let password = self.read_field(index, SlotField::Password)?;
        let identity = self.read_field(index, SlotField::Identity)?;
        let username = self.read_field(index, SlotField::Username)?;
        let auth_mode = self.kv.get_u32(&slot_key(index, SlotField::AuthMode))?;
        let phase2 = self.kv.get_u32(&slot_key(index, SlotField::Phase2))?;

        Ok(CredentialSlot {
            ssid,
            password,
            identity,
            username,
            auth_mode: AuthMode::from_raw(auth_mode),
            phase2: Phase2Method::from_raw(phase2),
        })
    }

    fn read_field<const N: usize>(&self, index: u8, field: SlotField) -> Result<FieldBuf<N>> {
        let mut buf = [0u8; N];
        let result = self
            .kv
            .get_bytes(&slot_key(index, field), &mut buf)
            .and_then(|len| FieldBuf::new(&buf[..len]));
        buf.zeroize();
        result
    }

    fn write_slot(&mut self, index: u8, slot: &CredentialSlot) -> Result<()> {
        self.kv
            .set_bytes(&slot_key(index, SlotField::Ssid), slot.ssid.as_bytes())?;
        self.kv
            .set_bytes(&slot_key(index, SlotField::Password), slot.password.as_bytes())?;
        self.kv
            .set_bytes(&slot_key(index, SlotField::Identity), slot.identity.as_bytes())?;
        self.kv
            .set_bytes(&slot_key(index, SlotField::Username), slot.username.as_bytes())?;
        self.kv
            .set_u32(&slot_key(index, SlotField::AuthMode), slot.auth_mode.to_raw())?;
        self.kv
            .set_u32(&slot_key(index, SlotField::Phase2), slot.phase2.to_raw())?;
        Ok(())
    }

    fn remove_slot(&mut self, index: u8) -> Result<()> {
        for field in SlotField::ALL {
            self.kv.erase_key(&slot_key(index, field))?;
        }
        Ok(())
    }
}

fn check_index(index: u8) -> Result<()> {
    if index >= MAX_SLOTS {
        return Err(WifiError::InvalidArgument("slot index out of range"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn network(n: u8) -> CredentialSlot {
        CredentialSlot::personal(&format!("net-{}", n), &format!("password-{}", n), AuthMode::Wpa2Psk)
            .unwrap()
    }

    fn store_with(count: u8) -> CredentialStore<MemoryStore> {
        let mut store = CredentialStore::new(MemoryStore::new());
        for i in 0..count {
            store.set(i, &network(i)).unwrap();
        }
        store
    }

    fn assert_dense(store: &CredentialStore<MemoryStore>) {
        let mut seen_gap = false;
        for i in 0..MAX_SLOTS {
            match store.get(i) {
                Ok(_) => assert!(!seen_gap, "slot {} exists after a gap", i),
                Err(WifiError::NotFound) => seen_gap = true,
                Err(e) => panic!("unexpected error at slot {}: {}", i, e),
            }
        }
    }

    // ==================== get / set ====================

    #[test]
    fn test_set_get_roundtrip() {
        let mut store = CredentialStore::new(MemoryStore::new());
        let slot = CredentialSlot::enterprise(
            "eduroam",
            "anonymous@example.org",
            "alice",
            "hunter2",
            AuthMode::Wpa2Wpa3Enterprise,
            Phase2Method::Pap,
        )
        .unwrap();
        store.set(0, &slot).unwrap();
        assert_eq!(store.get(0).unwrap(), slot);
    }

    #[test]
    fn test_roundtrip_full_length_fields() {
        let mut store = CredentialStore::new(MemoryStore::new());
        let slot = CredentialSlot {
            ssid: FieldBuf::new(&[0xAB; 32]).unwrap(),
            password: FieldBuf::new(&[b'p'; 64]).unwrap(),
            identity: FieldBuf::new(&[b'i'; 128]).unwrap(),
            username: FieldBuf::new(&[0x00, b'u', 0x00]).unwrap(),
            auth_mode: AuthMode::Other(99),
            phase2: Phase2Method::Chap,
        };
        store.set(0, &slot).unwrap();
        let loaded = store.get(0).unwrap();
        assert_eq!(loaded, slot);
        assert_eq!(loaded.username.len(), 3);
    }

    #[test]
    fn test_get_missing_slot() {
        let store = CredentialStore::new(MemoryStore::new());
        assert_eq!(store.get(0), Err(WifiError::NotFound));
    }

    #[test]
    fn test_partial_record_not_found() {
        let mut store = store_with(1);
        store
            .kv_mut()
            .erase_key(&slot_key(0, SlotField::Phase2))
            .unwrap();
        assert_eq!(store.get(0), Err(WifiError::NotFound));
    }

    #[test]
    fn test_oversized_field_buffer_too_small() {
        let mut store = store_with(1);
        store
            .kv_mut()
            .set_bytes(&slot_key(0, SlotField::Ssid), &[b'x'; 40])
            .unwrap();
        assert!(matches!(
            store.get(0),
            Err(WifiError::BufferTooSmall { len: 40, capacity: 32, .. })
        ));
    }

    #[test]
    fn test_set_failure_skips_commit() {
        let mut kv = MemoryStore::new();
        kv.fail_writes_to(slot_key(0, SlotField::Username));
        let mut store = CredentialStore::new(kv);

        let result = store.set(0, &network(0));
        assert!(matches!(result, Err(WifiError::Storage(_))));
        assert_eq!(store.kv().commit_count(), 0);
        assert!(!store.kv().is_committed(&slot_key(0, SlotField::Ssid)));
    }

    #[test]
    fn test_set_commit_failure() {
        let mut kv = MemoryStore::new();
        kv.set_fail_commit(true);
        let mut store = CredentialStore::new(kv);
        assert!(matches!(
            store.set(0, &network(0)),
            Err(WifiError::StorageCommitFailed(_))
        ));
    }

    #[test]
    fn test_set_overwrites_existing() {
        let mut store = store_with(2);
        store.set(1, &network(9)).unwrap();
        assert_eq!(store.get(1).unwrap(), network(9));
    }

    #[test]
    fn test_set_refuses_gap() {
        let mut store = store_with(1);
        assert!(matches!(
            store.set(2, &network(2)),
            Err(WifiError::InvalidArgument(_))
        ));
        assert_eq!(store.get(2), Err(WifiError::NotFound));
    }

    #[test]
    fn test_set_rejects_invalid_slot() {
        let mut store = CredentialStore::new(MemoryStore::new());
        assert!(matches!(
            store.set(0, &CredentialSlot::default()),
            Err(WifiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut store = CredentialStore::new(MemoryStore::new());
        assert!(matches!(store.get(255), Err(WifiError::InvalidArgument(_))));
        assert!(matches!(store.erase(255), Err(WifiError::InvalidArgument(_))));
        assert!(matches!(
            store.set(255, &network(0)),
            Err(WifiError::InvalidArgument(_))
        ));
    }

    // ==================== erase / compaction ====================

    #[test]
    fn test_erase_compacts_higher_slots() {
        let mut store = store_with(5);
        store.erase(2).unwrap();

        assert_eq!(store.get(0).unwrap(), network(0));
        assert_eq!(store.get(1).unwrap(), network(1));
        assert_eq!(store.get(2).unwrap(), network(3));
        assert_eq!(store.get(3).unwrap(), network(4));
        assert_eq!(store.get(4), Err(WifiError::NotFound));
    }

    #[test]
    fn test_erase_last_slot() {
        let mut store = store_with(3);
        store.erase(2).unwrap();
        assert_eq!(store.get(1).unwrap(), network(1));
        assert_eq!(store.get(2), Err(WifiError::NotFound));
    }

    #[test]
    fn test_erase_first_slot() {
        let mut store = store_with(3);
        store.erase(0).unwrap();
        assert_eq!(store.get(0).unwrap(), network(1));
        assert_eq!(store.get(1).unwrap(), network(2));
        assert_eq!(store.get(2), Err(WifiError::NotFound));
    }

    #[test]
    fn test_erase_removes_all_keys() {
        let mut store = store_with(1);
        store.erase(0).unwrap();
        assert!(store.kv().is_empty());
    }

    #[test]
    fn test_erase_empty_slot_ok() {
        let mut store = store_with(2);
        store.erase(5).unwrap();
        assert_eq!(store.find_empty_slot(), Some(2));
    }

    #[test]
    fn test_erase_commits_once() {
        let mut store = store_with(4);
        let before = store.kv().commit_count();
        store.erase(1).unwrap();
        assert_eq!(store.kv().commit_count(), before + 1);
        assert!(!store.kv().is_committed(&slot_key(3, SlotField::Ssid)));
    }

    #[test]
    fn test_erase_stops_at_unreadable_slot() {
        let mut store = store_with(4);
        store
            .kv_mut()
            .set_bytes(&slot_key(2, SlotField::Ssid), &[b'x'; 40])
            .unwrap();
        let before = store.kv().commit_count();

        store.erase(0).unwrap();
        assert_eq!(store.kv().commit_count(), before + 1);
        assert_eq!(store.get(0).unwrap(), network(1));
        assert_eq!(store.get(1), Err(WifiError::NotFound));
        assert!(matches!(store.get(2), Err(WifiError::BufferTooSmall { .. })));
        assert_eq!(store.get(3).unwrap(), network(3));
    }

    #[test]
    fn test_erase_fills_existing_gap() {
        let mut store = store_with(1);
        let stray = network(7);
        for (field, value) in [
            (SlotField::Ssid, stray.ssid.as_bytes()),
            (SlotField::Password, stray.password.as_bytes()),
            (SlotField::Identity, stray.identity.as_bytes()),
            (SlotField::Username, stray.username.as_bytes()),
        ] {
            store.kv_mut().set_bytes(&slot_key(2, field), value).unwrap();
        }
        store
            .kv_mut()
            .set_u32(&slot_key(2, SlotField::AuthMode), stray.auth_mode.to_raw())
            .unwrap();
        store
            .kv_mut()
            .set_u32(&slot_key(2, SlotField::Phase2), 0)
            .unwrap();

        store.erase(1).unwrap();
        assert_eq!(store.get(1).unwrap(), stray);
        assert_eq!(store.get(2), Err(WifiError::NotFound));
    }

    #[test]
    fn test_density_after_mixed_operations() {
        let mut store = store_with(6);
        store.erase(3).unwrap();
        store.erase(0).unwrap();
        let next = store.find_empty_slot().unwrap();
        store.set(next, &network(20)).unwrap();
        store.erase(next - 1).unwrap();
        store.erase(0).unwrap();
        assert_dense(&store);
        assert_eq!(store.find_empty_slot(), Some(3));
        assert_eq!(store.get(2).unwrap(), network(20));
    }

    // ==================== find_empty_slot ====================

    #[test]
    fn test_find_empty_slot_on_empty_store() {
        let store = CredentialStore::new(MemoryStore::new());
        assert_eq!(store.find_empty_slot(), Some(0));
    }

    #[test]
    fn test_find_empty_slot_counts_slots() {
        let store = store_with(3);
        assert_eq!(store.find_empty_slot(), Some(3));
    }

    #[test]
    fn test_find_empty_slot_full_store() {
        let store = store_with(MAX_SLOTS);
        assert_eq!(store.find_empty_slot(), None);
        assert!(store.get(MAX_SLOTS - 1).is_ok());
    }
}
