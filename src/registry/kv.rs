//! Key construction and low-level `sled` access for the alias registry.
//!
//! An alias is `{group}-{hostPrefix}-{NN}` (spec §3), and every slot record
//! lives under the byte key `"ag-" + alias`. Keys are 1-indexed and
//! zero-padded to two digits, matching the Go original
//! (`autoscaling/autoscaling.go`'s `"ag-" + hostPrefix + "-"` prefix), so
//! lexicographic scan order matches slot-number order for the first hundred
//! slots — the common case for scaling groups.

use crate::error::{Error, Result};
use crate::registry::model::InstanceData;
use std::path::Path;

pub const KEY_PREFIX: &str = "ag-";

/// The alias string for a given group/host-prefix/1-indexed slot number.
pub fn alias(group: &str, host_prefix: &str, slot: u32) -> String {
    format!("{group}-{host_prefix}-{slot:02}")
}

/// Full storage key (`"ag-" + alias`) for a given slot.
pub fn slot_key(group: &str, host_prefix: &str, slot: u32) -> String {
    format!("{KEY_PREFIX}{}", alias(group, host_prefix, slot))
}

/// Storage key for a bare alias string (used by `ResolveAlias`).
pub fn key_for_alias(alias: &str) -> String {
    format!("{KEY_PREFIX}{alias}")
}

/// Prefix under which every slot for a given group/host-prefix lives.
pub fn group_scan_prefix(group: &str, host_prefix: &str) -> String {
    format!("{KEY_PREFIX}{group}-{host_prefix}-")
}

/// Prefix under which every slot for a group lives, regardless of prefix.
pub fn group_only_prefix(group: &str) -> String {
    format!("{KEY_PREFIX}{group}-")
}

/// Extract the slot number from a key produced by [`slot_key`].
pub fn slot_number(key: &str, group: &str, host_prefix: &str) -> Option<u32> {
    key.strip_prefix(&group_scan_prefix(group, host_prefix))?.parse().ok()
}

/// Thin wrapper around a `sled::Db` opened at the configured store path.
///
/// Holds no other state: `sled::Db` is internally `Arc`-backed and cheap to
/// clone, so `AliasRegistry` keeps one of these per process.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[cfg(test)]
    pub fn open_temp() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = sled::open(dir.path()).expect("open sled");
        (Self { db }, dir)
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Fetch and decode a slot's value, if present.
    pub fn get(&self, key: &str) -> Result<Option<InstanceData>> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(InstanceData::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All `(key, InstanceData)` pairs under a group/host-prefix scan, in
    /// key order (so in slot-number order: invariant 1 in spec §3 relies on
    /// this).
    pub fn scan_group(&self, group: &str, host_prefix: &str) -> Result<Vec<(String, InstanceData)>> {
        let prefix = group_scan_prefix(group, host_prefix);
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (k, v) = item?;
            let key = String::from_utf8(k.to_vec())
                .map_err(|e| Error::StorageError(format!("invalid utf8 key: {e}")))?;
            let data = InstanceData::decode(&v)?;
            out.push((key, data));
        }
        Ok(out)
    }

    /// Full `"ag-"` scan, used by `Deregister` to find the slot holding a
    /// given instance id regardless of which group it belongs to.
    pub fn scan_all(&self) -> Result<Vec<(String, InstanceData)>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(KEY_PREFIX.as_bytes()) {
            let (k, v) = item?;
            let key = String::from_utf8(k.to_vec())
                .map_err(|e| Error::StorageError(format!("invalid utf8 key: {e}")))?;
            let data = InstanceData::decode(&v)?;
            out.push((key, data));
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
