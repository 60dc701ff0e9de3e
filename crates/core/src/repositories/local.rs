//! File-backed local cache of a profile's charge items.
//!
//! ## Storage Layout
//!
//! ```text
//! charge_items/
//!   <s1>/
//!     <s2>/
//!       <profile uuid>/
//!         charge_items.yaml
//! ```
//!
//! where `s1` and `s2` are the first four hex characters of the profile UUID. The file holds a
//! YAML sequence of [`SparseChargeItem`]s; billing payloads are base64 encoded. A missing file is
//! an empty cache.
//!
//! The store performs plain read-modify-write cycles. Callers that may write concurrently for the
//! same profile serialise access themselves.

use crate::charge_item::{sort_newest_first, SparseChargeItem};
use crate::config::CoreConfig;
use crate::constants::CHARGE_ITEMS_FILENAME;
use crate::error::{LocalStoreError, LocalStoreResult};
use crate::profile::ProfileId;
use chrono::{DateTime, FixedOffset};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct LocalChargeItemStore {
    cfg: Arc<CoreConfig>,
    profile_id: ProfileId,
}

impl LocalChargeItemStore {
    pub fn new(cfg: Arc<CoreConfig>, profile_id: ProfileId) -> Self {
        Self { cfg, profile_id }
    }

    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }

    /// Path of the profile's cache file. The file may not exist yet.
    pub fn file_path(&self) -> PathBuf {
        self.profile_id
            .sharded_dir(&self.cfg.charge_items_dir())
            .join(CHARGE_ITEMS_FILENAME)
    }

    /// All cached items, newest `entered_date` first.
    pub fn list_all(&self) -> LocalStoreResult<Vec<SparseChargeItem>> {
        let mut items = self.read()?;
        sort_newest_first(&mut items);
        Ok(items)
    }

    /// The newest `entered_date` in the cache, the lower bound of the next incremental sync.
    pub fn latest_entered_date(&self) -> LocalStoreResult<Option<DateTime<FixedOffset>>> {
        Ok(self.read()?.iter().map(|item| item.entered_date).max())
    }

    /// Upserts `items` by identifier and returns how many were written.
    ///
    /// A cached item keeps its `is_read` flag when the incoming copy is unread.
    pub fn save(&self, items: &[SparseChargeItem]) -> LocalStoreResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut cached = self.read()?;
        for incoming in items {
            match cached
                .iter_mut()
                .find(|item| item.identifier == incoming.identifier)
            {
                Some(existing) => {
                    let was_read = existing.is_read;
                    *existing = incoming.clone();
                    existing.is_read |= was_read;
                }
                None => cached.push(incoming.clone()),
            }
        }

        self.write(&cached)?;
        Ok(items.len())
    }

    /// Removes the items with the given identifiers. True if anything was removed.
    pub fn delete(&self, identifiers: &[&str]) -> LocalStoreResult<bool> {
        let mut cached = self.read()?;
        let before = cached.len();
        cached.retain(|item| !identifiers.contains(&item.identifier.as_str()));

        if cached.len() == before {
            return Ok(false);
        }

        self.write(&cached)?;
        Ok(true)
    }

    /// Removes the whole cache. True if a cache file existed.
    pub fn clear(&self) -> LocalStoreResult<bool> {
        match fs::remove_file(self.file_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LocalStoreError::FileWrite(e.to_string())),
        }
    }

    fn read(&self) -> LocalStoreResult<Vec<SparseChargeItem>> {
        let path = self.file_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LocalStoreError::FileRead(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_yaml::from_str(&contents).map_err(|e| {
            LocalStoreError::Deserialization(format!("{}: {e}", path.display()))
        })
    }

    fn write(&self, items: &[SparseChargeItem]) -> LocalStoreResult<()> {
        let path = self.file_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LocalStoreError::DirCreation(e.to_string()))?;
        }

        let yaml = serde_yaml::to_string(items)
            .map_err(|e| LocalStoreError::Serialization(e.to_string()))?;

        // Write-then-rename so a crash never leaves a truncated cache behind.
        let staging = path.with_extension("yaml.tmp");
        fs::write(&staging, yaml).map_err(|e| LocalStoreError::FileWrite(e.to_string()))?;
        fs::rename(&staging, &path).map_err(|e| LocalStoreError::FileWrite(e.to_string()))
    }
}
