//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services. The
//! intent is to avoid reading process-wide environment variables during request handling, which
//! leads to inconsistent behaviour in multi-threaded runtimes and test harnesses.

use crate::constants::CHARGE_ITEMS_DIR_NAME;
use crate::error::{LocalStoreError, LocalStoreResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    charge_item_data_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`LocalStoreError::DirCreation`] if `charge_item_data_dir` is empty or exists
    /// but is not a directory.
    pub fn new(charge_item_data_dir: PathBuf) -> LocalStoreResult<Self> {
        if charge_item_data_dir.as_os_str().is_empty() {
            return Err(LocalStoreError::DirCreation(
                "charge item data directory cannot be empty".into(),
            ));
        }
        if charge_item_data_dir.exists() && !charge_item_data_dir.is_dir() {
            return Err(LocalStoreError::DirCreation(format!(
                "charge item data path is not a directory: {}",
                charge_item_data_dir.display()
            )));
        }

        Ok(Self {
            charge_item_data_dir,
        })
    }

    pub fn charge_item_data_dir(&self) -> &Path {
        &self.charge_item_data_dir
    }

    pub fn charge_items_dir(&self) -> PathBuf {
        self.charge_item_data_dir.join(CHARGE_ITEMS_DIR_NAME)
    }
}
