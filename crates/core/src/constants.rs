//! Constants used throughout the core crate.
//!
//! Path names and wire tokens live here so the consent identifier scheme and the on-disk cache
//! layout are defined in exactly one place.

/// Directory name for the local charge-item cache, below the configured data directory.
pub const CHARGE_ITEMS_DIR_NAME: &str = "charge_items";

/// Default data directory when no explicit directory is configured.
pub const DEFAULT_CHARGE_ITEM_DATA_DIR: &str = "charge_item_data";

/// Filename of a profile's cached charge items.
pub const CHARGE_ITEMS_FILENAME: &str = "charge_items.yaml";

/// Category token for the charge-item consent. Part of the consent identifier.
pub const CHARGE_ITEMS_CONSENT_CATEGORY: &str = "chargcons";

/// Scope token of every charge-item consent.
pub const PATIENT_PRIVACY_SCOPE: &str = "patient-privacy";

/// Policy rule token of every charge-item consent.
pub const OPT_IN_POLICY_RULE: &str = "opt-in";

/// Date-only format of consent timestamps.
pub const CONSENT_DATE_FORMAT: &str = "%Y-%m-%d";
