//! Profile identifiers and sharded-path utilities.
//!
//! Every profile's local charge-item cache lives under a sharded directory derived from the
//! profile's UUID. To keep that derivation deterministic, identifiers use one *canonical*
//! representation: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`ShardableUuid::parse`].
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, data is stored under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `charge_item_data/charge_items/55/0e/550e8400e29b41d4a716446655440000/`

mod service;

pub use service::{ShardableUuid, Uuid};

/// Error type for UUID operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
