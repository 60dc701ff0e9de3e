//! Charge-item storage.
//!
//! [`local`] is the on-disk cache of one profile's charge items; [`syncing`] combines it with a
//! remote source into a [`ChargeItemRepository`](crate::session::ChargeItemRepository).

pub mod local;
pub mod syncing;
