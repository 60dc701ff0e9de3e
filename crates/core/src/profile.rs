//! Profiles: the insured person a session acts for.

use crate::{InsuranceId, NonEmptyText, ShardableUuid};
use serde::{Deserialize, Serialize};

/// Identifier of a profile. Canonical UUID, also used to shard the profile's local cache.
pub type ProfileId = ShardableUuid;

/// A user profile as held by the profile store.
///
/// Immutable for the duration of an orchestration call. A profile without an insurance number
/// cannot hold a charge-item consent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_id: Option<InsuranceId>,
}

impl Profile {
    pub fn new(id: ProfileId, insurance_id: Option<InsuranceId>) -> Self {
        Self {
            id,
            name: None,
            insurance_id,
        }
    }

    pub fn with_name(mut self, name: NonEmptyText) -> Self {
        self.name = Some(name);
        self
    }
}
