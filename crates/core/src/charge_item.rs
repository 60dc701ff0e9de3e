//! Charge items: billing records tied to dispensed prescriptions.
//!
//! Two shapes exist. [`SparseChargeItem`] is the listing projection the workflows move around;
//! [`ChargeItem`] is the detail projection, which adds decoded billing details when they are
//! known. The billing payload itself is opaque to this crate.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque billing payload as delivered by the backend.
///
/// Serialised as standard base64 so it survives text formats (YAML cache files, JSON APIs).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BillingPayload(Vec<u8>);

impl BillingPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for BillingPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for BillingPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(BillingPayload)
            .map_err(serde::de::Error::custom)
    }
}

/// Listing projection of a charge item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseChargeItem {
    pub identifier: String,
    /// The prescription task this charge item bills for, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub payload: BillingPayload,
    pub entered_date: DateTime<FixedOffset>,
    #[serde(default)]
    pub is_read: bool,
}

/// Decoded billing details of a charge item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeItemDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_gross_price_cents: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Detail projection of a charge item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeItem {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub payload: BillingPayload,
    pub entered_date: DateTime<FixedOffset>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ChargeItemDetails>,
}

impl ChargeItem {
    /// Projects to the listing form, dropping details.
    pub fn sparse(&self) -> SparseChargeItem {
        SparseChargeItem {
            identifier: self.identifier.clone(),
            task_id: self.task_id.clone(),
            payload: self.payload.clone(),
            entered_date: self.entered_date,
            is_read: self.is_read,
        }
    }
}

impl From<SparseChargeItem> for ChargeItem {
    fn from(item: SparseChargeItem) -> Self {
        Self {
            identifier: item.identifier,
            task_id: item.task_id,
            payload: item.payload,
            entered_date: item.entered_date,
            is_read: item.is_read,
            details: None,
        }
    }
}

/// Orders items newest `entered_date` first; ties break on identifier for a stable listing.
pub fn sort_newest_first(items: &mut [SparseChargeItem]) {
    items.sort_by(|a, b| {
        b.entered_date
            .cmp(&a.entered_date)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
}
