//! Patient consent objects and the deterministic consent identifier scheme.
//!
//! A consent identifier is `"{category}-{insuranceId}"`: the category token followed by a
//! hyphen and the insurance number verbatim. The registry enforces at most one live consent
//! per identifier, which is what makes a repeated grant surface as a conflict.

use crate::constants::{
    CHARGE_ITEMS_CONSENT_CATEGORY, CONSENT_DATE_FORMAT, OPT_IN_POLICY_RULE, PATIENT_PRIVACY_SCOPE,
};
use crate::InsuranceId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Consent category. Fixed enumerant; only the charge-item consent exists today.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsentCategory {
    #[serde(rename = "chargcons")]
    ChargeItems,
}

impl ConsentCategory {
    /// Wire token, as used in consent identifiers.
    pub fn as_str(self) -> &'static str {
        match self {
            ConsentCategory::ChargeItems => CHARGE_ITEMS_CONSENT_CATEGORY,
        }
    }
}

impl std::fmt::Display for ConsentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsentScope {
    #[serde(rename = "patient-privacy")]
    PatientPrivacy,
}

impl ConsentScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsentScope::PatientPrivacy => PATIENT_PRIVACY_SCOPE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyRule {
    #[serde(rename = "opt-in")]
    OptIn,
}

impl PolicyRule {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyRule::OptIn => OPT_IN_POLICY_RULE,
        }
    }
}

/// A patient-level consent as exchanged with the consent registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub identifier: String,
    pub insurance_id: InsuranceId,
    /// Issuance date. Serialised date-only (`YYYY-MM-DD`).
    #[serde(with = "consent_date")]
    pub timestamp: NaiveDate,
    pub scope: ConsentScope,
    pub category: ConsentCategory,
    pub policy_rule: PolicyRule,
}

impl Consent {
    /// Builds the deterministic identifier for `category` and `insurance_id`.
    pub fn identifier_for(category: ConsentCategory, insurance_id: &InsuranceId) -> String {
        format!("{}-{}", category.as_str(), insurance_id.as_str())
    }

    /// Builds the charge-item consent a profile grants, issued on `issued_on`.
    pub fn charge_items(insurance_id: InsuranceId, issued_on: NaiveDate) -> Self {
        let category = ConsentCategory::ChargeItems;
        Self {
            identifier: Self::identifier_for(category, &insurance_id),
            insurance_id,
            timestamp: issued_on,
            scope: ConsentScope::PatientPrivacy,
            category,
            policy_rule: PolicyRule::OptIn,
        }
    }
}

mod consent_date {
    use super::CONSENT_DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&date.format(CONSENT_DATE_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, CONSENT_DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}
