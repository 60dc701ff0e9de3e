//! Pure consent evaluation.
//!
//! Whether a charge-item consent exists is decided by identifier equality only. Payload fields
//! (timestamp, scope, policy rule) never influence the decision: the identifier is the
//! authority on "does a consent already exist".

use crate::consent::{Consent, ConsentCategory};
use crate::InsuranceId;

/// Outcome of evaluating a profile's consents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsentState {
    Granted,
    NotGranted,
}

/// Decides whether a charge-item consent is present. Never performs I/O and never fails.
pub struct ConsentEvaluator;

impl ConsentEvaluator {
    /// Returns [`ConsentState::Granted`] if any consent carries the expected charge-item
    /// identifier for `insurance_id`.
    pub fn evaluate(consents: &[Consent], insurance_id: &InsuranceId) -> ConsentState {
        let expected = Consent::identifier_for(ConsentCategory::ChargeItems, insurance_id);
        if consents.iter().any(|consent| consent.identifier == expected) {
            ConsentState::Granted
        } else {
            ConsentState::NotGranted
        }
    }

    /// Single-consent form of [`ConsentEvaluator::evaluate`], used to validate the registry's
    /// answer to a grant. An absent consent is never accepted.
    pub fn accepts(consent: Option<&Consent>, insurance_id: &InsuranceId) -> bool {
        consent.is_some_and(|consent| {
            consent.identifier == Consent::identifier_for(ConsentCategory::ChargeItems, insurance_id)
        })
    }
}
