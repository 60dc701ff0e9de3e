//! Workflow outcomes.
//!
//! Every workflow returns one of these closed enums. `NotAuthenticated`, `ConsentNotGranted`
//! and `Conflict` are first-class outcomes a caller branches on exactly like success; only the
//! `Error` variants carry failures, each wrapping the collaborator cause it was mapped from.

use crate::charge_item::SparseChargeItem;
use crate::error::{AuthError, LocalStoreError, RecoveryHint, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success(Vec<SparseChargeItem>),
    NotAuthenticated,
    ConsentNotGranted,
    Error(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("authentication check failed: {0}")]
    Auth(AuthError),
    #[error("repository failed: {0}")]
    Repository(RepositoryError),
    #[error("profile store failed: {0}")]
    LocalStore(LocalStoreError),
    /// The profile has no insurance number, so no consent can exist for it.
    #[error("profile is not associated with an insurance id")]
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticateResult {
    Success,
    /// Authentication is possible but needs an interactive step the caller must drive.
    FurtherAuthenticationRequired,
    Error(AuthenticateError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticateError {
    #[error("authentication failed: {0}")]
    Auth(AuthError),
}

/// Outcome of checking for a charge-item consent without loading any records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentCheckResult {
    Granted,
    NotGranted,
    NotAuthenticated,
    Error(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantResult {
    Success,
    /// A consent with the same identifier already exists. Not a failure.
    Conflict,
    NotAuthenticated,
    Error(GrantError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrantError {
    /// The registry answered without the granted consent, or with a different one.
    #[error("registry returned no matching consent for the grant")]
    UnexpectedGrantConsentResponse,
    #[error("consent registry failed: {0}")]
    Repository(RepositoryError),
    #[error("profile is not associated with an insurance id")]
    Unexpected,
    #[error("authentication check failed: {0}")]
    Auth(AuthError),
    #[error("profile store failed: {0}")]
    LocalStore(LocalStoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeResult {
    /// `true` if a consent was revoked, `false` if there was nothing to revoke.
    Success(bool),
    Error(RevokeError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevokeError {
    #[error("registry did not confirm the revocation")]
    UnexpectedRevokeConsentResponse,
    #[error("repository failed: {0}")]
    Repository(RepositoryError),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("authentication check failed: {0}")]
    Auth(AuthError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    Success,
    NotAuthenticated,
    Error(DeleteError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeleteError {
    /// The repository refused the deletion (`None`) or failed with the wrapped cause.
    #[error("charge item could not be deleted{}", cause_suffix(.0))]
    Unexpected(Option<RepositoryError>),
    #[error("authentication check failed: {0}")]
    Auth(AuthError),
}

fn cause_suffix(cause: &Option<RepositoryError>) -> String {
    cause
        .as_ref()
        .map(|cause| format!(": {cause}"))
        .unwrap_or_default()
}

impl GrantError {
    pub fn recovery_hint(&self) -> Option<RecoveryHint> {
        match self {
            GrantError::Repository(cause) => cause.recovery_hint(),
            _ => None,
        }
    }
}

impl RevokeError {
    pub fn recovery_hint(&self) -> Option<RecoveryHint> {
        match self {
            RevokeError::Repository(cause) => cause.recovery_hint(),
            RevokeError::NotAuthenticated => Some(RecoveryHint::Reauthenticate),
            _ => None,
        }
    }
}

impl FetchError {
    pub fn recovery_hint(&self) -> Option<RecoveryHint> {
        match self {
            FetchError::Repository(cause) => cause.recovery_hint(),
            _ => None,
        }
    }
}
