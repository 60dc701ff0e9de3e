//! Collaborator error taxonomy.
//!
//! These are the failures the authentication gate, the profile store, the consent registry and
//! the charge-item repository report. Workflow-level errors in [`crate::outcome`] wrap them.
//!
//! All error types carry their causes as rendered strings so they are `Clone + PartialEq`; the
//! workflow outcomes that embed them are compared directly in tests and by callers.

/// Failure of the authentication gate itself (not an "unauthenticated" answer).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authentication transport failed: {0}")]
    Transport(String),
    #[error("authentication timed out")]
    Timeout,
    #[error("no authentication session available: {0}")]
    SessionUnavailable(String),
}

/// Failure of a local (on-device) store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocalStoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("failed to read local store: {0}")]
    FileRead(String),
    #[error("failed to write local store: {0}")]
    FileWrite(String),
    #[error("failed to create local store directory: {0}")]
    DirCreation(String),
    #[error("failed to serialize local store content: {0}")]
    Serialization(String),
    #[error("failed to deserialize local store content: {0}")]
    Deserialization(String),
}

pub type LocalStoreResult<T> = std::result::Result<T, LocalStoreError>;

/// Failure reported by the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote responded with HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("remote reported a conflict with an existing resource")]
    Conflict,
    #[error("remote resource not found")]
    NotFound,
    #[error("remote transport failed: {0}")]
    Transport(String),
    #[error("remote response was inconsistent with the request")]
    InconsistentResponse,
}

/// Failure of the consent registry or the charge-item repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("local store error: {0}")]
    Local(#[from] LocalStoreError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// What a caller may offer the user after a remote failure.
///
/// This is a classification only; presentation belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryHint {
    /// Nothing to do but acknowledge the failure.
    Acknowledge,
    /// The request may succeed if retried later.
    Retry,
    /// The session expired; logging in again may help.
    Reauthenticate,
}

impl RepositoryError {
    /// True if the remote reported that the resource already exists (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RepositoryError::Remote(RemoteError::Conflict)
                | RepositoryError::Remote(RemoteError::Http { status: 409, .. })
        )
    }

    /// True if the remote reported that the resource does not exist (HTTP 404).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepositoryError::Remote(RemoteError::NotFound)
                | RepositoryError::Remote(RemoteError::Http { status: 404, .. })
        )
    }

    /// Classifies a remote failure by the status the backend answered with.
    ///
    /// Conflicts have no hint: they are never surfaced as failures. Local store errors and
    /// unclassified statuses have no hint either.
    pub fn recovery_hint(&self) -> Option<RecoveryHint> {
        let status = match self {
            RepositoryError::Remote(RemoteError::Http { status, .. }) => *status,
            RepositoryError::Remote(RemoteError::NotFound) => 404,
            RepositoryError::Remote(RemoteError::Transport(_)) => return Some(RecoveryHint::Retry),
            _ => return None,
        };

        match status {
            401 => Some(RecoveryHint::Reauthenticate),
            400 | 403 | 404 | 405 => Some(RecoveryHint::Acknowledge),
            408 | 429 | 500 => Some(RecoveryHint::Retry),
            _ => None,
        }
    }
}
