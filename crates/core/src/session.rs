//! Collaborator seams and per-profile session resolution.
//!
//! The orchestrator never reaches for ambient state. Every workflow receives a [`ProfileId`]
//! and resolves a [`UserSession`] from the [`SessionProvider`] it was constructed with. The
//! session bundles the four collaborators scoped to that profile.
//!
//! Each collaborator call completes with exactly one terminal value, modelled as an `async fn`
//! returning a `Result`.

use crate::charge_item::{ChargeItem, SparseChargeItem};
use crate::consent::{Consent, ConsentCategory};
use crate::error::{AuthError, LocalStoreError, RepositoryError};
use crate::profile::{Profile, ProfileId};
use async_trait::async_trait;
use std::sync::Arc;

/// Answers whether the profile's session is authenticated and can attempt to authenticate.
#[async_trait]
pub trait AuthenticationGate: Send + Sync {
    /// True if the session currently holds a valid authentication.
    async fn is_authenticated(&self) -> Result<bool, AuthError>;

    /// Authenticates without user interaction if that is possible (for example via a
    /// registered biometric key). `Ok(false)` means a further, interactive step is required.
    async fn authenticate_if_possible(&self) -> Result<bool, AuthError>;
}

/// Remote registry of patient consents.
#[async_trait]
pub trait ConsentRegistry: Send + Sync {
    async fn fetch_consents(&self) -> Result<Vec<Consent>, RepositoryError>;

    /// Grants `consent`. `Ok(None)` means the registry answered without a consent body.
    async fn grant_consent(&self, consent: &Consent) -> Result<Option<Consent>, RepositoryError>;

    /// Revokes the consent of `category`. `Ok(false)` means the registry did not confirm it.
    async fn revoke_consent(&self, category: ConsentCategory) -> Result<bool, RepositoryError>;
}

/// Local and remote storage of charge items.
#[async_trait]
pub trait ChargeItemRepository: Send + Sync {
    /// Reads the local cache only.
    async fn load_local(&self) -> Result<Vec<SparseChargeItem>, RepositoryError>;

    /// Fetches from the remote, persists locally and returns the up-to-date local list.
    async fn load_remote_and_save(&self) -> Result<Vec<SparseChargeItem>, RepositoryError>;

    /// Fetches from the remote without touching the local cache.
    async fn load_remote(&self) -> Result<Vec<SparseChargeItem>, RepositoryError>;

    /// Deletes `item` remotely and locally.
    async fn delete(&self, item: &ChargeItem) -> Result<bool, RepositoryError>;

    /// Deletes every locally cached item.
    async fn delete_all_local(&self) -> Result<bool, RepositoryError>;
}

/// Local store of the profile a session belongs to.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self) -> Result<Profile, LocalStoreError>;
}

/// Collaborators scoped to one profile.
#[derive(Clone)]
pub struct UserSession {
    pub authentication: Arc<dyn AuthenticationGate>,
    pub consents: Arc<dyn ConsentRegistry>,
    pub charge_items: Arc<dyn ChargeItemRepository>,
    pub profiles: Arc<dyn ProfileStore>,
}

/// Resolves the session handle of a profile.
pub trait SessionProvider: Send + Sync {
    fn user_session(&self, profile_id: &ProfileId) -> UserSession;
}

impl<P: SessionProvider + ?Sized> SessionProvider for Arc<P> {
    fn user_session(&self, profile_id: &ProfileId) -> UserSession {
        (**self).user_session(profile_id)
    }
}
