//! In-process backend.
//!
//! [`InProcessBackend`] stands in for the remote services a device talks to: the identity
//! provider that authenticates a session, the consent registry and the charge-item service. It
//! implements [`SessionProvider`], so an orchestrator can run against it unchanged, and it
//! exposes the administrative operations (register a profile, complete a login, seed remote
//! charge items) that the real world would perform out of band.
//!
//! Registry semantics mirror the remote service:
//! - at most one consent per identifier; a second grant is a [`RemoteError::Conflict`]
//! - revoking a consent that does not exist is a [`RemoteError::NotFound`]
//! - revoking a consent also deletes the remote charge items of that insured person
//! - every registry and charge-item call on an unauthenticated session answers HTTP 401

use crate::charge_item::SparseChargeItem;
use crate::config::CoreConfig;
use crate::consent::{Consent, ConsentCategory};
use crate::error::{AuthError, LocalStoreError, RemoteError, RepositoryError};
use crate::profile::{Profile, ProfileId};
use crate::repositories::local::LocalChargeItemStore;
use crate::repositories::syncing::{RemoteChargeItemSource, SyncingChargeItemRepository};
use crate::session::{
    AuthenticationGate, ConsentRegistry, ProfileStore, SessionProvider, UserSession,
};
use crate::{InsuranceId, NonEmptyText};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("unknown profile: {0}")]
    UnknownProfile(ProfileId),
    #[error("profile {0} is not associated with an insurance id")]
    MissingInsuranceId(ProfileId),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Clone, Debug)]
struct ProfileEntry {
    profile: Profile,
    authenticated: bool,
    /// A stored credential allows re-authentication without user interaction.
    silent_reauthentication: bool,
}

#[derive(Default)]
struct BackendState {
    profiles: RwLock<HashMap<ProfileId, ProfileEntry>>,
    consents: RwLock<HashMap<String, Consent>>,
    remote_items: RwLock<HashMap<InsuranceId, Vec<SparseChargeItem>>>,
    cache_guard: Arc<Mutex<()>>,
}

/// Shared in-process backend. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InProcessBackend {
    cfg: Arc<CoreConfig>,
    state: Arc<BackendState>,
}

impl InProcessBackend {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            state: Arc::new(BackendState::default()),
        }
    }

    /// Registers a new, unauthenticated profile.
    pub async fn register_profile(
        &self,
        name: Option<NonEmptyText>,
        insurance_id: Option<InsuranceId>,
    ) -> Profile {
        let profile = Profile::new(ProfileId::new(), insurance_id);
        let profile = match name {
            Some(name) => profile.with_name(name),
            None => profile,
        };

        self.state.profiles.write().await.insert(
            profile.id.clone(),
            ProfileEntry {
                profile: profile.clone(),
                authenticated: false,
                silent_reauthentication: false,
            },
        );
        tracing::info!(profile_id = %profile.id, "profile registered");
        profile
    }

    pub async fn profile(&self, profile_id: &ProfileId) -> Option<Profile> {
        self.state
            .profiles
            .read()
            .await
            .get(profile_id)
            .map(|entry| entry.profile.clone())
    }

    pub async fn is_authenticated(&self, profile_id: &ProfileId) -> bool {
        self.state
            .profiles
            .read()
            .await
            .get(profile_id)
            .is_some_and(|entry| entry.authenticated)
    }

    /// Completes an interactive login. Afterwards the session can also re-authenticate silently.
    pub async fn complete_login(&self, profile_id: &ProfileId) -> BackendResult<()> {
        self.update_entry(profile_id, |entry| {
            entry.authenticated = true;
            entry.silent_reauthentication = true;
        })
        .await
    }

    /// Ends the session and forgets the stored credential.
    pub async fn logout(&self, profile_id: &ProfileId) -> BackendResult<()> {
        self.update_entry(profile_id, |entry| {
            entry.authenticated = false;
            entry.silent_reauthentication = false;
        })
        .await
    }

    /// Drops the session but keeps the stored credential, as a token expiry would.
    pub async fn expire_session(&self, profile_id: &ProfileId) -> BackendResult<()> {
        self.update_entry(profile_id, |entry| entry.authenticated = false)
            .await
    }

    /// Adds or replaces remote charge items of the profile's insured person.
    pub async fn seed_remote_charge_items(
        &self,
        profile_id: &ProfileId,
        items: Vec<SparseChargeItem>,
    ) -> BackendResult<usize> {
        let profile = self
            .profile(profile_id)
            .await
            .ok_or_else(|| BackendError::UnknownProfile(profile_id.clone()))?;
        let insurance_id = profile
            .insurance_id
            .ok_or_else(|| BackendError::MissingInsuranceId(profile_id.clone()))?;

        let count = items.len();
        let mut remote = self.state.remote_items.write().await;
        let stored = remote.entry(insurance_id).or_default();
        for item in items {
            stored.retain(|existing| existing.identifier != item.identifier);
            stored.push(item);
        }
        tracing::info!(%profile_id, count, "remote charge items seeded");
        Ok(count)
    }

    async fn update_entry(
        &self,
        profile_id: &ProfileId,
        update: impl FnOnce(&mut ProfileEntry),
    ) -> BackendResult<()> {
        let mut profiles = self.state.profiles.write().await;
        let entry = profiles
            .get_mut(profile_id)
            .ok_or_else(|| BackendError::UnknownProfile(profile_id.clone()))?;
        update(entry);
        Ok(())
    }
}

impl SessionProvider for InProcessBackend {
    fn user_session(&self, profile_id: &ProfileId) -> UserSession {
        let handle = Arc::new(BackendSession {
            profile_id: profile_id.clone(),
            state: self.state.clone(),
        });
        let local = LocalChargeItemStore::new(self.cfg.clone(), profile_id.clone());
        let charge_items = SyncingChargeItemRepository::new(handle.clone(), local)
            .with_cache_guard(self.state.cache_guard.clone());

        UserSession {
            authentication: handle.clone(),
            consents: handle.clone(),
            charge_items: Arc::new(charge_items),
            profiles: handle,
        }
    }
}

/// Backend view scoped to one profile.
struct BackendSession {
    profile_id: ProfileId,
    state: Arc<BackendState>,
}

impl BackendSession {
    async fn entry(&self) -> Option<ProfileEntry> {
        self.state.profiles.read().await.get(&self.profile_id).cloned()
    }

    /// The profile's insurance id, provided the session is authenticated.
    async fn authorised_insurance_id(&self) -> Result<Option<InsuranceId>, RemoteError> {
        match self.entry().await {
            Some(entry) if entry.authenticated => Ok(entry.profile.insurance_id),
            _ => Err(RemoteError::Http {
                status: 401,
                message: "Unauthorized".into(),
            }),
        }
    }
}

#[async_trait]
impl AuthenticationGate for BackendSession {
    async fn is_authenticated(&self) -> Result<bool, AuthError> {
        match self.entry().await {
            Some(entry) => Ok(entry.authenticated),
            None => Err(AuthError::SessionUnavailable(self.profile_id.to_string())),
        }
    }

    async fn authenticate_if_possible(&self) -> Result<bool, AuthError> {
        let mut profiles = self.state.profiles.write().await;
        let entry = profiles
            .get_mut(&self.profile_id)
            .ok_or_else(|| AuthError::SessionUnavailable(self.profile_id.to_string()))?;

        if !entry.authenticated && entry.silent_reauthentication {
            entry.authenticated = true;
            tracing::debug!(profile_id = %self.profile_id, "session re-authenticated silently");
        }
        Ok(entry.authenticated)
    }
}

#[async_trait]
impl ConsentRegistry for BackendSession {
    async fn fetch_consents(&self) -> Result<Vec<Consent>, RepositoryError> {
        let Some(insurance_id) = self.authorised_insurance_id().await? else {
            return Ok(Vec::new());
        };

        Ok(self
            .state
            .consents
            .read()
            .await
            .values()
            .filter(|consent| consent.insurance_id == insurance_id)
            .cloned()
            .collect())
    }

    async fn grant_consent(&self, consent: &Consent) -> Result<Option<Consent>, RepositoryError> {
        self.authorised_insurance_id().await?;

        let mut consents = self.state.consents.write().await;
        if consents.contains_key(&consent.identifier) {
            return Err(RemoteError::Conflict.into());
        }
        consents.insert(consent.identifier.clone(), consent.clone());
        Ok(Some(consent.clone()))
    }

    async fn revoke_consent(&self, category: ConsentCategory) -> Result<bool, RepositoryError> {
        let insurance_id = self
            .authorised_insurance_id()
            .await?
            .ok_or(RemoteError::NotFound)?;
        let identifier = Consent::identifier_for(category, &insurance_id);

        if self.state.consents.write().await.remove(&identifier).is_none() {
            return Err(RemoteError::NotFound.into());
        }
        if category == ConsentCategory::ChargeItems {
            self.state.remote_items.write().await.remove(&insurance_id);
        }
        Ok(true)
    }
}

#[async_trait]
impl ProfileStore for BackendSession {
    async fn profile(&self) -> Result<Profile, LocalStoreError> {
        self.entry()
            .await
            .map(|entry| entry.profile)
            .ok_or_else(|| LocalStoreError::NotFound(format!("profile {}", self.profile_id)))
    }
}

#[async_trait]
impl RemoteChargeItemSource for BackendSession {
    async fn list_after(
        &self,
        after: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<SparseChargeItem>, RemoteError> {
        let Some(insurance_id) = self.authorised_insurance_id().await? else {
            return Ok(Vec::new());
        };

        Ok(self
            .state
            .remote_items
            .read()
            .await
            .get(&insurance_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| after.map_or(true, |after| item.entered_date > after))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, identifier: &str) -> Result<bool, RemoteError> {
        let insurance_id = self
            .authorised_insurance_id()
            .await?
            .ok_or(RemoteError::NotFound)?;

        let mut remote = self.state.remote_items.write().await;
        let items = remote.get_mut(&insurance_id).ok_or(RemoteError::NotFound)?;
        let before = items.len();
        items.retain(|item| item.identifier != identifier);
        if items.len() == before {
            return Err(RemoteError::NotFound);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge_item::{BillingPayload, ChargeItem};
    use crate::orchestrator::ChargeItemOrchestrator;
    use crate::outcome::{
        AuthenticateResult, ConsentCheckResult, DeleteError, DeleteResult, FetchResult,
        GrantResult, RevokeError, RevokeResult,
    };
    use tempfile::TempDir;

    fn item(identifier: &str, entered: &str) -> SparseChargeItem {
        SparseChargeItem {
            identifier: identifier.into(),
            task_id: Some("160.000.000.000.001.01".into()),
            payload: BillingPayload::new(b"<ChargeItem/>".to_vec()),
            entered_date: DateTime::parse_from_rfc3339(entered).expect("valid timestamp"),
            is_read: false,
        }
    }

    fn backend(temp: &TempDir) -> InProcessBackend {
        let cfg = CoreConfig::new(temp.path().to_path_buf()).expect("valid config");
        InProcessBackend::new(Arc::new(cfg))
    }

    async fn insured_profile(backend: &InProcessBackend) -> Profile {
        backend
            .register_profile(
                Some(NonEmptyText::new("Erika Mustermann").expect("name")),
                Some(InsuranceId::parse("X114428530").expect("kvnr")),
            )
            .await
    }

    #[tokio::test]
    async fn full_consent_lifecycle() {
        let temp = TempDir::new().expect("tempdir");
        let backend = backend(&temp);
        let orchestrator = ChargeItemOrchestrator::new(backend.clone());
        let profile = insured_profile(&backend).await;
        let id = &profile.id;
        assert_eq!(
            profile.name.as_ref().map(|name| name.to_string()).as_deref(),
            Some("Erika Mustermann")
        );

        backend
            .seed_remote_charge_items(
                id,
                vec![
                    item("abc1", "2022-07-12T10:24:47+02:00"),
                    item("abc2", "2023-07-12T10:24:47+02:00"),
                ],
            )
            .await
            .expect("seed");

        assert_eq!(
            orchestrator.fetch_charge_items(id).await,
            FetchResult::NotAuthenticated
        );
        assert_eq!(
            orchestrator.authenticate(id).await,
            AuthenticateResult::FurtherAuthenticationRequired
        );

        backend.complete_login(id).await.expect("login");
        assert_eq!(
            orchestrator.fetch_charge_items(id).await,
            FetchResult::ConsentNotGranted
        );

        assert_eq!(
            orchestrator.grant_charge_items_consent(id).await,
            GrantResult::Success
        );
        assert_eq!(
            orchestrator.grant_charge_items_consent(id).await,
            GrantResult::Conflict
        );
        assert_eq!(
            orchestrator.check_for_consent(id).await,
            ConsentCheckResult::Granted
        );

        let FetchResult::Success(items) = orchestrator.fetch_charge_items(id).await else {
            panic!("expected charge items");
        };
        let ids: Vec<&str> = items.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec!["abc2", "abc1"]);

        let target = ChargeItem::from(items[1].clone());
        assert_eq!(
            orchestrator.delete_charge_item(&target, id).await,
            DeleteResult::Success
        );
        assert!(matches!(
            orchestrator.delete_charge_item(&target, id).await,
            DeleteResult::Error(DeleteError::Unexpected(Some(_)))
        ));

        assert_eq!(
            orchestrator.revoke_charge_items_consent(id).await,
            RevokeResult::Success(true)
        );
        assert_eq!(
            orchestrator.fetch_local_charge_items(id).await,
            FetchResult::Success(vec![])
        );
        assert_eq!(
            orchestrator.revoke_charge_items_consent(id).await,
            RevokeResult::Success(false)
        );
        assert_eq!(
            orchestrator.check_for_consent(id).await,
            ConsentCheckResult::NotGranted
        );
    }

    #[tokio::test]
    async fn expired_session_reauthenticates_silently() {
        let temp = TempDir::new().expect("tempdir");
        let backend = backend(&temp);
        let orchestrator = ChargeItemOrchestrator::new(backend.clone());
        let profile = insured_profile(&backend).await;

        backend.complete_login(&profile.id).await.expect("login");
        backend.expire_session(&profile.id).await.expect("expire");
        assert!(!backend.is_authenticated(&profile.id).await);

        assert_eq!(
            orchestrator.authenticate(&profile.id).await,
            AuthenticateResult::Success
        );
        assert!(backend.is_authenticated(&profile.id).await);

        backend.logout(&profile.id).await.expect("logout");
        assert_eq!(
            orchestrator.authenticate(&profile.id).await,
            AuthenticateResult::FurtherAuthenticationRequired
        );
        assert_eq!(
            orchestrator.revoke_charge_items_consent(&profile.id).await,
            RevokeResult::Error(RevokeError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn consents_are_scoped_to_the_insured_person() {
        let temp = TempDir::new().expect("tempdir");
        let backend = backend(&temp);
        let orchestrator = ChargeItemOrchestrator::new(backend.clone());

        let first = insured_profile(&backend).await;
        let second = backend
            .register_profile(None, Some(InsuranceId::parse("A000000001").expect("kvnr")))
            .await;
        backend.complete_login(&first.id).await.expect("login");
        backend.complete_login(&second.id).await.expect("login");

        assert_eq!(
            orchestrator.grant_charge_items_consent(&first.id).await,
            GrantResult::Success
        );
        assert_eq!(
            orchestrator.check_for_consent(&second.id).await,
            ConsentCheckResult::NotGranted
        );
    }

    #[tokio::test]
    async fn profile_without_insurance_id_cannot_be_seeded() {
        let temp = TempDir::new().expect("tempdir");
        let backend = backend(&temp);
        let profile = backend.register_profile(None, None).await;

        assert_eq!(
            backend.seed_remote_charge_items(&profile.id, vec![]).await,
            Err(BackendError::MissingInsuranceId(profile.id.clone()))
        );

        let unknown = ProfileId::new();
        assert_eq!(
            backend.complete_login(&unknown).await,
            Err(BackendError::UnknownProfile(unknown.clone()))
        );
    }

    #[tokio::test]
    async fn unknown_profile_session_is_unavailable() {
        let temp = TempDir::new().expect("tempdir");
        let backend = backend(&temp);
        let session = backend.user_session(&ProfileId::new());

        assert!(matches!(
            session.authentication.is_authenticated().await,
            Err(AuthError::SessionUnavailable(_))
        ));
        assert!(matches!(
            session.profiles.profile().await,
            Err(LocalStoreError::NotFound(_))
        ));
    }
}
