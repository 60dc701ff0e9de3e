//! Charge-item consent and synchronization workflows.
//!
//! [`ChargeItemOrchestrator`] composes the authentication gate, the consent registry, the
//! charge-item repository and the profile store of a profile's [`UserSession`] into total
//! workflows. Each workflow awaits its steps strictly in order, short-circuits on the first
//! terminal answer and maps every collaborator failure into its own error variant at the call
//! site.
//!
//! The orchestrator holds no state besides its session provider: it is cheap to clone and safe
//! to call concurrently for different profiles. It does not retry, de-duplicate or time out;
//! those semantics belong to the collaborators and the caller.

use crate::charge_item::ChargeItem;
use crate::consent::{Consent, ConsentCategory};
use crate::error::LocalStoreError;
use crate::evaluator::{ConsentEvaluator, ConsentState};
use crate::outcome::{
    AuthenticateError, AuthenticateResult, ConsentCheckResult, DeleteError, DeleteResult,
    FetchError, FetchResult, GrantError, GrantResult, RevokeError, RevokeResult,
};
use crate::profile::ProfileId;
use crate::session::{SessionProvider, UserSession};
use crate::InsuranceId;
use chrono::{NaiveDate, Utc};

/// Why a profile's insurance number could not be resolved.
enum InsuranceLookupError {
    Store(LocalStoreError),
    Missing,
}

impl From<InsuranceLookupError> for FetchError {
    fn from(err: InsuranceLookupError) -> Self {
        match err {
            InsuranceLookupError::Store(cause) => FetchError::LocalStore(cause),
            InsuranceLookupError::Missing => FetchError::Unexpected,
        }
    }
}

impl From<InsuranceLookupError> for GrantError {
    fn from(err: InsuranceLookupError) -> Self {
        match err {
            InsuranceLookupError::Store(cause) => GrantError::LocalStore(cause),
            InsuranceLookupError::Missing => GrantError::Unexpected,
        }
    }
}

/// Runs the charge-item workflows against sessions resolved from `P`.
#[derive(Clone)]
pub struct ChargeItemOrchestrator<P> {
    sessions: P,
    today: fn() -> NaiveDate,
}

fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

impl<P: SessionProvider> ChargeItemOrchestrator<P> {
    pub fn new(sessions: P) -> Self {
        Self {
            sessions,
            today: utc_today,
        }
    }

    /// Replaces the clock that dates newly granted consents.
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Authenticates the profile if that is possible without user interaction.
    ///
    /// Idempotent; may be called repeatedly.
    pub async fn authenticate(&self, profile_id: &ProfileId) -> AuthenticateResult {
        let session = self.sessions.user_session(profile_id);

        match session.authentication.authenticate_if_possible().await {
            Ok(true) => AuthenticateResult::Success,
            Ok(false) => {
                tracing::debug!(%profile_id, "further authentication required");
                AuthenticateResult::FurtherAuthenticationRequired
            }
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "authentication gate failed");
                AuthenticateResult::Error(AuthenticateError::Auth(cause))
            }
        }
    }

    /// Reports whether the profile holds a charge-item consent, without loading records.
    pub async fn check_for_consent(&self, profile_id: &ProfileId) -> ConsentCheckResult {
        let session = self.sessions.user_session(profile_id);

        match session.authentication.is_authenticated().await {
            Ok(true) => {}
            Ok(false) => return ConsentCheckResult::NotAuthenticated,
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "authentication check failed");
                return ConsentCheckResult::Error(FetchError::Auth(cause));
            }
        }

        match Self::consent_state(&session).await {
            Ok(ConsentState::Granted) => ConsentCheckResult::Granted,
            Ok(ConsentState::NotGranted) => ConsentCheckResult::NotGranted,
            Err(err) => {
                tracing::warn!(%profile_id, error = %err, "consent check failed");
                ConsentCheckResult::Error(err)
            }
        }
    }

    /// Consent-gated remote synchronization.
    ///
    /// Checks authentication, then the profile's consent, then fetches remote charge items,
    /// persists them locally and returns the up-to-date local list.
    pub async fn fetch_charge_items(&self, profile_id: &ProfileId) -> FetchResult {
        let session = self.sessions.user_session(profile_id);

        match session.authentication.is_authenticated().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(%profile_id, "fetch skipped: not authenticated");
                return FetchResult::NotAuthenticated;
            }
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "authentication check failed");
                return FetchResult::Error(FetchError::Auth(cause));
            }
        }

        match Self::consent_state(&session).await {
            Ok(ConsentState::Granted) => {}
            Ok(ConsentState::NotGranted) => {
                tracing::debug!(%profile_id, "fetch skipped: consent not granted");
                return FetchResult::ConsentNotGranted;
            }
            Err(err) => {
                tracing::warn!(%profile_id, error = %err, "consent lookup failed");
                return FetchResult::Error(err);
            }
        }

        Self::load_remote_and_save(&session, profile_id).await
    }

    /// Like [`fetch_charge_items`](Self::fetch_charge_items) but skips the consent lookup,
    /// for callers that already know the consent exists (for example right after a grant).
    pub async fn fetch_charge_items_assuming_consent_granted(
        &self,
        profile_id: &ProfileId,
    ) -> FetchResult {
        let session = self.sessions.user_session(profile_id);

        match session.authentication.is_authenticated().await {
            Ok(true) => Self::load_remote_and_save(&session, profile_id).await,
            Ok(false) => FetchResult::NotAuthenticated,
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "authentication check failed");
                FetchResult::Error(FetchError::Auth(cause))
            }
        }
    }

    /// Reads the local cache only. No authentication, no consent check.
    pub async fn fetch_local_charge_items(&self, profile_id: &ProfileId) -> FetchResult {
        let session = self.sessions.user_session(profile_id);

        match session.charge_items.load_local().await {
            Ok(items) => FetchResult::Success(items),
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "local charge items unavailable");
                FetchResult::Error(FetchError::Repository(cause))
            }
        }
    }

    /// Grants the charge-item consent for the profile.
    ///
    /// A registry conflict means the consent already exists and is reported as
    /// [`GrantResult::Conflict`], never as an error.
    pub async fn grant_charge_items_consent(&self, profile_id: &ProfileId) -> GrantResult {
        let session = self.sessions.user_session(profile_id);

        match session.authentication.is_authenticated().await {
            Ok(true) => {}
            Ok(false) => return GrantResult::NotAuthenticated,
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "authentication check failed");
                return GrantResult::Error(GrantError::Auth(cause));
            }
        }

        let insurance_id = match Self::insurance_id(&session).await {
            Ok(insurance_id) => insurance_id,
            Err(err) => return GrantResult::Error(err.into()),
        };

        let consent = Consent::charge_items(insurance_id.clone(), (self.today)());

        match session.consents.grant_consent(&consent).await {
            Ok(received) if ConsentEvaluator::accepts(received.as_ref(), &insurance_id) => {
                tracing::info!(%profile_id, identifier = %consent.identifier, "consent granted");
                GrantResult::Success
            }
            Ok(received) => {
                tracing::warn!(
                    %profile_id,
                    received = ?received.map(|c| c.identifier),
                    "registry answered grant without the requested consent"
                );
                GrantResult::Error(GrantError::UnexpectedGrantConsentResponse)
            }
            Err(cause) if cause.is_conflict() => {
                tracing::info!(%profile_id, "consent already granted");
                GrantResult::Conflict
            }
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "grant consent failed");
                GrantResult::Error(GrantError::Repository(cause))
            }
        }
    }

    /// Revokes the charge-item consent and purges the local cache.
    ///
    /// The backend deletes its charge items together with the consent, so a successful
    /// revocation also clears the profile's cached items. Revocation is reached from an
    /// authenticated state; an unauthenticated session is reported through
    /// [`RevokeError::NotAuthenticated`] and the registry is not called.
    pub async fn revoke_charge_items_consent(&self, profile_id: &ProfileId) -> RevokeResult {
        let session = self.sessions.user_session(profile_id);

        match session.authentication.is_authenticated().await {
            Ok(true) => {}
            Ok(false) => return RevokeResult::Error(RevokeError::NotAuthenticated),
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "authentication check failed");
                return RevokeResult::Error(RevokeError::Auth(cause));
            }
        }

        match session
            .consents
            .revoke_consent(ConsentCategory::ChargeItems)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%profile_id, "registry did not confirm revocation");
                return RevokeResult::Error(RevokeError::UnexpectedRevokeConsentResponse);
            }
            Err(cause) if cause.is_not_found() => {
                tracing::info!(%profile_id, "no consent to revoke");
                return RevokeResult::Success(false);
            }
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "revoke consent failed");
                return RevokeResult::Error(RevokeError::Repository(cause));
            }
        }

        match session.charge_items.delete_all_local().await {
            Ok(_) => {
                tracing::info!(%profile_id, "consent revoked and local charge items purged");
                RevokeResult::Success(true)
            }
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "purging local charge items failed");
                RevokeResult::Error(RevokeError::Repository(cause))
            }
        }
    }

    /// Deletes one charge item remotely and locally.
    pub async fn delete_charge_item(
        &self,
        item: &ChargeItem,
        profile_id: &ProfileId,
    ) -> DeleteResult {
        let session = self.sessions.user_session(profile_id);

        match session.authentication.is_authenticated().await {
            Ok(true) => {}
            Ok(false) => return DeleteResult::NotAuthenticated,
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "authentication check failed");
                return DeleteResult::Error(DeleteError::Auth(cause));
            }
        }

        match session.charge_items.delete(item).await {
            Ok(true) => {
                tracing::info!(%profile_id, identifier = %item.identifier, "charge item deleted");
                DeleteResult::Success
            }
            Ok(false) => DeleteResult::Error(DeleteError::Unexpected(None)),
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "delete charge item failed");
                DeleteResult::Error(DeleteError::Unexpected(Some(cause)))
            }
        }
    }

    async fn insurance_id(session: &UserSession) -> Result<InsuranceId, InsuranceLookupError> {
        let profile = session
            .profiles
            .profile()
            .await
            .map_err(InsuranceLookupError::Store)?;

        profile.insurance_id.ok_or(InsuranceLookupError::Missing)
    }

    async fn consent_state(session: &UserSession) -> Result<ConsentState, FetchError> {
        let insurance_id = Self::insurance_id(session).await?;
        let consents = session
            .consents
            .fetch_consents()
            .await
            .map_err(FetchError::Repository)?;

        Ok(ConsentEvaluator::evaluate(&consents, &insurance_id))
    }

    async fn load_remote_and_save(session: &UserSession, profile_id: &ProfileId) -> FetchResult {
        match session.charge_items.load_remote_and_save().await {
            Ok(items) => {
                tracing::debug!(%profile_id, count = items.len(), "charge items synchronized");
                FetchResult::Success(items)
            }
            Err(cause) => {
                tracing::warn!(%profile_id, error = %cause, "loading remote charge items failed");
                FetchResult::Error(FetchError::Repository(cause))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge_item::{BillingPayload, SparseChargeItem};
    use crate::error::{AuthError, RemoteError, RepositoryError};
    use crate::profile::Profile;
    use crate::session::{AuthenticationGate, ChargeItemRepository, ConsentRegistry, ProfileStore};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const KVNR: &str = "X114428530";

    fn kvnr() -> InsuranceId {
        InsuranceId::parse(KVNR).expect("valid kvnr")
    }

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date")
    }

    fn valid_consent() -> Consent {
        Consent::charge_items(kvnr(), fixed_today())
    }

    fn sparse(identifier: &str) -> SparseChargeItem {
        SparseChargeItem {
            identifier: identifier.into(),
            task_id: None,
            payload: BillingPayload::new(b"{}".to_vec()),
            entered_date: DateTime::parse_from_rfc3339("2023-07-12T10:24:47+02:00")
                .expect("valid timestamp"),
            is_read: false,
        }
    }

    struct FakeGate {
        authenticated: Result<bool, AuthError>,
        authenticate_if_possible: Result<bool, AuthError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthenticationGate for FakeGate {
        async fn is_authenticated(&self) -> Result<bool, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.authenticated.clone()
        }

        async fn authenticate_if_possible(&self) -> Result<bool, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.authenticate_if_possible.clone()
        }
    }

    /// Registry that enforces one consent per identifier unless a canned answer is set.
    #[derive(Default)]
    struct FakeRegistry {
        stored: Mutex<Vec<Consent>>,
        fetch_failure: Option<RepositoryError>,
        grant_answer: Option<Result<Option<Consent>, RepositoryError>>,
        revoke_answer: Option<Result<bool, RepositoryError>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConsentRegistry for FakeRegistry {
        async fn fetch_consents(&self) -> Result<Vec<Consent>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fetch_failure {
                Some(err) => Err(err.clone()),
                None => Ok(self.stored.lock().expect("lock").clone()),
            }
        }

        async fn grant_consent(
            &self,
            consent: &Consent,
        ) -> Result<Option<Consent>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(answer) = &self.grant_answer {
                return answer.clone();
            }
            let mut stored = self.stored.lock().expect("lock");
            if stored.iter().any(|c| c.identifier == consent.identifier) {
                return Err(RepositoryError::Remote(RemoteError::Http {
                    status: 409,
                    message: "Conflict".into(),
                }));
            }
            stored.push(consent.clone());
            Ok(Some(consent.clone()))
        }

        async fn revoke_consent(
            &self,
            _category: ConsentCategory,
        ) -> Result<bool, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.revoke_answer.clone().unwrap_or(Ok(true))
        }
    }

    struct FakeRepository {
        local: Vec<SparseChargeItem>,
        local_failure: Option<RepositoryError>,
        remote_and_save: Result<Vec<SparseChargeItem>, RepositoryError>,
        delete_answer: Result<bool, RepositoryError>,
        delete_all_local_answer: Result<bool, RepositoryError>,
        calls: AtomicUsize,
        purges: AtomicUsize,
    }

    impl Default for FakeRepository {
        fn default() -> Self {
            Self {
                local: vec![],
                local_failure: None,
                remote_and_save: Ok(vec![]),
                delete_answer: Ok(true),
                delete_all_local_answer: Ok(true),
                calls: AtomicUsize::new(0),
                purges: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChargeItemRepository for FakeRepository {
        async fn load_local(&self) -> Result<Vec<SparseChargeItem>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.local_failure {
                Some(err) => Err(err.clone()),
                None => Ok(self.local.clone()),
            }
        }

        async fn load_remote_and_save(&self) -> Result<Vec<SparseChargeItem>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.remote_and_save.clone()
        }

        async fn load_remote(&self) -> Result<Vec<SparseChargeItem>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.remote_and_save.clone()
        }

        async fn delete(&self, _item: &ChargeItem) -> Result<bool, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.delete_answer.clone()
        }

        async fn delete_all_local(&self) -> Result<bool, RepositoryError> {
            self.purges.fetch_add(1, Ordering::SeqCst);
            self.delete_all_local_answer.clone()
        }
    }

    struct FakeProfiles {
        profile: Result<Profile, LocalStoreError>,
    }

    #[async_trait]
    impl ProfileStore for FakeProfiles {
        async fn profile(&self) -> Result<Profile, LocalStoreError> {
            self.profile.clone()
        }
    }

    struct FakeProvider {
        session: UserSession,
    }

    impl SessionProvider for FakeProvider {
        fn user_session(&self, _profile_id: &ProfileId) -> UserSession {
            self.session.clone()
        }
    }

    struct Fixture {
        profile_id: ProfileId,
        gate: Arc<FakeGate>,
        registry: Arc<FakeRegistry>,
        repository: Arc<FakeRepository>,
        orchestrator: ChargeItemOrchestrator<FakeProvider>,
    }

    struct FixtureBuilder {
        gate: FakeGate,
        registry: FakeRegistry,
        repository: FakeRepository,
        profile: Result<Profile, LocalStoreError>,
    }

    impl FixtureBuilder {
        fn authenticated() -> Self {
            let profile_id = ProfileId::new();
            Self {
                gate: FakeGate {
                    authenticated: Ok(true),
                    authenticate_if_possible: Ok(true),
                    calls: AtomicUsize::new(0),
                },
                registry: FakeRegistry::default(),
                repository: FakeRepository::default(),
                profile: Ok(Profile::new(profile_id, Some(kvnr()))),
            }
        }

        fn unauthenticated() -> Self {
            let mut builder = Self::authenticated();
            builder.gate.authenticated = Ok(false);
            builder.gate.authenticate_if_possible = Ok(false);
            builder
        }

        fn build(self) -> Fixture {
            let gate = Arc::new(self.gate);
            let registry = Arc::new(self.registry);
            let repository = Arc::new(self.repository);
            let profile_id = match &self.profile {
                Ok(profile) => profile.id.clone(),
                Err(_) => ProfileId::new(),
            };
            let session = UserSession {
                authentication: gate.clone(),
                consents: registry.clone(),
                charge_items: repository.clone(),
                profiles: Arc::new(FakeProfiles {
                    profile: self.profile,
                }),
            };
            Fixture {
                profile_id,
                gate,
                registry,
                repository,
                orchestrator: ChargeItemOrchestrator::new(FakeProvider { session })
                    .with_today(fixed_today),
            }
        }
    }

    impl Fixture {
        fn registry_calls(&self) -> usize {
            self.registry.calls.load(Ordering::SeqCst)
        }

        fn repository_calls(&self) -> usize {
            self.repository.calls.load(Ordering::SeqCst)
                + self.repository.purges.load(Ordering::SeqCst)
        }
    }

    // -- authenticate ---------------------------------------------------------

    #[tokio::test]
    async fn authenticate_maps_gate_answers() {
        let fx = FixtureBuilder::authenticated().build();
        assert_eq!(
            fx.orchestrator.authenticate(&fx.profile_id).await,
            AuthenticateResult::Success
        );
        // idempotent
        assert_eq!(
            fx.orchestrator.authenticate(&fx.profile_id).await,
            AuthenticateResult::Success
        );

        let fx = FixtureBuilder::unauthenticated().build();
        assert_eq!(
            fx.orchestrator.authenticate(&fx.profile_id).await,
            AuthenticateResult::FurtherAuthenticationRequired
        );

        let mut builder = FixtureBuilder::authenticated();
        builder.gate.authenticate_if_possible = Err(AuthError::Timeout);
        let fx = builder.build();
        assert_eq!(
            fx.orchestrator.authenticate(&fx.profile_id).await,
            AuthenticateResult::Error(AuthenticateError::Auth(AuthError::Timeout))
        );
    }

    // -- fetch ----------------------------------------------------------------

    #[tokio::test]
    async fn fetch_without_consent_is_consent_not_granted() {
        let fx = FixtureBuilder::authenticated().build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::ConsentNotGranted
        );
        assert_eq!(fx.repository_calls(), 0);
    }

    #[tokio::test]
    async fn fetch_with_consent_returns_synchronized_items() {
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.stored = Mutex::new(vec![valid_consent()]);
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::Success(vec![])
        );

        let mut builder = FixtureBuilder::authenticated();
        builder.registry.stored = Mutex::new(vec![valid_consent()]);
        builder.repository.remote_and_save = Ok(vec![sparse("abc1"), sparse("abc2")]);
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::Success(vec![sparse("abc1"), sparse("abc2")])
        );
    }

    #[tokio::test]
    async fn fetch_short_circuits_when_not_authenticated() {
        let fx = FixtureBuilder::unauthenticated().build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::NotAuthenticated
        );
        assert_eq!(
            fx.orchestrator
                .fetch_charge_items_assuming_consent_granted(&fx.profile_id)
                .await,
            FetchResult::NotAuthenticated
        );
        assert_eq!(fx.registry_calls(), 0);
        assert_eq!(fx.repository_calls(), 0);
    }

    #[tokio::test]
    async fn fetch_maps_gate_failure_to_auth_error() {
        let mut builder = FixtureBuilder::authenticated();
        builder.gate.authenticated = Err(AuthError::Transport("offline".into()));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::Error(FetchError::Auth(AuthError::Transport("offline".into())))
        );
        assert_eq!(fx.registry_calls(), 0);
    }

    #[tokio::test]
    async fn fetch_maps_registry_failure_to_repository_error() {
        let failure = RepositoryError::Remote(RemoteError::Transport("reset".into()));
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.fetch_failure = Some(failure.clone());
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::Error(FetchError::Repository(failure))
        );
        assert_eq!(fx.repository_calls(), 0);
    }

    #[tokio::test]
    async fn fetch_maps_repository_failure() {
        let failure = RepositoryError::Local(LocalStoreError::FileWrite("disk full".into()));
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.stored = Mutex::new(vec![valid_consent()]);
        builder.repository.remote_and_save = Err(failure.clone());
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::Error(FetchError::Repository(failure))
        );
    }

    #[tokio::test]
    async fn fetch_without_insurance_id_is_unexpected() {
        let mut builder = FixtureBuilder::authenticated();
        builder.profile = Ok(Profile::new(ProfileId::new(), None));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::Error(FetchError::Unexpected)
        );
        assert_eq!(fx.registry_calls(), 0);
    }

    #[tokio::test]
    async fn fetch_maps_profile_store_failure() {
        let mut builder = FixtureBuilder::authenticated();
        builder.profile = Err(LocalStoreError::NotFound("profile".into()));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator.fetch_charge_items(&fx.profile_id).await,
            FetchResult::Error(FetchError::LocalStore(LocalStoreError::NotFound(
                "profile".into()
            )))
        );
    }

    #[tokio::test]
    async fn fetch_assuming_consent_skips_registry() {
        let mut builder = FixtureBuilder::authenticated();
        builder.repository.remote_and_save = Ok(vec![sparse("abc1")]);
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator
                .fetch_charge_items_assuming_consent_granted(&fx.profile_id)
                .await,
            FetchResult::Success(vec![sparse("abc1")])
        );
        assert_eq!(fx.registry_calls(), 0);
    }

    #[tokio::test]
    async fn fetch_local_needs_neither_authentication_nor_consent() {
        let mut builder = FixtureBuilder::unauthenticated();
        builder.repository.local = vec![sparse("abc1")];
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator.fetch_local_charge_items(&fx.profile_id).await,
            FetchResult::Success(vec![sparse("abc1")])
        );
        assert_eq!(fx.gate.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.registry_calls(), 0);

        let failure = RepositoryError::Local(LocalStoreError::FileRead("corrupt".into()));
        let mut builder = FixtureBuilder::authenticated();
        builder.repository.local_failure = Some(failure.clone());
        let fx = builder.build();
        assert_eq!(
            fx.orchestrator.fetch_local_charge_items(&fx.profile_id).await,
            FetchResult::Error(FetchError::Repository(failure))
        );
    }

    // -- consent check ---------------------------------------------------------

    #[tokio::test]
    async fn check_for_consent_reports_state() {
        let fx = FixtureBuilder::authenticated().build();
        assert_eq!(
            fx.orchestrator.check_for_consent(&fx.profile_id).await,
            ConsentCheckResult::NotGranted
        );

        let mut builder = FixtureBuilder::authenticated();
        builder.registry.stored = Mutex::new(vec![valid_consent()]);
        let fx = builder.build();
        assert_eq!(
            fx.orchestrator.check_for_consent(&fx.profile_id).await,
            ConsentCheckResult::Granted
        );
        assert_eq!(fx.repository_calls(), 0);

        let fx = FixtureBuilder::unauthenticated().build();
        assert_eq!(
            fx.orchestrator.check_for_consent(&fx.profile_id).await,
            ConsentCheckResult::NotAuthenticated
        );
        assert_eq!(fx.registry_calls(), 0);
    }

    // -- grant -----------------------------------------------------------------

    #[tokio::test]
    async fn grant_twice_yields_success_then_conflict() {
        let fx = FixtureBuilder::authenticated().build();

        assert_eq!(
            fx.orchestrator
                .grant_charge_items_consent(&fx.profile_id)
                .await,
            GrantResult::Success
        );
        assert_eq!(
            fx.orchestrator
                .grant_charge_items_consent(&fx.profile_id)
                .await,
            GrantResult::Conflict
        );

        let stored = fx.registry.stored.lock().expect("lock").clone();
        assert_eq!(stored, vec![valid_consent()]);
    }

    #[tokio::test]
    async fn grant_without_consent_body_is_unexpected_response() {
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.grant_answer = Some(Ok(None));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator
                .grant_charge_items_consent(&fx.profile_id)
                .await,
            GrantResult::Error(GrantError::UnexpectedGrantConsentResponse)
        );
    }

    #[tokio::test]
    async fn grant_with_foreign_consent_body_is_unexpected_response() {
        let other = Consent::charge_items(
            InsuranceId::parse("A000000001").expect("valid kvnr"),
            fixed_today(),
        );
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.grant_answer = Some(Ok(Some(other)));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator
                .grant_charge_items_consent(&fx.profile_id)
                .await,
            GrantResult::Error(GrantError::UnexpectedGrantConsentResponse)
        );
    }

    #[tokio::test]
    async fn grant_explicit_conflict_is_not_an_error() {
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.grant_answer = Some(Err(RepositoryError::Remote(RemoteError::Conflict)));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator
                .grant_charge_items_consent(&fx.profile_id)
                .await,
            GrantResult::Conflict
        );
    }

    #[tokio::test]
    async fn grant_maps_other_registry_failures() {
        let failure = RepositoryError::Remote(RemoteError::Http {
            status: 500,
            message: "Internal Server Error".into(),
        });
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.grant_answer = Some(Err(failure.clone()));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator
                .grant_charge_items_consent(&fx.profile_id)
                .await,
            GrantResult::Error(GrantError::Repository(failure))
        );
    }

    #[tokio::test]
    async fn grant_short_circuits_when_not_authenticated() {
        let fx = FixtureBuilder::unauthenticated().build();

        assert_eq!(
            fx.orchestrator
                .grant_charge_items_consent(&fx.profile_id)
                .await,
            GrantResult::NotAuthenticated
        );
        assert_eq!(fx.registry_calls(), 0);
        assert_eq!(fx.repository_calls(), 0);
    }

    #[tokio::test]
    async fn grant_without_insurance_id_is_unexpected() {
        let mut builder = FixtureBuilder::authenticated();
        builder.profile = Ok(Profile::new(ProfileId::new(), None));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator
                .grant_charge_items_consent(&fx.profile_id)
                .await,
            GrantResult::Error(GrantError::Unexpected)
        );
        assert_eq!(fx.registry_calls(), 0);
    }

    // -- revoke ----------------------------------------------------------------

    #[tokio::test]
    async fn revoke_confirmed_purges_local_cache() {
        let fx = FixtureBuilder::authenticated().build();

        assert_eq!(
            fx.orchestrator
                .revoke_charge_items_consent(&fx.profile_id)
                .await,
            RevokeResult::Success(true)
        );
        assert_eq!(fx.repository.purges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn revoke_unconfirmed_is_unexpected_response() {
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.revoke_answer = Some(Ok(false));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator
                .revoke_charge_items_consent(&fx.profile_id)
                .await,
            RevokeResult::Error(RevokeError::UnexpectedRevokeConsentResponse)
        );
        assert_eq!(fx.repository.purges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn revoke_missing_consent_is_nothing_to_revoke() {
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.revoke_answer = Some(Err(RepositoryError::Remote(RemoteError::NotFound)));
        let fx = builder.build();

        assert_eq!(
            fx.orchestrator
                .revoke_charge_items_consent(&fx.profile_id)
                .await,
            RevokeResult::Success(false)
        );
    }

    #[tokio::test]
    async fn revoke_maps_failures() {
        let failure = RepositoryError::Remote(RemoteError::Transport("reset".into()));
        let mut builder = FixtureBuilder::authenticated();
        builder.registry.revoke_answer = Some(Err(failure.clone()));
        let fx = builder.build();
        assert_eq!(
            fx.orchestrator
                .revoke_charge_items_consent(&fx.profile_id)
                .await,
            RevokeResult::Error(RevokeError::Repository(failure))
        );

        let purge_failure = RepositoryError::Local(LocalStoreError::FileWrite("ro".into()));
        let mut builder = FixtureBuilder::authenticated();
        builder.repository.delete_all_local_answer = Err(purge_failure.clone());
        let fx = builder.build();
        assert_eq!(
            fx.orchestrator
                .revoke_charge_items_consent(&fx.profile_id)
                .await,
            RevokeResult::Error(RevokeError::Repository(purge_failure))
        );
    }

    #[tokio::test]
    async fn revoke_when_not_authenticated_does_not_reach_registry() {
        let fx = FixtureBuilder::unauthenticated().build();

        assert_eq!(
            fx.orchestrator
                .revoke_charge_items_consent(&fx.profile_id)
                .await,
            RevokeResult::Error(RevokeError::NotAuthenticated)
        );
        assert_eq!(fx.registry_calls(), 0);
    }

    // -- delete ----------------------------------------------------------------

    #[tokio::test]
    async fn delete_maps_repository_answers() {
        let item = ChargeItem::from(sparse("abc1"));

        let fx = FixtureBuilder::authenticated().build();
        assert_eq!(
            fx.orchestrator.delete_charge_item(&item, &fx.profile_id).await,
            DeleteResult::Success
        );

        let mut builder = FixtureBuilder::authenticated();
        builder.repository.delete_answer = Ok(false);
        let fx = builder.build();
        assert_eq!(
            fx.orchestrator.delete_charge_item(&item, &fx.profile_id).await,
            DeleteResult::Error(DeleteError::Unexpected(None))
        );

        let failure = RepositoryError::Remote(RemoteError::NotFound);
        let mut builder = FixtureBuilder::authenticated();
        builder.repository.delete_answer = Err(failure.clone());
        let fx = builder.build();
        assert_eq!(
            fx.orchestrator.delete_charge_item(&item, &fx.profile_id).await,
            DeleteResult::Error(DeleteError::Unexpected(Some(failure)))
        );
    }

    #[tokio::test]
    async fn delete_short_circuits_when_not_authenticated() {
        let fx = FixtureBuilder::unauthenticated().build();
        let item = ChargeItem::from(sparse("abc1"));

        assert_eq!(
            fx.orchestrator.delete_charge_item(&item, &fx.profile_id).await,
            DeleteResult::NotAuthenticated
        );
        assert_eq!(fx.registry_calls(), 0);
        assert_eq!(fx.repository_calls(), 0);
    }

    #[tokio::test]
    async fn gate_failure_is_reported_by_every_guarded_workflow() {
        let mut builder = FixtureBuilder::authenticated();
        builder.gate.authenticated = Err(AuthError::Timeout);
        let fx = builder.build();
        let item = ChargeItem::from(sparse("abc1"));

        assert_eq!(
            fx.orchestrator.check_for_consent(&fx.profile_id).await,
            ConsentCheckResult::Error(FetchError::Auth(AuthError::Timeout))
        );
        assert_eq!(
            fx.orchestrator
                .revoke_charge_items_consent(&fx.profile_id)
                .await,
            RevokeResult::Error(RevokeError::Auth(AuthError::Timeout))
        );
        assert_eq!(
            fx.orchestrator.delete_charge_item(&item, &fx.profile_id).await,
            DeleteResult::Error(DeleteError::Auth(AuthError::Timeout))
        );
        assert_eq!(fx.registry_calls(), 0);
        assert_eq!(fx.repository_calls(), 0);
    }
}
