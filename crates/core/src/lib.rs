//! # CHRG Core
//!
//! Core logic of the charge-item consent and synchronisation service.
//!
//! This crate contains:
//! - the consent data model and the deterministic consent identifier scheme
//! - the pure consent evaluator
//! - the [`ChargeItemOrchestrator`] workflows (authenticate, fetch, grant, revoke, delete)
//! - the file-backed local charge-item cache and the incremental syncing repository
//! - an in-process backend implementing the collaborator seams
//!
//! **No API concerns**: HTTP servers, API keys and request DTOs belong in `api-rest`.

pub mod backend;
pub mod charge_item;
pub mod config;
pub mod consent;
pub mod constants;
pub mod error;
pub mod evaluator;
pub mod orchestrator;
pub mod outcome;
pub mod profile;
pub mod repositories;
pub mod session;

pub use chrg_types::{InsuranceId, NonEmptyText, TextError};
pub use chrg_uuid::ShardableUuid;

pub use backend::{BackendError, InProcessBackend};
pub use charge_item::{BillingPayload, ChargeItem, ChargeItemDetails, SparseChargeItem};
pub use config::CoreConfig;
pub use consent::{Consent, ConsentCategory, ConsentScope, PolicyRule};
pub use error::{
    AuthError, LocalStoreError, RecoveryHint, RemoteError, RepositoryError, RepositoryResult,
};
pub use evaluator::{ConsentEvaluator, ConsentState};
pub use orchestrator::ChargeItemOrchestrator;
pub use outcome::{
    AuthenticateError, AuthenticateResult, ConsentCheckResult, DeleteError, DeleteResult,
    FetchError, FetchResult, GrantError, GrantResult, RevokeError, RevokeResult,
};
pub use profile::{Profile, ProfileId};
pub use session::{
    AuthenticationGate, ChargeItemRepository, ConsentRegistry, ProfileStore, SessionProvider,
    UserSession,
};
