//! Request and response bodies, and the mapping of workflow outcomes onto HTTP.
//!
//! Every workflow answers with an [`OutcomeRes`]. The status code follows the outcome:
//! `200` for outcomes the caller branches on, `401` when the session is not authenticated,
//! `403` when the charge-item consent is missing, `409` on a consent conflict and `502` when a
//! collaborator failed.

use axum::http::StatusCode;
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrg_core::{
    AuthenticateResult, BillingPayload, ConsentCheckResult, DeleteResult, FetchResult,
    GrantResult, Profile, RecoveryHint, RevokeError, RevokeResult, SparseChargeItem,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DtoError {
    #[error("payload is not valid base64: {0}")]
    Payload(String),
    #[error("entered_date is not an RFC 3339 timestamp: {0}")]
    EnteredDate(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChargeItemDto {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Billing payload, standard base64.
    pub payload: String,
    /// RFC 3339 timestamp.
    pub entered_date: String,
    #[serde(default)]
    pub is_read: bool,
}

impl From<&SparseChargeItem> for ChargeItemDto {
    fn from(item: &SparseChargeItem) -> Self {
        Self {
            identifier: item.identifier.clone(),
            task_id: item.task_id.clone(),
            payload: STANDARD.encode(item.payload.as_bytes()),
            entered_date: item.entered_date.to_rfc3339(),
            is_read: item.is_read,
        }
    }
}

impl TryFrom<ChargeItemDto> for SparseChargeItem {
    type Error = DtoError;

    fn try_from(dto: ChargeItemDto) -> Result<Self, Self::Error> {
        let payload = STANDARD
            .decode(dto.payload.as_bytes())
            .map_err(|e| DtoError::Payload(e.to_string()))?;
        let entered_date = DateTime::parse_from_rfc3339(&dto.entered_date)
            .map_err(|e| DtoError::EnteredDate(e.to_string()))?;

        Ok(SparseChargeItem {
            identifier: dto.identifier,
            task_id: dto.task_id,
            payload: BillingPayload::new(payload),
            entered_date,
            is_read: dto.is_read,
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct CreateProfileReq {
    #[serde(default)]
    pub name: Option<String>,
    /// Insurance number (KVNR): one uppercase letter followed by nine digits.
    #[serde(default)]
    pub insurance_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ProfileRes {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance_id: Option<String>,
    pub authenticated: bool,
}

impl ProfileRes {
    pub fn new(profile: &Profile, authenticated: bool) -> Self {
        Self {
            id: profile.id.to_string(),
            name: profile.name.as_ref().map(|name| name.to_string()),
            insurance_id: profile.insurance_id.as_ref().map(|id| id.to_string()),
            authenticated,
        }
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SeedChargeItemsReq {
    pub items: Vec<ChargeItemDto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct SeedChargeItemsRes {
    pub seeded: usize,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FetchQuery {
    /// Skip the consent lookup, for callers that just granted it.
    #[serde(default)]
    pub assume_consent: bool,
}

/// Outcome of a workflow call.
#[derive(Clone, Debug, Default, Serialize, ToSchema)]
pub struct OutcomeRes {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ChargeItemDto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `acknowledge`, `retry` or `reauthenticate`, when the failure suggests one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<String>,
}

pub type OutcomeResponse = (StatusCode, Json<OutcomeRes>);

impl OutcomeRes {
    fn named(outcome: &str) -> Self {
        Self {
            outcome: outcome.into(),
            ..Self::default()
        }
    }

    fn failed(error: impl ToString, recovery: Option<RecoveryHint>) -> Self {
        Self {
            outcome: "error".into(),
            error: Some(error.to_string()),
            recovery: recovery.map(|hint| recovery_name(hint).into()),
            ..Self::default()
        }
    }

    pub fn with(self, status: StatusCode) -> OutcomeResponse {
        (status, Json(self))
    }
}

fn recovery_name(hint: RecoveryHint) -> &'static str {
    match hint {
        RecoveryHint::Acknowledge => "acknowledge",
        RecoveryHint::Retry => "retry",
        RecoveryHint::Reauthenticate => "reauthenticate",
    }
}

fn not_authenticated() -> OutcomeResponse {
    OutcomeRes::named("not_authenticated").with(StatusCode::UNAUTHORIZED)
}

/// Maps a workflow outcome onto a status code and body.
pub trait IntoOutcome {
    fn into_outcome(self) -> OutcomeResponse;
}

impl IntoOutcome for FetchResult {
    fn into_outcome(self) -> OutcomeResponse {
        match self {
            FetchResult::Success(items) => OutcomeRes {
                items: Some(items.iter().map(ChargeItemDto::from).collect()),
                ..OutcomeRes::named("success")
            }
            .with(StatusCode::OK),
            FetchResult::NotAuthenticated => not_authenticated(),
            FetchResult::ConsentNotGranted => {
                OutcomeRes::named("consent_not_granted").with(StatusCode::FORBIDDEN)
            }
            FetchResult::Error(err) => {
                OutcomeRes::failed(&err, err.recovery_hint()).with(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl IntoOutcome for AuthenticateResult {
    fn into_outcome(self) -> OutcomeResponse {
        match self {
            AuthenticateResult::Success => OutcomeRes::named("success").with(StatusCode::OK),
            AuthenticateResult::FurtherAuthenticationRequired => {
                OutcomeRes::named("further_authentication_required").with(StatusCode::OK)
            }
            AuthenticateResult::Error(err) => {
                OutcomeRes::failed(err, None).with(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl IntoOutcome for ConsentCheckResult {
    fn into_outcome(self) -> OutcomeResponse {
        match self {
            ConsentCheckResult::Granted => OutcomeRes::named("granted").with(StatusCode::OK),
            ConsentCheckResult::NotGranted => {
                OutcomeRes::named("not_granted").with(StatusCode::OK)
            }
            ConsentCheckResult::NotAuthenticated => not_authenticated(),
            ConsentCheckResult::Error(err) => {
                OutcomeRes::failed(&err, err.recovery_hint()).with(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl IntoOutcome for GrantResult {
    fn into_outcome(self) -> OutcomeResponse {
        match self {
            GrantResult::Success => OutcomeRes::named("success").with(StatusCode::OK),
            GrantResult::Conflict => OutcomeRes::named("conflict").with(StatusCode::CONFLICT),
            GrantResult::NotAuthenticated => not_authenticated(),
            GrantResult::Error(err) => {
                OutcomeRes::failed(&err, err.recovery_hint()).with(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl IntoOutcome for RevokeResult {
    fn into_outcome(self) -> OutcomeResponse {
        match self {
            RevokeResult::Success(revoked) => OutcomeRes {
                revoked: Some(revoked),
                ..OutcomeRes::named("success")
            }
            .with(StatusCode::OK),
            RevokeResult::Error(RevokeError::NotAuthenticated) => not_authenticated(),
            RevokeResult::Error(err) => {
                OutcomeRes::failed(&err, err.recovery_hint()).with(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl IntoOutcome for DeleteResult {
    fn into_outcome(self) -> OutcomeResponse {
        match self {
            DeleteResult::Success => OutcomeRes::named("success").with(StatusCode::OK),
            DeleteResult::NotAuthenticated => not_authenticated(),
            DeleteResult::Error(err) => OutcomeRes::failed(err, None).with(StatusCode::BAD_GATEWAY),
        }
    }
}
