//! # API REST
//!
//! REST API for CHRG.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, API keys)
//!
//! Workflows run through [`ChargeItemOrchestrator`]; profile and session administration goes to
//! the [`InProcessBackend`] directly.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod dto;
pub mod health;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrg_core::{
    BackendError, ChargeItem, ChargeItemOrchestrator, ChargeItemRepository, DeleteResult,
    FetchError, FetchResult, InProcessBackend, InsuranceId, NonEmptyText, Profile, ProfileId,
    SessionProvider, SparseChargeItem,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use auth::{api_key_from_headers, validate_api_key};
use dto::{
    ChargeItemDto, CreateProfileReq, FetchQuery, IntoOutcome, OutcomeRes, OutcomeResponse,
    ProfileRes, SeedChargeItemsReq, SeedChargeItemsRes,
};
use health::{HealthRes, HealthService};

type ApiError = (StatusCode, &'static str);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    backend: InProcessBackend,
    orchestrator: ChargeItemOrchestrator<InProcessBackend>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    /// `api_key` guards the backend-administration routes; without one they always refuse.
    pub fn new(backend: InProcessBackend, api_key: Option<String>) -> Self {
        Self {
            orchestrator: ChargeItemOrchestrator::new(backend.clone()),
            backend,
            api_key: api_key.map(Arc::from),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_profile,
        get_profile,
        complete_login,
        logout,
        authenticate,
        check_consent,
        grant_consent,
        revoke_consent,
        fetch_charge_items,
        fetch_local_charge_items,
        delete_charge_item,
        seed_charge_items,
    ),
    components(schemas(
        HealthRes,
        CreateProfileReq,
        ProfileRes,
        ChargeItemDto,
        OutcomeRes,
        SeedChargeItemsReq,
        SeedChargeItemsRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profiles", post(create_profile))
        .route("/profiles/:id", get(get_profile))
        .route("/profiles/:id/session", post(complete_login).delete(logout))
        .route("/profiles/:id/authenticate", post(authenticate))
        .route(
            "/profiles/:id/consent",
            get(check_consent)
                .post(grant_consent)
                .delete(revoke_consent),
        )
        .route("/profiles/:id/charge-items", get(fetch_charge_items))
        .route(
            "/profiles/:id/charge-items/local",
            get(fetch_local_charge_items),
        )
        .route(
            "/profiles/:id/charge-items/:item_id",
            axum::routing::delete(delete_charge_item),
        )
        .route(
            "/backend/profiles/:id/charge-items",
            post(seed_charge_items),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_profile_id(id: &str) -> Result<ProfileId, ApiError> {
    ProfileId::parse(id).map_err(|_| (StatusCode::BAD_REQUEST, "Invalid profile id"))
}

/// Parses the path id and checks the profile exists.
async fn known_profile(state: &AppState, id: &str) -> Result<(ProfileId, Profile), ApiError> {
    let profile_id = parse_profile_id(id)?;
    let profile = state
        .backend
        .profile(&profile_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "Profile not found"))?;
    Ok((profile_id, profile))
}

fn backend_rejection(err: BackendError) -> ApiError {
    match err {
        BackendError::UnknownProfile(_) => (StatusCode::NOT_FOUND, "Profile not found"),
        BackendError::MissingInsuranceId(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Profile has no insurance id",
        ),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/profiles",
    request_body = CreateProfileReq,
    responses(
        (status = 201, description = "Profile registered", body = ProfileRes),
        (status = 400, description = "Invalid name or insurance id")
    )
)]
#[axum::debug_handler]
async fn create_profile(
    State(state): State<AppState>,
    Json(req): Json<CreateProfileReq>,
) -> Result<(StatusCode, Json<ProfileRes>), ApiError> {
    let name = req
        .name
        .map(NonEmptyText::new)
        .transpose()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid name"))?;
    let insurance_id = req
        .insurance_id
        .map(InsuranceId::parse)
        .transpose()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid insurance id"))?;

    let profile = state.backend.register_profile(name, insurance_id).await;
    Ok((StatusCode::CREATED, Json(ProfileRes::new(&profile, false))))
}

#[utoipa::path(
    get,
    path = "/profiles/{id}",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Profile", body = ProfileRes),
        (status = 404, description = "Profile not found")
    )
)]
#[axum::debug_handler]
async fn get_profile(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ProfileRes>, ApiError> {
    let (profile_id, profile) = known_profile(&state, &id).await?;
    let authenticated = state.backend.is_authenticated(&profile_id).await;
    Ok(Json(ProfileRes::new(&profile, authenticated)))
}

#[utoipa::path(
    post,
    path = "/profiles/{id}/session",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Interactive login completed", body = ProfileRes),
        (status = 404, description = "Profile not found")
    )
)]
#[axum::debug_handler]
async fn complete_login(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ProfileRes>, ApiError> {
    let (profile_id, profile) = known_profile(&state, &id).await?;
    state
        .backend
        .complete_login(&profile_id)
        .await
        .map_err(backend_rejection)?;
    Ok(Json(ProfileRes::new(&profile, true)))
}

#[utoipa::path(
    delete,
    path = "/profiles/{id}/session",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Logged out", body = ProfileRes),
        (status = 404, description = "Profile not found")
    )
)]
#[axum::debug_handler]
async fn logout(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ProfileRes>, ApiError> {
    let (profile_id, profile) = known_profile(&state, &id).await?;
    state
        .backend
        .logout(&profile_id)
        .await
        .map_err(backend_rejection)?;
    Ok(Json(ProfileRes::new(&profile, false)))
}

#[utoipa::path(
    post,
    path = "/profiles/{id}/authenticate",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "success or further_authentication_required", body = OutcomeRes),
        (status = 502, description = "Authentication gate failed", body = OutcomeRes)
    )
)]
#[axum::debug_handler]
async fn authenticate(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<OutcomeResponse, ApiError> {
    let (profile_id, _) = known_profile(&state, &id).await?;
    Ok(state.orchestrator.authenticate(&profile_id).await.into_outcome())
}

#[utoipa::path(
    get,
    path = "/profiles/{id}/consent",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "granted or not_granted", body = OutcomeRes),
        (status = 401, description = "Not authenticated", body = OutcomeRes),
        (status = 502, description = "Collaborator failed", body = OutcomeRes)
    )
)]
#[axum::debug_handler]
async fn check_consent(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<OutcomeResponse, ApiError> {
    let (profile_id, _) = known_profile(&state, &id).await?;
    Ok(state
        .orchestrator
        .check_for_consent(&profile_id)
        .await
        .into_outcome())
}

#[utoipa::path(
    post,
    path = "/profiles/{id}/consent",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Consent granted", body = OutcomeRes),
        (status = 401, description = "Not authenticated", body = OutcomeRes),
        (status = 409, description = "Consent already granted", body = OutcomeRes),
        (status = 502, description = "Collaborator failed", body = OutcomeRes)
    )
)]
#[axum::debug_handler]
async fn grant_consent(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<OutcomeResponse, ApiError> {
    let (profile_id, _) = known_profile(&state, &id).await?;
    Ok(state
        .orchestrator
        .grant_charge_items_consent(&profile_id)
        .await
        .into_outcome())
}

#[utoipa::path(
    delete,
    path = "/profiles/{id}/consent",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Revoked (or nothing to revoke)", body = OutcomeRes),
        (status = 401, description = "Not authenticated", body = OutcomeRes),
        (status = 502, description = "Collaborator failed", body = OutcomeRes)
    )
)]
#[axum::debug_handler]
async fn revoke_consent(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<OutcomeResponse, ApiError> {
    let (profile_id, _) = known_profile(&state, &id).await?;
    Ok(state
        .orchestrator
        .revoke_charge_items_consent(&profile_id)
        .await
        .into_outcome())
}

#[utoipa::path(
    get,
    path = "/profiles/{id}/charge-items",
    params(("id" = String, Path, description = "Profile id"), FetchQuery),
    responses(
        (status = 200, description = "Synchronized charge items, newest first", body = OutcomeRes),
        (status = 401, description = "Not authenticated", body = OutcomeRes),
        (status = 403, description = "Consent not granted", body = OutcomeRes),
        (status = 502, description = "Collaborator failed", body = OutcomeRes)
    )
)]
#[axum::debug_handler]
async fn fetch_charge_items(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<FetchQuery>,
) -> Result<OutcomeResponse, ApiError> {
    let (profile_id, _) = known_profile(&state, &id).await?;
    let result = if query.assume_consent {
        state
            .orchestrator
            .fetch_charge_items_assuming_consent_granted(&profile_id)
            .await
    } else {
        state.orchestrator.fetch_charge_items(&profile_id).await
    };
    Ok(result.into_outcome())
}

#[utoipa::path(
    get,
    path = "/profiles/{id}/charge-items/local",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Locally cached charge items, newest first", body = OutcomeRes),
        (status = 502, description = "Local cache unreadable", body = OutcomeRes)
    )
)]
#[axum::debug_handler]
async fn fetch_local_charge_items(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<OutcomeResponse, ApiError> {
    let (profile_id, _) = known_profile(&state, &id).await?;
    Ok(state
        .orchestrator
        .fetch_local_charge_items(&profile_id)
        .await
        .into_outcome())
}

#[utoipa::path(
    delete,
    path = "/profiles/{id}/charge-items/{item_id}",
    params(
        ("id" = String, Path, description = "Profile id"),
        ("item_id" = String, Path, description = "Charge item identifier")
    ),
    responses(
        (status = 200, description = "Charge item deleted", body = OutcomeRes),
        (status = 401, description = "Not authenticated", body = OutcomeRes),
        (status = 404, description = "Charge item unknown locally and remotely"),
        (status = 502, description = "Collaborator failed", body = OutcomeRes)
    )
)]
#[axum::debug_handler]
async fn delete_charge_item(
    State(state): State<AppState>,
    AxumPath((id, item_id)): AxumPath<(String, String)>,
) -> Result<OutcomeResponse, ApiError> {
    let (profile_id, _) = known_profile(&state, &id).await?;
    if !state.backend.is_authenticated(&profile_id).await {
        return Ok(DeleteResult::NotAuthenticated.into_outcome());
    }

    let cached = match state.orchestrator.fetch_local_charge_items(&profile_id).await {
        FetchResult::Success(items) => items.into_iter().find(|i| i.identifier == item_id),
        other => return Ok(other.into_outcome()),
    };
    let item = match cached {
        Some(item) => Some(item),
        None => match state
            .backend
            .user_session(&profile_id)
            .charge_items
            .load_remote()
            .await
        {
            Ok(items) => items.into_iter().find(|i| i.identifier == item_id),
            Err(err) => return Ok(FetchResult::Error(FetchError::Repository(err)).into_outcome()),
        },
    };
    let item = item.ok_or((StatusCode::NOT_FOUND, "Charge item not found"))?;

    Ok(state
        .orchestrator
        .delete_charge_item(&ChargeItem::from(item), &profile_id)
        .await
        .into_outcome())
}

#[utoipa::path(
    post,
    path = "/backend/profiles/{id}/charge-items",
    params(("id" = String, Path, description = "Profile id")),
    request_body = SeedChargeItemsReq,
    responses(
        (status = 200, description = "Remote charge items stored", body = SeedChargeItemsRes),
        (status = 400, description = "Invalid charge item"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "Profile not found"),
        (status = 422, description = "Profile has no insurance id")
    )
)]
#[axum::debug_handler]
async fn seed_charge_items(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<SeedChargeItemsReq>,
) -> Result<Json<SeedChargeItemsRes>, ApiError> {
    validate_api_key(state.api_key.as_deref(), api_key_from_headers(&headers)).map_err(|err| {
        tracing::warn!(error = %err, "backend request rejected");
        (err.status(), err.message())
    })?;

    let profile_id = parse_profile_id(&id)?;
    let items = req
        .items
        .into_iter()
        .map(SparseChargeItem::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            tracing::debug!(error = %err, "invalid charge item");
            (StatusCode::BAD_REQUEST, "Invalid charge item")
        })?;

    let seeded = state
        .backend
        .seed_remote_charge_items(&profile_id, items)
        .await
        .map_err(backend_rejection)?;
    Ok(Json(SeedChargeItemsRes { seeded }))
}
