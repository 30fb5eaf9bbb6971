//! Vault HTTP API.
//!
//! Routes:
//!   GET    /api/vault       - caller's envelopes, most recently updated first
//!   POST   /api/vault       - store a new envelope (201)
//!   PUT    /api/vault/{id}  - replace an owned envelope
//!   DELETE /api/vault/{id}  - delete an owned envelope
//!   GET    /healthz         - liveness
//!
//! Request and response bodies carry `encryptedData` and `iv` only.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{middleware, Json, Router};
use tower::ServiceBuilder;

use sv_core::{
    CipherEnvelope, IdempotencyKey, MessageBody, RecordId, WireRecord, IDEMPOTENCY_HEADER,
};
use sv_store::{check_health, EnvelopeStore, HealthReport};

use crate::auth::{Owner, TokenGate};
use crate::error::ApiError;
use crate::logging::log_request;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EnvelopeStore>,
    pub gate: Arc<dyn TokenGate>,
}

impl AppState {
    pub fn new(store: Arc<EnvelopeStore>, gate: Arc<dyn TokenGate>) -> Self {
        Self { store, gate }
    }
}

pub fn router(state: AppState) -> Router {
    let vault = Router::new()
        .route("/vault", get(list).post(create))
        .route("/vault/{id}", axum::routing::put(replace).delete(remove));

    Router::new()
        .nest("/api", vault)
        .route("/healthz", get(healthz))
        .layer(ServiceBuilder::new().layer(middleware::from_fn(log_request)))
        .with_state(state)
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<IdempotencyKey>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|k| !k.is_empty() && k.len() <= 255)
        .ok_or_else(|| ApiError::BadRequest("invalid Idempotency-Key header".into()))?;
    Ok(Some(IdempotencyKey(key.to_string())))
}

fn envelope(body: Result<Json<CipherEnvelope>, JsonRejection>) -> Result<CipherEnvelope, ApiError> {
    let Json(envelope) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if envelope.ciphertext.is_empty() || envelope.iv.is_empty() {
        return Err(ApiError::BadRequest(
            "encryptedData and iv are required".into(),
        ));
    }
    Ok(envelope)
}

async fn list(State(state): State<AppState>, Owner(owner): Owner) -> Json<Vec<WireRecord>> {
    Json(state.store.list_by_owner(&owner).await)
}

async fn create(
    State(state): State<AppState>,
    Owner(owner): Owner,
    headers: HeaderMap,
    body: Result<Json<CipherEnvelope>, JsonRejection>,
) -> Result<(StatusCode, Json<WireRecord>), ApiError> {
    let key = idempotency_key(&headers)?;
    let envelope = envelope(body)?;
    let record = state.store.create(&owner, envelope, key.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn replace(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<CipherEnvelope>, JsonRejection>,
) -> Result<Json<WireRecord>, ApiError> {
    let key = idempotency_key(&headers)?;
    let envelope = envelope(body)?;
    let record = state
        .store
        .replace(&owner, &RecordId(id), envelope, key.as_ref())
        .await?;
    Ok(Json(record))
}

async fn remove(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessageBody>, ApiError> {
    let key = idempotency_key(&headers)?;
    state
        .store
        .delete(&owner, &RecordId(id), key.as_ref())
        .await?;
    Ok(Json(MessageBody::new("Item deleted")))
}

async fn healthz(State(state): State<AppState>) -> Json<HealthReport> {
    Json(check_health(&state.store).await)
}
