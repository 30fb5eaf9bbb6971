//! HTTP error mapping. Every error body is `{ "message": ... }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use sv_core::{MessageBody, VaultError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, (*msg).to_string()),
            ApiError::Vault(VaultError::NotFound) => {
                (StatusCode::NOT_FOUND, "Item not found".to_string())
            }
            ApiError::Vault(VaultError::Unauthorized(msg)) => {
                (StatusCode::UNAUTHORIZED, msg.clone())
            }
            ApiError::Vault(VaultError::MalformedEnvelope(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::Vault(VaultError::Server { status, message }) => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                message.clone(),
            ),
            ApiError::Vault(e) => {
                error!("request failed: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(MessageBody::new(message))).into_response()
    }
}
