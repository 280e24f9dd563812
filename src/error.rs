//! # Error Handling
//!
//! This module defines the application-wide error taxonomy and converts each
//! variant into an HTTP response.
//!
//! The taxonomy separates client mistakes (malformed requests, unknown
//! ceremonies) from terminal protocol failures (verification rejections,
//! duplicate credentials) and from transient server trouble (storage errors,
//! which a client may safely retry from ceremony start). Metadata-lookup
//! failures are deliberately absent here: they never fail a ceremony and are
//! handled inside the metadata module.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use webauthn_rs::prelude::WebauthnError;

/// Application-wide error type.
///
/// Each variant corresponds to one category of failure. The `#[from]`
/// conversions let the `?` operator lift library errors (sqlx, webauthn-rs,
/// serde_json) into this type at the call site.
#[derive(Error, Debug)]
pub enum AppError {
    /// Repository or pending-store unavailable. Transient: the whole ceremony
    /// can be retried from start.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The verifier rejected the ceremony (signature mismatch, challenge
    /// mismatch, attestation policy violation, ...). Terminal for this
    /// ceremony; the same challenge must not be retried.
    #[error("Ceremony verification failed: {0}")]
    Verification(#[from] WebauthnError),

    /// Serialization of ceremony state or credential data failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Required fields missing or invalid. Always a client error.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Authentication start named a user with no registrations.
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Finish call with a request id that is absent, expired, or already
    /// consumed. All three cases are indistinguishable to the caller.
    #[error("No such ceremony in progress: {0}")]
    UnknownCeremony(String),

    /// Registration attempted to store a credential id that already exists,
    /// for any user.
    #[error("Credential already registered: {0}")]
    DuplicateCredential(String),

    /// The authenticator reported a signature counter lower than the stored
    /// one. This signals a possibly cloned credential and is surfaced, never
    /// silently accepted.
    #[error("Signature counter regression for credential {credential_id}: stored {stored}, received {received}")]
    SignatureCounterRegression {
        credential_id: String,
        stored: i64,
        received: i64,
    },

    /// A management lookup (nickname update, targeted removal) matched no
    /// registration.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected failure that shouldn't normally occur.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convert `AppError` into an HTTP response.
///
/// Handlers return `Result<T, AppError>`; this impl picks the status code and
/// a client-safe message per variant. Detail that could leak internals is
/// logged server-side instead of being sent to the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            AppError::Verification(e) => {
                tracing::error!("Ceremony verification failed: {:?}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "Ceremony verification failed".to_string(),
                )
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Serialization error".to_string(),
                )
            }
            // For these, the message itself is safe to show.
            AppError::MalformedRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::UnknownUser(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::UnknownCeremony(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::DuplicateCredential(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::SignatureCounterRegression { .. } => {
                tracing::warn!("{}", self);
                (StatusCode::CONFLICT, self.to_string())
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Convenience alias for results using `AppError`.
pub type AppResult<T> = Result<T, AppError>;
