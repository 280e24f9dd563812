use crate::ceremony::types::*;
use crate::ceremony::{authentication, registration};
use crate::error::AppResult;
use crate::handlers::credentials::credential_json;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

// Registration ceremony endpoints

pub async fn register_start(
    State(state): State<AppState>,
    Json(req): Json<RegistrationStartRequest>,
) -> AppResult<Json<Value>> {
    let started = registration::start_registration(&state, &req).await?;

    Ok(Json(json!({
        "request_id": started.request_id,
        "challenge": started.challenge,
    })))
}

pub async fn register_finish(
    State(state): State<AppState>,
    Json(req): Json<RegistrationFinishRequest>,
) -> AppResult<Json<Value>> {
    let row = registration::finish_registration(&state, &req).await?;

    Ok(Json(json!({
        "success": true,
        "credential": credential_json(&row)?,
    })))
}

// Authentication ceremony endpoints

pub async fn authenticate_start(
    State(state): State<AppState>,
    Json(req): Json<AuthenticationStartRequest>,
) -> AppResult<Json<Value>> {
    let started = authentication::start_authentication(&state, req.username.as_deref()).await?;

    Ok(Json(json!({
        "request_id": started.request_id,
        "challenge": started.challenge,
    })))
}

pub async fn authenticate_finish(
    State(state): State<AppState>,
    Json(req): Json<AuthenticationFinishRequest>,
) -> AppResult<Json<Value>> {
    let outcome = authentication::finish_authentication(&state, &req).await?;

    Ok(Json(json!({
        "success": true,
        "username": outcome.username,
        "user_id": outcome.user_id,
        "credential_id": outcome.credential_id,
        "sign_count": outcome.sign_count,
        "counter_warning": outcome.counter_warning,
    })))
}
