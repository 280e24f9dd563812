//! # Credential Management Handlers
//!
//! Listing, renaming, and removing registered credentials. These wrap the
//! credential repository directly; no ceremony is involved.

use crate::ceremony::types::UpdateNicknameRequest;
use crate::db::credentials;
use crate::db::models::CredentialRow;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

/// JSON shape of one registration, with the stored attestation JSON inlined
/// rather than double-encoded.
pub fn credential_json(row: &CredentialRow) -> AppResult<Value> {
    let attestation: Option<Value> = row
        .attestation
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(json!({
        "credential_id": row.credential_id,
        "user_id": row.user_id,
        "nickname": row.nickname,
        "sign_count": row.sign_count,
        "attestation": attestation,
        "created_at": row.created_at,
        "last_used_at": row.last_used_at,
        "last_updated_at": row.last_updated_at,
    }))
}

pub async fn list_registrations(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Value>> {
    let rows = credentials::registrations_by_username(&state.db, &username).await?;
    let registrations: Vec<Value> = rows
        .iter()
        .map(credential_json)
        .collect::<AppResult<_>>()?;

    Ok(Json(json!({ "registrations": registrations })))
}

pub async fn list_credential_ids(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Value>> {
    let ids = credentials::credential_ids_for_username(&state.db, &username).await?;

    // Credential descriptors, the shape allowCredentials wants.
    let descriptors: Vec<Value> = ids
        .into_iter()
        .map(|id| json!({ "type": "public-key", "id": id }))
        .collect();

    Ok(Json(json!({ "credentials": descriptors })))
}

pub async fn update_nickname(
    State(state): State<AppState>,
    Path((username, credential_id)): Path<(String, String)>,
    Json(req): Json<UpdateNicknameRequest>,
) -> AppResult<Json<Value>> {
    if req.nickname.trim().is_empty() {
        return Err(AppError::MalformedRequest(
            "nickname must not be empty".to_string(),
        ));
    }

    credentials::update_credential_nickname(&state.db, &username, &credential_id, &req.nickname)
        .await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn remove_registration(
    State(state): State<AppState>,
    Path((username, credential_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    // Look up first: removal of a credential that isn't there reports
    // success=false rather than an error.
    let removed = match credentials::registration_by_username_and_credential_id(
        &state.db,
        &username,
        &credential_id,
    )
    .await?
    {
        Some(_) => credentials::remove_registration(&state.db, &username, &credential_id).await?,
        None => false,
    };

    Ok(Json(json!({ "success": removed })))
}

pub async fn remove_all_registrations(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Value>> {
    let removed = credentials::remove_all_registrations(&state.db, &username).await?;

    Ok(Json(json!({ "success": true, "removed": removed })))
}
