//! # Registration Ceremony
//!
//! Server-side orchestration of credential creation. Registration is a
//! two-step process: start issues challenge options bound to a stable user
//! handle, finish verifies the authenticator's response and persists the
//! credential, enriched with attestation metadata when available.

use crate::ceremony::authenticator_data;
use crate::ceremony::store::{self, CeremonyKind};
use crate::ceremony::types::{RegistrationFinishRequest, RegistrationStartRequest};
use crate::db::models::{CredentialRow, User};
use crate::db::{credentials, users};
use crate::error::{AppError, AppResult};
use crate::metadata::{resolver, AttestationMetadata};
use crate::state::AppState;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use webauthn_rs::prelude::*;
use webauthn_rs_proto::ResidentKeyRequirement;

/// Default nickname for platform authenticators (Touch ID, Windows Hello).
const PLATFORM_NICKNAME: &str = "My Trusted Device";
/// Default nickname for everything else.
const SECURITY_KEY_NICKNAME: &str = "My Security Key";

/// Everything the finish step needs, serialized into the request store
/// between the two halves of the ceremony.
#[derive(Debug, Serialize, Deserialize)]
struct RegistrationCeremonyState {
    /// The identity the challenge options were bound to. Only persisted to
    /// the users table when the ceremony commits.
    user: User,

    /// The attachment the caller forced, if any. Kept for nickname
    /// derivation at finish.
    attachment: Option<AuthenticatorAttachment>,

    /// The verifier's challenge state.
    registration: PasskeyRegistration,
}

/// A started registration: the request id to echo back at finish, plus the
/// challenge options for `navigator.credentials.create()`.
#[derive(Debug)]
pub struct StartedRegistration {
    pub request_id: String,
    pub challenge: CreationChallengeResponse,
}

/// Start a registration ceremony.
///
/// Resolves the user handle (the stored one when the username is already
/// known, otherwise derived from the caller-supplied seed), asks the
/// verifier for challenge options with the requested authenticator-selection
/// criteria, and parks the ceremony state under a fresh request id.
///
/// ## Errors
/// - `MalformedRequest`: empty username/display name, undecodable uid seed,
///   or an unrecognized attachment value
pub async fn start_registration(
    state: &AppState,
    req: &RegistrationStartRequest,
) -> AppResult<StartedRegistration> {
    if req.username.trim().is_empty() {
        return Err(AppError::MalformedRequest(
            "username must not be empty".to_string(),
        ));
    }
    if req.display_name.trim().is_empty() {
        return Err(AppError::MalformedRequest(
            "display_name must not be empty".to_string(),
        ));
    }
    let attachment = resolve_authenticator_attachment(req.authenticator_attachment.as_deref())?;

    // Reuse the stored identity when the username is known, so every
    // credential of one username shares one handle. The seed only matters
    // the first time a username shows up.
    let user = match users::find_by_username(&state.db, &req.username).await? {
        Some(existing) => existing,
        None => User::new(
            derive_user_handle(&req.uid)?,
            req.username.clone(),
            req.display_name.clone(),
        ),
    };

    let user_uuid = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Internal(format!("Invalid stored user handle for '{}'", user.username)))?;

    // Existing credentials are excluded so the same authenticator cannot be
    // registered twice for this user.
    let existing = credentials::registrations_by_username(&state.db, &req.username).await?;
    let exclude: Option<Vec<CredentialID>> = if existing.is_empty() {
        None
    } else {
        Some(
            existing
                .iter()
                .filter_map(|row| {
                    BASE64_URL_SAFE_NO_PAD
                        .decode(&row.credential_id)
                        .ok()
                        .map(CredentialID::from)
                })
                .collect(),
        )
    };

    let (mut ccr, reg_state) = state.webauthn.start_passkey_registration(
        user_uuid,
        &user.username,
        &user.display_name,
        exclude,
    )?;

    // The verifier fills in its own selection defaults; overlay the
    // caller's requirements before handing the options to the client.
    if let Some(selection) = ccr.public_key.authenticator_selection.as_mut() {
        selection.authenticator_attachment = attachment;
        if req.require_resident_key {
            selection.require_resident_key = true;
            selection.resident_key = Some(ResidentKeyRequirement::Required);
        }
    }

    let request_id = store::generate_request_id();
    let ceremony = RegistrationCeremonyState {
        user,
        attachment,
        registration: reg_state,
    };
    store::put(
        &state.db,
        CeremonyKind::Registration,
        &request_id,
        Some(&req.username),
        &serde_json::to_vec(&ceremony)?,
        state.ceremony_ttl,
    )
    .await?;

    tracing::debug!(
        "Started registration ceremony {} for user '{}'",
        request_id,
        req.username
    );

    Ok(StartedRegistration {
        request_id,
        challenge: ccr,
    })
}

/// Finish a registration ceremony.
///
/// Consumes the pending request (exactly once - a replayed or expired
/// request id fails as `UnknownCeremony`), verifies the credential, resolves
/// attestation metadata best-effort, derives a nickname, and commits the
/// registration.
///
/// ## Errors
/// - `UnknownCeremony`: request id absent, expired, or already consumed
/// - `Verification`: the verifier rejected the credential
/// - `DuplicateCredential`: the credential id already exists
pub async fn finish_registration(
    state: &AppState,
    req: &RegistrationFinishRequest,
) -> AppResult<CredentialRow> {
    let pending = store::consume(&state.db, CeremonyKind::Registration, &req.request_id)
        .await?
        .ok_or_else(|| AppError::UnknownCeremony(req.request_id.clone()))?;
    let ceremony: RegistrationCeremonyState = serde_json::from_slice(&pending.state)?;

    let credential: RegisterPublicKeyCredential = serde_json::from_value(req.credential.clone())
        .map_err(|e| AppError::MalformedRequest(format!("Failed to decode credential: {}", e)))?;

    let passkey = state
        .webauthn
        .finish_passkey_registration(&credential, &ceremony.registration)?;

    // The verifier has already validated the attestation; we only read the
    // AAGUID and the starting counter back out of it.
    let attested =
        authenticator_data::parse_attestation_object(credential.response.attestation_object.as_ref())?;

    let metadata = resolve_metadata(state, attested.aaguid);
    let nickname = derive_nickname(metadata.as_ref(), ceremony.attachment);
    let attestation_json = metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let credential_id = BASE64_URL_SAFE_NO_PAD.encode(passkey.cred_id());
    let passkey_bytes = serde_json::to_vec(&passkey)?;

    let row = credentials::add_registration(
        &state.db,
        &ceremony.user,
        &credential_id,
        &passkey_bytes,
        i64::from(attested.sign_count),
        Some(&nickname),
        attestation_json.as_deref(),
    )
    .await?;

    tracing::info!(
        "Registered credential {} for user '{}' (nickname: {})",
        credential_id,
        ceremony.user.username,
        nickname
    );

    Ok(row)
}

/// Derive the stable user handle from the caller-supplied seed.
///
/// The seed is opaque client data of any length; hashing it into a v5 UUID
/// gives the verifier the fixed-width handle it requires while keeping the
/// derivation deterministic per seed.
fn derive_user_handle(seed: &str) -> AppResult<Uuid> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(seed.as_bytes())
        .map_err(|_| AppError::MalformedRequest("uid must be base64url".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::MalformedRequest(
            "uid must not be empty".to_string(),
        ));
    }
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &bytes))
}

/// Parse a requested attachment. Accepts "platform"/"cross-platform" in any
/// case, with `_` or `-` as the separator.
fn resolve_authenticator_attachment(
    value: Option<&str>,
) -> AppResult<Option<AuthenticatorAttachment>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().replace('_', "-").as_str() {
        "platform" => Ok(Some(AuthenticatorAttachment::Platform)),
        "cross-platform" => Ok(Some(AuthenticatorAttachment::CrossPlatform)),
        other => Err(AppError::MalformedRequest(format!(
            "unknown authenticator attachment '{}'",
            other
        ))),
    }
}

/// Pick the credential's initial nickname: the resolved metadata
/// description when there is one, else a default by requested attachment.
fn derive_nickname(
    metadata: Option<&AttestationMetadata>,
    attachment: Option<AuthenticatorAttachment>,
) -> String {
    if let Some(description) = metadata.and_then(|m| m.description.as_deref()) {
        return description.to_string();
    }
    match attachment {
        Some(AuthenticatorAttachment::Platform) => PLATFORM_NICKNAME.to_string(),
        _ => SECURITY_KEY_NICKNAME.to_string(),
    }
}

/// Best-effort metadata resolution. Failures are logged and absorbed; a
/// metadata problem never fails the ceremony.
fn resolve_metadata(state: &AppState, aaguid: Uuid) -> Option<AttestationMetadata> {
    let source = state.metadata.as_deref()?;
    match resolver::resolve(source, aaguid) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!("Attestation metadata lookup failed for {}: {}", aaguid, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn test_state() -> AppState {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations").run(&db).await.expect("migrations");

        let rp_origin = Url::parse("http://localhost:8080").expect("origin");
        let webauthn = Arc::new(
            WebauthnBuilder::new("localhost", &rp_origin)
                .expect("builder")
                .rp_name("Test RP")
                .build()
                .expect("webauthn"),
        );

        AppState {
            db,
            webauthn,
            metadata: None,
            ceremony_ttl: chrono::Duration::minutes(5),
        }
    }

    fn start_request(username: &str) -> RegistrationStartRequest {
        RegistrationStartRequest {
            username: username.to_string(),
            display_name: format!("{} Display", username),
            require_resident_key: true,
            authenticator_attachment: None,
            uid: "AAAA".to_string(),
        }
    }

    #[test]
    fn user_handle_derivation_is_deterministic() {
        let a = derive_user_handle("AAAA").unwrap();
        let b = derive_user_handle("AAAA").unwrap();
        let c = derive_user_handle("BBBB").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn user_handle_rejects_bad_seeds() {
        assert!(matches!(
            derive_user_handle("not base64url!!"),
            Err(AppError::MalformedRequest(_))
        ));
        assert!(matches!(
            derive_user_handle(""),
            Err(AppError::MalformedRequest(_))
        ));
    }

    #[test]
    fn attachment_parsing() {
        assert_eq!(
            resolve_authenticator_attachment(Some("platform")).unwrap(),
            Some(AuthenticatorAttachment::Platform)
        );
        assert_eq!(
            resolve_authenticator_attachment(Some("CROSS_PLATFORM")).unwrap(),
            Some(AuthenticatorAttachment::CrossPlatform)
        );
        assert_eq!(resolve_authenticator_attachment(None).unwrap(), None);
        assert!(matches!(
            resolve_authenticator_attachment(Some("quantum")),
            Err(AppError::MalformedRequest(_))
        ));
    }

    #[test]
    fn nickname_prefers_description_then_attachment() {
        let metadata = AttestationMetadata {
            aaguid: None,
            aaid: None,
            attachment_hints: vec![],
            icon: None,
            description: Some("YubiKey 5 NFC".to_string()),
            transports: vec![],
        };

        assert_eq!(
            derive_nickname(Some(&metadata), Some(AuthenticatorAttachment::Platform)),
            "YubiKey 5 NFC"
        );
        assert_eq!(
            derive_nickname(None, Some(AuthenticatorAttachment::Platform)),
            "My Trusted Device"
        );
        assert_eq!(
            derive_nickname(None, Some(AuthenticatorAttachment::CrossPlatform)),
            "My Security Key"
        );
        assert_eq!(derive_nickname(None, None), "My Security Key");
    }

    #[tokio::test]
    async fn start_validates_required_fields() {
        let state = test_state().await;

        let mut req = start_request("alice");
        req.username = "  ".to_string();
        assert!(matches!(
            start_registration(&state, &req).await,
            Err(AppError::MalformedRequest(_))
        ));

        let mut req = start_request("alice");
        req.uid = "???".to_string();
        assert!(matches!(
            start_registration(&state, &req).await,
            Err(AppError::MalformedRequest(_))
        ));
    }

    #[tokio::test]
    async fn start_issues_request_id_and_parks_state() {
        let state = test_state().await;
        let started = start_registration(&state, &start_request("alice"))
            .await
            .unwrap();

        assert_eq!(started.request_id.len(), 43);
        assert_eq!(started.challenge.public_key.user.name, "alice");

        let pending = store::consume(&state.db, CeremonyKind::Registration, &started.request_id)
            .await
            .unwrap()
            .expect("ceremony parked");
        assert_eq!(pending.username.as_deref(), Some("alice"));

        let parked: RegistrationCeremonyState = serde_json::from_slice(&pending.state).unwrap();
        assert_eq!(parked.user.username, "alice");
    }

    #[tokio::test]
    async fn finish_with_unknown_request_id_fails() {
        let state = test_state().await;
        let req = RegistrationFinishRequest {
            request_id: "never-issued".to_string(),
            credential: serde_json::json!({}),
        };

        let err = finish_registration(&state, &req).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownCeremony(_)));
    }
}
