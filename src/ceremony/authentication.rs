//! # Authentication Ceremony
//!
//! Two assertion flows share this module: the named flow (challenge scoped
//! to a known user's credentials) and the usernameless flow (discoverable
//! credentials, where the authenticator tells us who is signing in). Both
//! park their verifier state in the request store between start and finish.

use crate::ceremony::store::{self, CeremonyKind};
use crate::ceremony::types::AuthenticationFinishRequest;
use crate::db::{credentials, users};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use webauthn_rs::prelude::*;

/// Verifier state parked between start and finish, tagged by flow.
#[derive(Debug, Serialize, Deserialize)]
enum AuthenticationCeremonyState {
    Named {
        username: String,
        authentication: PasskeyAuthentication,
    },
    Discoverable {
        authentication: DiscoverableAuthentication,
    },
}

/// A started authentication: the request id to echo back at finish, plus
/// the challenge options for `navigator.credentials.get()`.
#[derive(Debug)]
pub struct StartedAuthentication {
    pub request_id: String,
    pub challenge: RequestChallengeResponse,
}

/// The result of a finished authentication.
///
/// `counter_warning` carries a signature-counter bookkeeping failure
/// (storage trouble or a counter regression). The ceremony itself succeeded;
/// the warning is reported separately instead of being conflated with
/// ceremony failure.
#[derive(Debug)]
pub struct AuthenticationOutcome {
    pub username: String,
    pub user_id: String,
    pub credential_id: String,
    pub sign_count: u32,
    pub counter_warning: Option<String>,
}

/// Start an authentication ceremony.
///
/// With a username: the user must have registrations (`UnknownUser`
/// otherwise) and the challenge is scoped to their credentials. Without one:
/// the existence check is skipped entirely and a discoverable-credential
/// challenge is issued.
pub async fn start_authentication(
    state: &AppState,
    username: Option<&str>,
) -> AppResult<StartedAuthentication> {
    let (ceremony, challenge) = match username {
        Some(name) => {
            if !credentials::user_exists(&state.db, name).await? {
                return Err(AppError::UnknownUser(name.to_string()));
            }

            let passkeys = passkeys_for_username(state, name).await?;
            let (rcr, auth_state) = state.webauthn.start_passkey_authentication(&passkeys)?;
            (
                AuthenticationCeremonyState::Named {
                    username: name.to_string(),
                    authentication: auth_state,
                },
                rcr,
            )
        }
        None => {
            let (rcr, auth_state) = state.webauthn.start_discoverable_authentication()?;
            (
                AuthenticationCeremonyState::Discoverable {
                    authentication: auth_state,
                },
                rcr,
            )
        }
    };

    let request_id = store::generate_request_id();
    store::put(
        &state.db,
        CeremonyKind::Authentication,
        &request_id,
        username,
        &serde_json::to_vec(&ceremony)?,
        state.ceremony_ttl,
    )
    .await?;

    tracing::debug!(
        "Started authentication ceremony {} (username: {:?})",
        request_id,
        username
    );

    Ok(StartedAuthentication {
        request_id,
        challenge,
    })
}

/// Finish an authentication ceremony.
///
/// Consumes the pending request exactly once, verifies the assertion, then
/// applies the reported signature counter. Counter bookkeeping failures are
/// logged and returned as a warning on the successful outcome.
///
/// ## Errors
/// - `UnknownCeremony`: request id absent, expired, or already consumed
/// - `Verification`: the verifier rejected the assertion
pub async fn finish_authentication(
    state: &AppState,
    req: &AuthenticationFinishRequest,
) -> AppResult<AuthenticationOutcome> {
    let pending = store::consume(&state.db, CeremonyKind::Authentication, &req.request_id)
        .await?
        .ok_or_else(|| AppError::UnknownCeremony(req.request_id.clone()))?;
    let ceremony: AuthenticationCeremonyState = serde_json::from_slice(&pending.state)?;

    let credential: PublicKeyCredential = serde_json::from_value(req.credential.clone())
        .map_err(|e| AppError::MalformedRequest(format!("Failed to decode assertion: {}", e)))?;

    let (result, user) = match ceremony {
        AuthenticationCeremonyState::Named {
            username,
            authentication,
        } => {
            let result = state
                .webauthn
                .finish_passkey_authentication(&credential, &authentication)?;
            let user = users::find_by_username(&state.db, &username)
                .await?
                .ok_or_else(|| AppError::UnknownUser(username.clone()))?;
            (result, user)
        }
        AuthenticationCeremonyState::Discoverable { authentication } => {
            // The authenticator reports whose credential signed; map that
            // handle back to a user before verifying against their keys.
            let (user_uuid, _cred_id) =
                state.webauthn.identify_discoverable_authentication(&credential)?;
            let user = match users::find_by_id(&state.db, &user_uuid.to_string()).await {
                Ok(user) => user,
                Err(AppError::NotFound(_)) => {
                    return Err(AppError::UnknownUser(format!("user handle {}", user_uuid)))
                }
                Err(e) => return Err(e),
            };

            let passkeys = passkeys_for_username(state, &user.username).await?;
            let discoverable: Vec<DiscoverableKey> =
                passkeys.iter().map(DiscoverableKey::from).collect();
            let result = state.webauthn.finish_discoverable_authentication(
                &credential,
                authentication,
                &discoverable,
            )?;
            (result, user)
        }
    };

    let credential_id = BASE64_URL_SAFE_NO_PAD.encode(result.cred_id());

    // Bookkeeping failure is secondary: the assertion already verified, so
    // report the problem alongside the successful outcome instead of
    // failing the ceremony.
    let counter_warning = match apply_authentication_result(state, &credential_id, &result).await {
        Ok(()) => None,
        Err(e) => {
            tracing::error!(
                "Failed to update signature count for user '{}', credential {}: {}",
                user.username,
                credential_id,
                e
            );
            Some(e.to_string())
        }
    };

    tracing::info!(
        "Authenticated user '{}' with credential {}",
        user.username,
        credential_id
    );

    Ok(AuthenticationOutcome {
        username: user.username,
        user_id: user.id,
        credential_id,
        sign_count: result.counter(),
        counter_warning,
    })
}

/// Load and deserialize every stored passkey for a username.
async fn passkeys_for_username(state: &AppState, username: &str) -> AppResult<Vec<Passkey>> {
    let rows = credentials::registrations_by_username(&state.db, username).await?;
    rows.iter()
        .map(|row| serde_json::from_slice::<Passkey>(&row.passkey).map_err(AppError::from))
        .collect()
}

/// Fold the verifier's result into the stored credential: refreshed passkey
/// state, new signature counter, and last-used timestamp.
async fn apply_authentication_result(
    state: &AppState,
    credential_id: &str,
    result: &AuthenticationResult,
) -> AppResult<()> {
    let row = credentials::registration_by_credential_id(&state.db, credential_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Credential '{}' not found", credential_id)))?;

    let mut passkey: Passkey = serde_json::from_slice(&row.passkey)?;
    let _ = passkey.update_credential(result);
    let passkey_bytes = serde_json::to_vec(&passkey)?;

    credentials::apply_signature_count(
        &state.db,
        credential_id,
        i64::from(result.counter()),
        &passkey_bytes,
    )
    .await
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

    #[tokio::test]
    async fn named_start_for_unknown_user_fails() {
        let state = test_state().await;
        let err = start_authentication(&state, Some("nobody")).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn usernameless_start_skips_existence_check() {
        let state = test_state().await;

        // Empty repository, no username: the discoverable flow must still
        // hand out a challenge.
        let started = start_authentication(&state, None).await.unwrap();
        assert_eq!(started.request_id.len(), 43);

        let pending = store::consume(&state.db, CeremonyKind::Authentication, &started.request_id)
            .await
            .unwrap()
            .expect("ceremony parked");
        assert!(pending.username.is_none());
    }

    #[tokio::test]
    async fn finish_with_unknown_request_id_fails() {
        let state = test_state().await;
        let req = AuthenticationFinishRequest {
            request_id: "never-issued".to_string(),
            credential: serde_json::json!({}),
        };

        let err = finish_authentication(&state, &req).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownCeremony(_)));
    }

    #[tokio::test]
    async fn finish_twice_yields_unknown_ceremony_the_second_time() {
        let state = test_state().await;
        let started = start_authentication(&state, None).await.unwrap();

        // Consume once (simulating the winning finish call), then a second
        // finish with the same id must observe absence.
        store::consume(&state.db, CeremonyKind::Authentication, &started.request_id)
            .await
            .unwrap()
            .expect("first consume succeeds");

        let req = AuthenticationFinishRequest {
            request_id: started.request_id.clone(),
            credential: serde_json::json!({}),
        };
        let err = finish_authentication(&state, &req).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownCeremony(_)));
    }
}
