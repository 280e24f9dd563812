//! # Credential Repository
//!
//! Durable store of registered credentials, consumed by the ceremony
//! orchestrator and by the assertion-verification path. All mutations are
//! applied transactionally per credential: a failed operation leaves nothing
//! behind, and racing mutations of the same credential are settled by the
//! database (the primary key for duplicate registrations, a guarded
//! compare for signature counters).
//!
//! ## Security Note
//! Only public keys are stored - private keys never leave the user's device.

use crate::db::models::{CredentialRow, User};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sqlx::SqlitePool;

/// All registrations for a username. Empty if the user is unknown.
pub async fn registrations_by_username(
    pool: &SqlitePool,
    username: &str,
) -> AppResult<Vec<CredentialRow>> {
    let rows = sqlx::query_as::<_, CredentialRow>(
        "SELECT c.* FROM credentials c
         JOIN users u ON u.id = c.user_id
         WHERE u.username = ?",
    )
    .bind(username)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Whether the username has at least one registered credential.
///
/// This is registration-backed on purpose: a user row kept around after
/// `remove_all_registrations` (to keep the handle stable) does not count as
/// an existing user for authentication.
pub async fn user_exists(pool: &SqlitePool, username: &str) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM credentials c
         JOIN users u ON u.id = c.user_id
         WHERE u.username = ?",
    )
    .bind(username)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// The credential ids (base64url) registered for a username.
pub async fn credential_ids_for_username(
    pool: &SqlitePool,
    username: &str,
) -> AppResult<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT c.credential_id FROM credentials c
         JOIN users u ON u.id = c.user_id
         WHERE u.username = ?",
    )
    .bind(username)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// A single registration, scoped to both username and credential id.
pub async fn registration_by_username_and_credential_id(
    pool: &SqlitePool,
    username: &str,
    credential_id: &str,
) -> AppResult<Option<CredentialRow>> {
    let row = sqlx::query_as::<_, CredentialRow>(
        "SELECT c.* FROM credentials c
         JOIN users u ON u.id = c.user_id
         WHERE u.username = ? AND c.credential_id = ?",
    )
    .bind(username)
    .bind(credential_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// A single registration by credential id alone. Used on the assertion path,
/// where the credential id comes from the verifier's result.
pub async fn registration_by_credential_id(
    pool: &SqlitePool,
    credential_id: &str,
) -> AppResult<Option<CredentialRow>> {
    let row =
        sqlx::query_as::<_, CredentialRow>("SELECT * FROM credentials WHERE credential_id = ?")
            .bind(credential_id)
            .fetch_optional(pool)
            .await?;

    Ok(row)
}

/// Persist a new registration.
///
/// Runs in one transaction: the user row is created if this is the
/// username's first credential, and the credential row is inserted against
/// the username's canonical handle. Two racing first-registrations for one
/// username therefore both attach to a single stable handle, and nothing
/// persists if any step fails.
///
/// ## Errors
/// `DuplicateCredential` if the credential id already exists for any user.
pub async fn add_registration(
    pool: &SqlitePool,
    user: &User,
    credential_id: &str,
    passkey: &[u8],
    sign_count: i64,
    nickname: Option<&str>,
    attestation: Option<&str>,
) -> AppResult<CredentialRow> {
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, username, display_name, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (username) DO NOTHING",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.display_name)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    // Re-read the canonical handle: if the username already existed (or a
    // racing registration inserted it first), the credential must attach to
    // the stored id, not the one this ceremony proposed.
    let canonical_id: String = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(&user.username)
        .fetch_one(&mut *tx)
        .await?;

    let row = CredentialRow {
        credential_id: credential_id.to_string(),
        user_id: canonical_id,
        passkey: passkey.to_vec(),
        sign_count,
        nickname: nickname.map(str::to_string),
        attestation: attestation.map(str::to_string),
        created_at: now.clone(),
        last_used_at: now.clone(),
        last_updated_at: now,
    };

    sqlx::query(
        "INSERT INTO credentials
         (credential_id, user_id, passkey, sign_count, nickname, attestation,
          created_at, last_used_at, last_updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.credential_id)
    .bind(&row.user_id)
    .bind(&row.passkey)
    .bind(row.sign_count)
    .bind(&row.nickname)
    .bind(&row.attestation)
    .bind(&row.created_at)
    .bind(&row.last_used_at)
    .bind(&row.last_updated_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return AppError::DuplicateCredential(credential_id.to_string());
            }
        }
        AppError::Storage(e)
    })?;

    tx.commit().await?;

    Ok(row)
}

/// Update a credential's nickname.
///
/// ## Errors
/// `NotFound` if the username/credential pair matches no registration.
pub async fn update_credential_nickname(
    pool: &SqlitePool,
    username: &str,
    credential_id: &str,
    nickname: &str,
) -> AppResult<()> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        "UPDATE credentials SET nickname = ?, last_updated_at = ?
         WHERE credential_id = ?
           AND user_id = (SELECT id FROM users WHERE username = ?)",
    )
    .bind(nickname)
    .bind(&now)
    .bind(credential_id)
    .bind(username)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Credential '{}' not found for user '{}'",
            credential_id, username
        )));
    }

    Ok(())
}

/// Remove one registration. Returns whether a row was actually deleted.
pub async fn remove_registration(
    pool: &SqlitePool,
    username: &str,
    credential_id: &str,
) -> AppResult<bool> {
    let result = sqlx::query(
        "DELETE FROM credentials
         WHERE credential_id = ?
           AND user_id = (SELECT id FROM users WHERE username = ?)",
    )
    .bind(credential_id)
    .bind(username)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Remove every registration for a username. Returns the number removed.
///
/// The user row is kept so the user handle stays stable if the username
/// registers again later.
pub async fn remove_all_registrations(pool: &SqlitePool, username: &str) -> AppResult<u64> {
    let result = sqlx::query(
        "DELETE FROM credentials
         WHERE user_id = (SELECT id FROM users WHERE username = ?)",
    )
    .bind(username)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Apply a verifier-reported signature counter to a credential.
///
/// Called after a successful authentication finish. The new counter and the
/// refreshed verifier state are written together with `last_used_at`, inside
/// a transaction that first compares against the stored counter.
///
/// ## Security: Signature Counter
/// A counter lower than the stored value means the authenticator replayed an
/// old state - possibly a cloned credential - and is rejected as
/// `SignatureCounterRegression`. Equal values pass, because authenticators
/// without a counter report zero forever.
pub async fn apply_signature_count(
    pool: &SqlitePool,
    credential_id: &str,
    new_count: i64,
    updated_passkey: &[u8],
) -> AppResult<()> {
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    let stored: Option<i64> =
        sqlx::query_scalar("SELECT sign_count FROM credentials WHERE credential_id = ?")
            .bind(credential_id)
            .fetch_optional(&mut *tx)
            .await?;

    let stored = stored.ok_or_else(|| {
        AppError::NotFound(format!("Credential '{}' not found", credential_id))
    })?;

    if new_count < stored {
        return Err(AppError::SignatureCounterRegression {
            credential_id: credential_id.to_string(),
            stored,
            received: new_count,
        });
    }

    sqlx::query(
        "UPDATE credentials SET sign_count = ?, passkey = ?, last_used_at = ?
         WHERE credential_id = ?",
    )
    .bind(new_count)
    .bind(updated_passkey)
    .bind(&now)
    .bind(credential_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(())
}
