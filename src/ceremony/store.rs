//! # Ceremony Request Store
//!
//! Holds pending registration/authentication ceremonies between start and
//! finish, keyed by an opaque request id. Three properties matter here:
//!
//! 1. **Unguessable ids**: the request id is the only capability needed to
//!    finish a ceremony, so it carries 256 bits from the OS CSPRNG.
//! 2. **Consume-once**: lookup and invalidation happen in a single
//!    `DELETE ... RETURNING` statement, so two racing finish calls for the
//!    same id observe exactly one success - the loser sees the same absence
//!    as a ceremony that never started. A separate get-then-delete pair
//!    would leave a window where both observe the row.
//! 3. **Expiry**: entries stop being consumable after their time-to-live,
//!    which is the only timeout concept for abandoned ceremonies. An expired
//!    entry behaves identically to an absent one; a periodic sweep keeps the
//!    tables from accumulating abandoned rows.

use crate::db::models::PendingCeremony;
use crate::error::AppResult;
use base64::prelude::*;
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::SqlitePool;

/// Which of the two pending tables a ceremony lives in. The table is the
/// kind discriminator; registration and authentication ids never collide
/// with each other's namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    fn table(self) -> &'static str {
        match self {
            CeremonyKind::Registration => "registration_ceremonies",
            CeremonyKind::Authentication => "authentication_ceremonies",
        }
    }
}

/// Generate a fresh request id: 32 bytes from the OS CSPRNG, base64url
/// encoded without padding.
pub fn generate_request_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Park a started ceremony under `request_id` until finish or expiry.
pub async fn put(
    pool: &SqlitePool,
    kind: CeremonyKind,
    request_id: &str,
    username: Option<&str>,
    state: &[u8],
    ttl: Duration,
) -> AppResult<()> {
    let now = Utc::now();
    let expires = now + ttl;

    sqlx::query(&format!(
        "INSERT INTO {} (request_id, username, state, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?)",
        kind.table()
    ))
    .bind(request_id)
    .bind(username)
    .bind(state)
    .bind(now.to_rfc3339())
    .bind(expires.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up and invalidate a pending ceremony in one atomic step.
///
/// Returns `None` when the id is unknown, already consumed, or expired -
/// the three cases are indistinguishable by design. Note an expired row is
/// still deleted here, so a late finish attempt also clears it.
pub async fn consume(
    pool: &SqlitePool,
    kind: CeremonyKind,
    request_id: &str,
) -> AppResult<Option<PendingCeremony>> {
    let row = sqlx::query_as::<_, PendingCeremony>(&format!(
        "DELETE FROM {} WHERE request_id = ? RETURNING *",
        kind.table()
    ))
    .bind(request_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.filter(|pending| !pending.is_expired(Utc::now())))
}

/// Sweep expired rows from both pending tables. Returns the number removed.
///
/// Run periodically from the background cleanup task; `consume` already
/// treats expired rows as absent, so this only bounds table growth.
pub async fn cleanup_expired(pool: &SqlitePool) -> AppResult<u64> {
    let now = Utc::now().to_rfc3339();
    let mut removed = 0;

    for kind in [CeremonyKind::Registration, CeremonyKind::Authentication] {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE expires_at < ?",
            kind.table()
        ))
        .bind(&now)
        .execute(pool)
        .await?;
        removed += result.rows_affected();
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        pool
    }

    #[test]
    fn request_ids_are_long_and_distinct() {
        let a = generate_request_id();
        let b = generate_request_id();
        // 32 bytes base64url without padding.
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn consume_unknown_id_is_none() {
        let pool = test_pool().await;
        let got = consume(&pool, CeremonyKind::Registration, "never-issued")
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn consume_succeeds_once_then_reports_absent() {
        let pool = test_pool().await;
        let id = generate_request_id();
        put(
            &pool,
            CeremonyKind::Registration,
            &id,
            Some("alice"),
            b"state",
            Duration::minutes(5),
        )
        .await
        .unwrap();

        let first = consume(&pool, CeremonyKind::Registration, &id).await.unwrap();
        let pending = first.expect("first consume succeeds");
        assert_eq!(pending.username.as_deref(), Some("alice"));
        assert_eq!(pending.state, b"state");

        let second = consume(&pool, CeremonyKind::Registration, &id).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn kinds_do_not_share_a_namespace() {
        let pool = test_pool().await;
        let id = generate_request_id();
        put(&pool, CeremonyKind::Authentication, &id, None, b"s", Duration::minutes(5))
            .await
            .unwrap();

        assert!(consume(&pool, CeremonyKind::Registration, &id)
            .await
            .unwrap()
            .is_none());
        assert!(consume(&pool, CeremonyKind::Authentication, &id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn expired_entry_behaves_like_absent() {
        let pool = test_pool().await;
        let id = generate_request_id();
        put(
            &pool,
            CeremonyKind::Authentication,
            &id,
            None,
            b"state",
            Duration::seconds(-1),
        )
        .await
        .unwrap();

        let got = consume(&pool, CeremonyKind::Authentication, &id).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_rows() {
        let pool = test_pool().await;
        put(
            &pool,
            CeremonyKind::Registration,
            "stale",
            None,
            b"s",
            Duration::seconds(-1),
        )
        .await
        .unwrap();
        put(
            &pool,
            CeremonyKind::Registration,
            "fresh",
            None,
            b"s",
            Duration::minutes(5),
        )
        .await
        .unwrap();

        let removed = cleanup_expired(&pool).await.unwrap();
        assert_eq!(removed, 1);
        assert!(consume(&pool, CeremonyKind::Registration, "fresh")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_consumers_observe_exactly_one_success() {
        let pool = test_pool().await;
        let id = generate_request_id();
        put(
            &pool,
            CeremonyKind::Registration,
            &id,
            Some("alice"),
            b"state",
            Duration::minutes(5),
        )
        .await
        .unwrap();

        let (p1, p2) = (pool.clone(), pool.clone());
        let (id1, id2) = (id.clone(), id.clone());
        let a = tokio::spawn(async move { consume(&p1, CeremonyKind::Registration, &id1).await });
        let b = tokio::spawn(async move { consume(&p2, CeremonyKind::Registration, &id2).await });

        let results = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let successes = results.iter().filter(|r| r.is_some()).count();
        assert_eq!(successes, 1);
    }
}
