//! # Application State
//!
//! This module defines the shared state that's accessible to all request handlers.
//! In Axum, state is how you share resources (database connections, the
//! verifier, the metadata source) across different parts of your application.
//!
//! ## The State Pattern
//! Instead of creating new resources for each request, we:
//! 1. Create them once at startup
//! 2. Store them in AppState
//! 3. Axum clones the state for each request (cheap because everything is a
//!    pool or an Arc)

use crate::config::Config;
use crate::metadata::source::{BlobFileSource, MetadataSource};
use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use webauthn_rs::prelude::*;

/// Shared application state.
///
/// Holds every resource shared across request handlers. `SqlitePool` is
/// already a clone-able pool of connections and the rest is behind `Arc`, so
/// per-request clones only copy pointers. All fields are thread-safe.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool. Backs both the credential repository and the
    /// pending-ceremony store, so the consume-once and uniqueness guarantees
    /// hold even when several server processes share one database.
    pub db: SqlitePool,

    /// The WebAuthn verifier. Handles challenge construction and all
    /// cryptographic validation of registration and assertion responses; this
    /// server never inspects signatures itself.
    pub webauthn: Arc<Webauthn>,

    /// Attestation metadata source, if one was configured. `None` means the
    /// server runs without metadata enrichment; ceremonies are unaffected.
    pub metadata: Option<Arc<dyn MetadataSource>>,

    /// How long a started ceremony stays consumable.
    pub ceremony_ttl: chrono::Duration,
}

impl AppState {
    /// Initialize application state.
    ///
    /// Connects to SQLite, runs the embedded migrations, configures the
    /// verifier with the relying-party identity, and loads the metadata BLOB
    /// payload when one is configured.
    ///
    /// # Errors
    /// Returns an error if the database connection or migrations fail, or the
    /// relying-party origin is not a valid URL. A missing or unreadable
    /// metadata file is NOT an error: enrichment is best-effort and the
    /// server degrades to storing credentials without attestation metadata.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = SqlitePool::connect(&config.database_url).await?;

        // The `sqlx::migrate!` macro embeds migrations from ./migrations and
        // tracks which have already been applied.
        sqlx::migrate!("./migrations").run(&db).await?;

        let rp_origin = Url::parse(&config.rp_origin)?;
        let builder =
            WebauthnBuilder::new(&config.rp_id, &rp_origin)?.rp_name(&config.rp_name);
        let webauthn = Arc::new(builder.build()?);

        let metadata: Option<Arc<dyn MetadataSource>> = match &config.metadata_path {
            Some(path) => match BlobFileSource::load(path) {
                Ok(source) => {
                    if source.is_empty() {
                        tracing::warn!("Metadata payload {} contains no entries", path);
                    }
                    tracing::info!("Loaded {} metadata entries from {}", source.len(), path);
                    Some(Arc::new(source))
                }
                Err(e) => {
                    tracing::warn!("Metadata source unavailable ({}): {}", path, e);
                    None
                }
            },
            None => None,
        };

        Ok(AppState {
            db,
            webauthn,
            metadata,
            ceremony_ttl: chrono::Duration::seconds(config.ceremony_ttl_secs),
        })
    }
}
