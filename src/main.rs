//! # WebAuthn Relying-Party Server
//!
//! This is the main entry point for a WebAuthn/FIDO2 relying-party server.
//! It orchestrates credential registration and authentication ceremonies:
//! issuing per-ceremony challenges, correlating the client's response by an
//! opaque request id, delegating cryptographic verification to webauthn-rs,
//! enriching new credentials with FIDO metadata, and maintaining the durable
//! credential repository.
//!
//! ## Key Concepts
//! - **Ceremony**: one registration or authentication round-trip, split into
//!   start and finish
//! - **Request id**: unguessable token correlating a finish call with its
//!   pending ceremony; single-use and expiring
//! - **Relying Party**: the service verifying WebAuthn credentials (this one)

// Module declarations - organize code into logical components
mod ceremony; // Ceremony orchestration: request store, registration, authentication
mod config; // Configuration management (environment variables, settings)
mod db; // Database operations (users, credentials)
mod error; // Error handling and custom error types
mod handlers; // HTTP request handlers (routes)
mod metadata; // Attestation metadata source and resolver
mod state; // Shared application state

use crate::config::Config;
use crate::handlers::auth::*;
use crate::handlers::credentials::{
    list_credential_ids, list_registrations, remove_all_registrations, remove_registration,
    update_nickname,
};
use crate::handlers::health::health_check;
use crate::state::AppState;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main application entry point
///
/// This function:
/// 1. Sets up logging for debugging and monitoring
/// 2. Loads configuration from environment variables
/// 3. Initializes database, verifier, and metadata source
/// 4. Starts a background task to sweep expired ceremonies
/// 5. Sets up API routes and middleware
/// 6. Starts the HTTP server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing/logging system
    // Default: info level for most crates, debug level for our app
    // Can be overridden with RUST_LOG environment variable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webauthn_rp_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables and .env file
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    // Initialize application state: database pool, migrations, the WebAuthn
    // verifier, and (optionally) the attestation metadata source
    let app_state = AppState::new(&config).await?;
    tracing::info!("Application state initialized");

    // Start background task for sweeping expired ceremonies.
    // Finish calls already treat expired rows as absent; this sweep only
    // keeps abandoned ceremonies from accumulating in the database.
    let cleanup_pool = app_state.db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            match ceremony::store::cleanup_expired(&cleanup_pool).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Swept {} expired ceremonies", n),
                Err(e) => tracing::error!("Ceremony cleanup failed: {:?}", e),
            }
        }
    });

    // Configure CORS (Cross-Origin Resource Sharing)
    // In production, restrict this to specific origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router: one route per ceremony step plus the
    // credential management operations
    let app = Router::new()
        // Health check endpoint - useful for monitoring and load balancers
        .route("/health", get(health_check))
        // Registration ceremony (creating a new credential)
        .route("/api/register/start", post(register_start))
        .route("/api/register/finish", post(register_finish))
        // Authentication ceremony (asserting an existing credential)
        .route("/api/authenticate/start", post(authenticate_start))
        .route("/api/authenticate/finish", post(authenticate_finish))
        // Credential management
        .route(
            "/api/credentials/{username}",
            get(list_registrations).delete(remove_all_registrations),
        )
        .route("/api/credentials/{username}/ids", get(list_credential_ids))
        .route(
            "/api/credentials/{username}/{credential_id}/nickname",
            put(update_nickname),
        )
        .route(
            "/api/credentials/{username}/{credential_id}",
            delete(remove_registration),
        )
        // Apply middleware layers (processed in reverse order)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // Attach shared application state
        .with_state(app_state);

    // Start the HTTP server
    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
