//! # Configuration Management
//!
//! This module handles loading configuration from environment variables.
//! It uses the "12-factor app" methodology where configuration comes from the environment.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_URL`: SQLite database connection string
//! - `RP_ID`: WebAuthn Relying Party ID (usually your domain)
//! - `RP_ORIGIN`: WebAuthn Relying Party Origin (full URL)
//! - `RP_NAME`: Human-readable name for your service
//! - `CEREMONY_TTL_SECS`: How long a started ceremony may remain unfinished
//! - `METADATA_PATH`: Path to a FIDO MDS BLOB payload file (optional)

use anyhow::Result;
use std::env;

/// Application configuration.
///
/// Built once at startup and injected into [`crate::state::AppState`]; never
/// mutated afterwards.
///
/// ## WebAuthn Terminology
/// - **RP (Relying Party)**: the service verifying credentials (this server)
/// - **RP ID**: your domain name (e.g., "example.com" or "localhost")
/// - **RP Origin**: full URL of your application (e.g., "https://example.com")
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to.
    /// Examples: "127.0.0.1" (localhost only), "0.0.0.0" (all interfaces)
    pub host: String,

    /// Server port number (1-65535).
    pub port: u16,

    /// SQLite database connection URL.
    /// Format: "sqlite:filename.db?mode=rwc" ("rwc": read, write, create)
    pub database_url: String,

    /// WebAuthn Relying Party ID. Must match the domain the app is served
    /// from: "localhost" for development, "example.com" in production.
    pub rp_id: String,

    /// WebAuthn Relying Party Origin: the full URL, including protocol.
    pub rp_origin: String,

    /// Human-readable name shown to users during credential creation.
    pub rp_name: String,

    /// Time-to-live for pending ceremonies, in seconds. Expiry is the only
    /// cancellation mechanism for abandoned ceremonies; after this window a
    /// finish call is rejected as an unknown ceremony.
    pub ceremony_ttl_secs: i64,

    /// Path to a FIDO Alliance MDS BLOB payload (JSON). When unset or
    /// unreadable the server runs without attestation metadata enrichment.
    pub metadata_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Loads a `.env` file first if one exists (dotenvy doesn't error if the
    /// file is missing), then reads each value with a sensible default.
    /// Returns an error only if a set variable fails to parse.
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=8080
    /// DATABASE_URL=sqlite:webauthn.db?mode=rwc
    /// RP_ID=localhost
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=WebAuthn RP Server
    /// CEREMONY_TTL_SECS=300
    /// METADATA_PATH=metadata.json
    /// ```
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:webauthn.db?mode=rwc".to_string()),

            rp_id: env::var("RP_ID").unwrap_or_else(|_| "localhost".to_string()),

            rp_origin: env::var("RP_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),

            rp_name: env::var("RP_NAME").unwrap_or_else(|_| "WebAuthn RP Server".to_string()),

            // Five minutes: long enough for the user to touch their
            // authenticator, short enough to bound the replay window.
            ceremony_ttl_secs: env::var("CEREMONY_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,

            metadata_path: env::var("METADATA_PATH").ok(),
        })
    }

    /// Socket address to bind the server to, e.g. "127.0.0.1:8080".
    ///
    /// This format is required by `tokio::net::TcpListener::bind()`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
