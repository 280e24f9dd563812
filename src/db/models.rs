//! # Database Models
//!
//! This module defines the data structures that map to database tables.
//! These structs represent rows in the database and include serialization/
//! deserialization for JSON APIs and database mapping.
//!
//! ## Why Strings for dates?
//! SQLite stores timestamps as text, so all time fields here are RFC3339
//! strings generated with chrono. They sort correctly as text and serialize
//! to JSON without conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account information.
///
/// Each user can have multiple registered credentials, and every credential
/// of one username shares the same `id`: it doubles as the WebAuthn user
/// handle and stays stable for the lifetime of the username.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// The user handle, as a UUID string. Derived once (from the
    /// caller-supplied seed at first registration) and reused for every
    /// later credential of this username.
    pub id: String,

    /// Unique username, used for lookup.
    pub username: String,

    /// Human-readable display name, shown during credential creation.
    pub display_name: String,

    /// When the account was created (RFC3339 timestamp).
    pub created_at: String,

    /// When the account was last updated (RFC3339 timestamp).
    pub updated_at: String,
}

impl User {
    /// Create a new user with the given handle and current timestamps.
    ///
    /// The handle is supplied by the caller rather than generated here
    /// because it must be derivable before the user row exists: the
    /// registration ceremony binds the handle into the challenge options at
    /// start, but the row is only persisted when the ceremony finishes.
    pub fn new(id: Uuid, username: String, display_name: String) -> Self {
        let now = Utc::now().to_rfc3339();

        Self {
            id: id.to_string(),
            username,
            display_name,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A registered credential.
///
/// Created on successful registration finish and used to verify every later
/// authentication. Only public-key material is stored; private keys never
/// leave the user's authenticator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CredentialRow {
    /// Credential id, base64url-encoded. Globally unique across all users;
    /// the table's primary key enforces this.
    pub credential_id: String,

    /// The owning user (foreign key to `users.id`, i.e. the user handle).
    pub user_id: String,

    /// The serialized verifier credential (public key plus the bookkeeping
    /// the verifier needs to validate assertions), stored as a BLOB.
    pub passkey: Vec<u8>,

    /// Signature counter as reported by the authenticator. Monotonic
    /// non-decreasing; a regression signals a possibly cloned credential.
    pub sign_count: i64,

    /// Human-facing nickname. Derived from attestation metadata when
    /// available, otherwise a default label; editable afterwards.
    pub nickname: Option<String>,

    /// Attestation metadata resolved at registration time, as a JSON string.
    /// Immutable once attached; absent when no metadata source was available
    /// or no statement matched.
    pub attestation: Option<String>,

    /// When the credential was registered (RFC3339 timestamp).
    pub created_at: String,

    /// When the credential last completed an authentication.
    pub last_used_at: String,

    /// When the credential row was last modified (nickname edits).
    pub last_updated_at: String,
}

/// A pending ceremony, parked between start and finish.
///
/// Rows live in `registration_ceremonies` or `authentication_ceremonies`
/// (the table is the ceremony-kind discriminator) and are keyed by the
/// opaque request id returned to the client at start. A row is consumed
/// (deleted) exactly once at finish, or swept after `expires_at`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingCeremony {
    /// Opaque, unguessable token identifying this ceremony. Possession of
    /// the id is the only capability needed to finish the ceremony.
    pub request_id: String,

    /// The username the ceremony was started for. `None` for usernameless
    /// (discoverable-credential) authentication.
    pub username: Option<String>,

    /// Serialized ceremony state: the verifier-issued challenge state plus
    /// whatever the finish step needs to complete the ceremony.
    pub state: Vec<u8>,

    /// When the ceremony was started (RFC3339 timestamp).
    pub created_at: String,

    /// When the ceremony stops being consumable. An expired row behaves
    /// identically to an absent one.
    pub expires_at: String,
}

impl PendingCeremony {
    /// Whether this ceremony's time-to-live has elapsed at instant `now`.
    ///
    /// An unparseable expiry counts as expired rather than living forever.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(expires_at) => now > expires_at,
            Err(_) => true,
        }
    }
}
