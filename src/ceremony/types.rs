//! # Ceremony API Types
//!
//! Request types for the ceremony endpoints. Each ceremony is two steps:
//! start (server issues challenge options plus a request id) and finish
//! (client echoes the request id with the authenticator's response).
//!
//! ## Why serde_json::Value for credentials?
//! The authenticator response is a deep WebAuthn structure. Instead of
//! mirroring all of its nested types we accept it as raw JSON and hand it to
//! the verifier for parsing and validation.

use serde::{Deserialize, Serialize};

/// Request to start a registration ceremony.
///
/// ## Example JSON
/// ```json
/// {
///   "username": "alice",
///   "display_name": "Alice A",
///   "require_resident_key": true,
///   "authenticator_attachment": "platform",
///   "uid": "AAAA"
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationStartRequest {
    /// Unique username the credential will belong to.
    pub username: String,

    /// Human-readable name shown during credential creation.
    pub display_name: String,

    /// Whether the new credential must be discoverable (resident).
    pub require_resident_key: bool,

    /// Force a specific authenticator class: "platform" or "cross-platform".
    /// Absent means no preference.
    pub authenticator_attachment: Option<String>,

    /// Caller-supplied user-handle seed, base64url encoded. Only consulted
    /// for the username's first registration; later registrations reuse the
    /// stored handle.
    pub uid: String,
}

/// Request to finish a registration ceremony.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationFinishRequest {
    /// The request id issued at ceremony start.
    pub request_id: String,

    /// The credential created by the WebAuthn API, as returned by
    /// `navigator.credentials.create()`.
    pub credential: serde_json::Value,
}

/// Request to start an authentication ceremony.
///
/// `username` absent selects the usernameless (discoverable-credential)
/// flow: no user-existence check is made and the authenticator picks the
/// credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticationStartRequest {
    pub username: Option<String>,
}

/// Request to finish an authentication ceremony.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticationFinishRequest {
    /// The request id issued at ceremony start.
    pub request_id: String,

    /// The assertion (signed challenge) from the WebAuthn API.
    pub credential: serde_json::Value,
}

/// Request to rename a credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateNicknameRequest {
    pub nickname: String,
}
