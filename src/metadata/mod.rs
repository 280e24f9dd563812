//! # Attestation Metadata
//!
//! Best-effort enrichment of newly registered credentials with FIDO
//! Alliance metadata: a human-readable authenticator description, attachment
//! hints, an icon, and supported transports.
//!
//! ## Submodules
//! - `source`: the external metadata capability (trait + BLOB-file impl)
//! - `resolver`: AAGUID matching, fallback, and statement extraction
//!
//! Nothing in here may fail a ceremony. Every error from this module is
//! logged by the orchestrator and downgraded to "no metadata".

use serde::{Deserialize, Serialize};

pub mod resolver;
pub mod source;

/// Metadata attached to a credential at registration time.
///
/// Immutable once stored; derived from a metadata statement and persisted as
/// JSON alongside the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationMetadata {
    pub aaguid: Option<String>,
    pub aaid: Option<String>,
    #[serde(default)]
    pub attachment_hints: Vec<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// One entry of an MDS BLOB payload, reduced to the fields this server
/// consumes. Unknown fields in the payload are ignored on purpose; the BLOB
/// format grows faster than our interest in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    /// The authenticator model identifier. Absent for U2F-era entries that
    /// only carry an AAID.
    pub aaguid: Option<String>,

    /// The entry's metadata statement. An entry without a statement makes no
    /// authoritative claim about the authenticator.
    pub metadata_statement: Option<MetadataStatement>,
}

/// The subset of a metadata statement the resolver extracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    pub aaguid: Option<String>,
    pub aaid: Option<String>,
    #[serde(default)]
    pub attachment_hint: Vec<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub authenticator_get_info: Option<AuthenticatorGetInfo>,
}

/// CTAP2 getInfo data embedded in newer metadata statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorGetInfo {
    #[serde(default)]
    pub transports: Vec<String>,
}
