//! The external metadata capability.
//!
//! Validating the MDS BLOB's signature and trust chain is somebody else's
//! job; this server consumes an already-validated payload. The shipped
//! implementation reads that payload from a local file at startup, matching
//! how the original deployment cached a downloaded BLOB on disk.

use super::MetadataEntry;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the metadata capability. Never fatal to a ceremony: the
/// orchestrator logs these and stores the credential without metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata source unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("malformed metadata payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A queryable source of authenticator metadata entries.
///
/// `find_entries` returns the candidate entries for a registration's
/// attestation; zero, one, or many entries are all valid answers. The
/// resolver narrows the candidates down by AAGUID.
pub trait MetadataSource: Send + Sync {
    fn find_entries(&self, aaguid: &Uuid) -> Result<Vec<MetadataEntry>, MetadataError>;
}

/// Metadata source backed by an MDS BLOB payload file, loaded once at
/// startup.
pub struct BlobFileSource {
    entries: Vec<MetadataEntry>,
}

impl BlobFileSource {
    /// Load a payload file. Accepts either the full BLOB payload object
    /// (with its `entries` array) or a bare array of entries.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        #[derive(Deserialize)]
        struct Payload {
            entries: Vec<MetadataEntry>,
        }

        let raw = std::fs::read(path)?;
        let entries = match serde_json::from_slice::<Payload>(&raw) {
            Ok(payload) => payload.entries,
            Err(_) => serde_json::from_slice::<Vec<MetadataEntry>>(&raw)?,
        };

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataSource for BlobFileSource {
    /// A file payload has no per-attestation trust scoping, so every loaded
    /// entry is a candidate; the resolver's AAGUID filter does the rest.
    fn find_entries(&self, _aaguid: &Uuid) -> Result<Vec<MetadataEntry>, MetadataError> {
        Ok(self.entries.clone())
    }
}
