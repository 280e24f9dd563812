//! # Ceremony Orchestration
//!
//! The state machine coordinating WebAuthn ceremonies. Every ceremony runs
//! `Started -> Pending -> {Finished-Success | Finished-Failure | Expired}`:
//! start parks verifier-issued challenge state in the request store under a
//! fresh request id, finish consumes that state exactly once and drives the
//! verifier, then commits the outcome to the credential repository.
//!
//! ## Submodules
//! - `types`: start/finish request types for the API
//! - `store`: the pending-request store (single-use, expiring)
//! - `registration`: creating new credentials
//! - `authentication`: asserting existing credentials (named or usernameless)
//! - `authenticator_data`: AAGUID/counter extraction from attestation objects
//!
//! ## Flow Overview
//!
//! ### Registration
//! 1. Client requests registration -> `registration::start_registration()`
//! 2. Server resolves the user handle, issues challenge options + request id
//! 3. Client creates a credential with its authenticator
//! 4. Client sends credential + request id -> `registration::finish_registration()`
//! 5. Server consumes the pending request, verifies, enriches with metadata,
//!    and persists the credential
//!
//! ### Authentication
//! 1. Client requests authentication -> `authentication::start_authentication()`
//! 2. Server issues challenge options + request id (scoped to the named
//!    user's credentials, or discoverable when no username was given)
//! 3. Client signs the challenge with its authenticator
//! 4. Client sends assertion + request id -> `authentication::finish_authentication()`
//! 5. Server consumes the pending request, verifies, and updates the
//!    credential's signature counter

pub mod authentication;
pub mod authenticator_data;
pub mod registration;
pub mod store;
pub mod types;
