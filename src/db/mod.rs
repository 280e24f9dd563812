//! # Database Module
//!
//! This module organizes all database-related code into submodules:
//! - `models`: Row types (User, CredentialRow, PendingCeremony)
//! - `users`: user-identity persistence
//! - `credentials`: the credential repository (lookup, mutation, counter
//!   bookkeeping)
//!
//! The pending-ceremony store also lives on this database but is owned by
//! `crate::ceremony::store`, since its consume-once contract belongs to the
//! ceremony layer rather than to the durable repository.

pub mod credentials;
pub mod models;
pub mod users;
