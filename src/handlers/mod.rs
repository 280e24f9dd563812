//! # HTTP Request Handlers
//!
//! This module contains all the HTTP route handlers (controllers).
//! Each handler processes a specific API endpoint.
//!
//! ## Submodules
//! - `health`: liveness endpoint (for monitoring)
//! - `auth`: ceremony endpoints (registration and authentication, start/finish)
//! - `credentials`: credential management (list, rename, remove)
//!
//! ## Handler Pattern
//! Handlers are async functions that:
//! 1. Extract data from the request (path params, JSON body)
//! 2. Call the ceremony or repository layer
//! 3. Return a JSON response or an `AppError`
//!
//! The handlers own all JSON shaping; the ceremony and repository layers
//! stay serialization-agnostic.

pub mod auth;
pub mod credentials;
pub mod health;
