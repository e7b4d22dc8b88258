//! Application Backend Server - OIDC-protected student records API.
//!
//! This crate provides the building blocks of the service: a JWKS-backed
//! bearer token verifier with a type-state token, a MySQL student store,
//! and the axum router that exposes them.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod http;
pub mod jwt;
pub mod observability;
pub mod shutdown;
pub mod store;

pub use config::Config;
pub use error::{ApiError, AuthError, ClaimFailure, ErrorCode, JwksError};
pub use http::{create_app, AppState};
