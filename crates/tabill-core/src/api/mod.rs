//! REST client module for the hosted Tabill backend.
//!
//! This module provides the `ApiClient` for signing in and reading the
//! `users`, `staff` and `branches` collections.
//!
//! Requests carry the project's anon key as `apikey` and a bearer token:
//! the session access token when signed in, the anon key otherwise.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
