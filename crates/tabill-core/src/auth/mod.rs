//! Authentication module for owner and staff sessions.
//!
//! This module provides:
//! - `Session`: token-based session persisted to the cache directory
//! - `CredentialStore`: OS keychain storage for re-login
//!
//! The identity carried by a session decides which `Actor` the branch
//! resolver scopes to.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionData};
