//! Core library for Tabill, a multi-branch restaurant management app.
//!
//! - `shell`: offline cache shell that keeps the app shell usable without a network
//! - `branch`: active-branch resolution scoped to the signed-in actor
//! - `auth`: sessions, credentials and sign-in against the hosted auth service
//! - `api`: REST client for the hosted database
//! - `payment`: subscription order creation through the payment gateway
//! - `storage`: browser-style local persistent storage
//! - `config`: application configuration

pub mod api;
pub mod auth;
pub mod branch;
pub mod config;
pub mod models;
pub mod payment;
pub mod shell;
pub mod storage;

pub use config::Config;
