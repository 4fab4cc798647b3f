//! Offline cache shell.
//!
//! The shell sits between the app and the network. It pre-caches the assets
//! needed to render the app, serves them when the network is gone, and
//! opportunistically refreshes the cache from successful fetches.
//!
//! Lifecycle of one shell version:
//! 1. `install` pre-caches the manifest into a bucket named by the version
//! 2. `activate` purges every other bucket and takes control
//! 3. `fetch` answers requests: network first for page loads, cache first
//!    for other reads, and straight to the network for writes
//!
//! Bumping [`CACHE_VERSION`] is the only way to invalidate the cache.

pub mod cache;
pub mod message;
pub mod network;
pub mod worker;

use thiserror::Error;

pub use reqwest::{Method, Url};

pub use cache::{CacheStorage, CachedData, DiskCacheStorage, EntryInfo, MemoryCacheStorage};
pub use message::{RequestMode, ResponseType, ShellRequest, ShellResponse, OFFLINE_BODY};
pub use network::{HttpNetwork, Network};
pub use worker::{ShellPhase, ShellWorker};

/// Name of the current cache bucket
pub const CACHE_VERSION: &str = "tabill-shell-v2";

/// Assets cached on install, relative to the shell scope
pub const PRECACHE_MANIFEST: &[&str] = &[
    "/",
    "/manifest.webmanifest",
    "/icons/icon-192.png?v=2",
    "/icons/icon-512.png?v=2",
];

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Offline: {0}")]
    Offline(String),

    #[error("Precache of {url} failed with status {status}")]
    Precache { url: String, status: u16 },

    #[error("Invalid shell URL: {0}")]
    InvalidUrl(String),

    #[error("Shell version {0} is not installed")]
    NotInstalled(String),

    #[error("Cache storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for ShellError {
    fn from(e: anyhow::Error) -> Self {
        ShellError::Storage(e)
    }
}
