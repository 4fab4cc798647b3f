//! Browser-style local persistent storage.
//!
//! A flat string key/value store that survives restarts. The active-branch
//! resolver persists the selected branch here under `activeBranch:<ownerId>`.

pub mod local;

pub use local::{FileLocalStorage, LocalStorage, MemoryLocalStorage};
