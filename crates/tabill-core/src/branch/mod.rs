//! Active branch resolution.
//!
//! Every screen of the app is scoped to one branch. The `ActiveBranchResolver`
//! decides which one from the signed-in `Actor`, the owner's branch list and
//! the choice persisted in local storage.

pub mod resolver;
pub mod store;

pub use resolver::{storage_key, ActiveBranchResolver, BranchState};
pub use store::BranchStore;
