use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{Actor, BranchOption};
use crate::storage::LocalStorage;

use super::BranchStore;

/// Local storage key prefix for the persisted branch choice
const STORAGE_KEY_PREFIX: &str = "activeBranch";

/// Key under which an owner's branch choice is persisted.
pub fn storage_key(owner_id: Option<&str>) -> String {
    match owner_id {
        Some(owner_id) => format!("{}:{}", STORAGE_KEY_PREFIX, owner_id),
        None => STORAGE_KEY_PREFIX.to_string(),
    }
}

/// Point-in-time view of the branch selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct BranchState {
    pub owner_id: Option<String>,
    pub branches: Vec<BranchOption>,
    pub active_branch_id: Option<String>,
    /// Bound staff cannot change the selection.
    pub is_readonly: bool,
    pub loading: bool,
    /// The owner has no branches yet.
    pub needs_first_branch: bool,
}

#[derive(Debug, Default)]
struct Inner {
    actor: Option<Actor>,
    branches: Vec<BranchOption>,
    active_branch_id: Option<String>,
    /// The last query succeeded with an empty list.
    no_branches: bool,
    loading: bool,
    /// Bumped for every branch query; results from older queries are dropped.
    generation: u64,
}

/// Resolves and persists the active branch for the signed-in actor.
pub struct ActiveBranchResolver<S, L> {
    store: S,
    storage: L,
    inner: Mutex<Inner>,
}

impl<S: BranchStore, L: LocalStorage> ActiveBranchResolver<S, L> {
    pub fn new(store: S, storage: L) -> Self {
        Self {
            store,
            storage,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn snapshot(&self) -> BranchState {
        let inner = self.inner.lock().await;
        let is_readonly = inner.actor.as_ref().is_some_and(Actor::is_readonly);
        BranchState {
            owner_id: inner.actor.as_ref().map(|a| a.owner_id().to_string()),
            branches: inner.branches.clone(),
            active_branch_id: inner.active_branch_id.clone(),
            is_readonly,
            loading: inner.loading,
            needs_first_branch: inner.no_branches && !is_readonly && !inner.loading,
        }
    }

    /// Switch to a new identity and resolve its branch. A no-op when the
    /// actor is unchanged.
    pub async fn set_actor(&self, actor: Option<Actor>) {
        {
            let mut inner = self.inner.lock().await;
            if inner.actor == actor {
                return;
            }
            let owner_changed =
                inner.actor.as_ref().map(Actor::owner_id) != actor.as_ref().map(Actor::owner_id);
            if owner_changed {
                inner.branches.clear();
                inner.active_branch_id = None;
                inner.no_branches = false;
            }
            // Queries issued for the previous actor are now stale
            inner.generation += 1;
            inner.loading = false;
            debug!(?actor, owner_changed, "Actor changed");
            inner.actor = actor;
        }
        self.resolve().await;
    }

    /// Select a branch and persist it for the current owner.
    ///
    /// This does not check `is_readonly`; callers must not offer the choice
    /// to bound staff.
    pub async fn set_active_branch_id(&self, branch_id: &str) {
        let mut inner = self.inner.lock().await;
        let key = storage_key(inner.actor.as_ref().map(Actor::owner_id));
        inner.active_branch_id = Some(branch_id.to_string());
        self.storage.set_item(&key, branch_id);
        info!(branch_id, key = %key, "Active branch selected");
    }

    /// Re-query the current owner's branches, e.g. after a branch was created.
    pub async fn reload(&self) {
        self.resolve().await;
    }

    /// Run the resolution for the current actor.
    ///
    /// Bound staff get their branch immediately; the list is still fetched
    /// for display. Everyone else gets the persisted choice when it still
    /// exists, else the newest branch.
    pub async fn resolve(&self) {
        let (actor, generation) = {
            let mut inner = self.inner.lock().await;
            let Some(actor) = inner.actor.clone() else {
                debug!("No owner identity, branch resolution idle");
                return;
            };
            if let Some(branch_id) = actor.bound_branch_id() {
                inner.active_branch_id = Some(branch_id.to_string());
            }
            inner.generation += 1;
            inner.loading = true;
            (actor, inner.generation)
        };

        let owner_id = actor.owner_id();
        let result = self.store.list_branches(owner_id).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            debug!(
                generation,
                latest = inner.generation,
                "Discarding superseded branch list"
            );
            return;
        }
        inner.loading = false;
        inner.no_branches = false;

        let branches = match result {
            Ok(branches) => branches,
            Err(e) => {
                warn!(owner_id, error = %e, "Failed to load branches");
                inner.branches.clear();
                return;
            }
        };
        debug!(owner_id, count = branches.len(), "Branches loaded");
        inner.branches = branches;

        if actor.is_readonly() {
            return;
        }

        let key = storage_key(Some(owner_id));
        let persisted = self.storage.get_item(&key);
        let selected = match persisted {
            Some(id) if inner.branches.iter().any(|b| b.id == id) => Some(id),
            _ => inner.branches.first().map(|b| b.id.clone()),
        };

        match selected {
            Some(id) => {
                self.storage.set_item(&key, &id);
                inner.active_branch_id = Some(id);
            }
            None => {
                info!(owner_id, "Owner has no branches yet");
                self.storage.remove_item(&key);
                inner.active_branch_id = None;
                inner.no_branches = true;
            }
        }
    }
}
