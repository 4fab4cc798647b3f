use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::api::ApiClient;
use crate::models::BranchOption;

/// Backing store listing an owner's branches, most recently created first.
#[async_trait]
pub trait BranchStore: Send + Sync {
    async fn list_branches(&self, owner_id: &str) -> Result<Vec<BranchOption>>;
}

#[async_trait]
impl BranchStore for ApiClient {
    async fn list_branches(&self, owner_id: &str) -> Result<Vec<BranchOption>> {
        self.fetch_branches(owner_id).await
    }
}

#[async_trait]
impl<T: BranchStore + ?Sized> BranchStore for Arc<T> {
    async fn list_branches(&self, owner_id: &str) -> Result<Vec<BranchOption>> {
        (**self).list_branches(owner_id).await
    }
}
