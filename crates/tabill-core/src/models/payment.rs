use serde::{Deserialize, Serialize};

/// Body of a subscription order request. Fields are optional so that
/// missing parameters can be reported instead of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRequest {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Customer display info looked up from the `users` collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}
