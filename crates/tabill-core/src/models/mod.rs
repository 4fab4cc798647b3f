//! Data models for Tabill entities.
//!
//! - `BranchOption`: a restaurant location as shown in the branch selector
//! - `AppUser`, `StaffMember`, `Actor`: who is signed in and what they may scope to
//! - Payment types: `OrderRequest`, `CustomerInfo`

pub mod branch;
pub mod identity;
pub mod payment;

pub use branch::BranchOption;
pub use identity::{Actor, AppUser, Identity, StaffMember};
pub use payment::{CustomerInfo, OrderRequest};
