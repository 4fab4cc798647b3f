use serde::{Deserialize, Serialize};

/// Row from the `users` collection for the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct AppUser {
    pub uid: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Row from the `staff` collection. Staff belong to an owner and may be
/// bound to a single branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct StaffMember {
    pub id: String,
    pub user_id: Option<String>,
    pub owner_id: Option<String>,
    pub branch_id: Option<String>,
    pub role: Option<String>,
}

/// Who the UI is scoped for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum Actor {
    Owner { owner_id: String },
    BoundStaff { owner_id: String, branch_id: String },
}

impl Actor {
    pub fn owner_id(&self) -> &str {
        match self {
            Actor::Owner { owner_id } | Actor::BoundStaff { owner_id, .. } => owner_id,
        }
    }

    pub fn is_readonly(&self) -> bool {
        matches!(self, Actor::BoundStaff { .. })
    }

    pub fn bound_branch_id(&self) -> Option<&str> {
        match self {
            Actor::Owner { .. } => None,
            Actor::BoundStaff { branch_id, .. } => Some(branch_id),
        }
    }
}

/// What the identity provider knows about the signed-in account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub app_user: Option<AppUser>,
    pub staff_member: Option<StaffMember>,
}

impl Identity {
    /// Derive the actor. Staff membership takes precedence over an app user
    /// row; staff without an owner fall back to the app user.
    pub fn actor(&self) -> Option<Actor> {
        let staff_owner = self
            .staff_member
            .as_ref()
            .and_then(|s| s.owner_id.as_ref().map(|owner| (owner, s.branch_id.as_ref())));

        match staff_owner {
            Some((owner_id, Some(branch_id))) => Some(Actor::BoundStaff {
                owner_id: owner_id.clone(),
                branch_id: branch_id.clone(),
            }),
            Some((owner_id, None)) => Some(Actor::Owner {
                owner_id: owner_id.clone(),
            }),
            None => self.app_user.as_ref().map(|user| Actor::Owner {
                owner_id: user.uid.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str) -> AppUser {
        AppUser {
            uid: uid.to_string(),
            name: None,
            email: None,
            phone: None,
        }
    }

    fn staff(owner: Option<&str>, branch: Option<&str>) -> StaffMember {
        StaffMember {
            id: "s1".to_string(),
            user_id: Some("u-staff".to_string()),
            owner_id: owner.map(String::from),
            branch_id: branch.map(String::from),
            role: Some("cashier".to_string()),
        }
    }

    #[test]
    fn test_owner_actor() {
        let identity = Identity {
            app_user: Some(user("owner-1")),
            staff_member: None,
        };
        let actor = identity.actor().expect("owner actor");
        assert_eq!(actor.owner_id(), "owner-1");
        assert!(!actor.is_readonly());
        assert_eq!(actor.bound_branch_id(), None);
    }

    #[test]
    fn test_bound_staff_actor() {
        let identity = Identity {
            app_user: Some(user("u-staff")),
            staff_member: Some(staff(Some("owner-1"), Some("b1"))),
        };
        assert_eq!(
            identity.actor(),
            Some(Actor::BoundStaff {
                owner_id: "owner-1".to_string(),
                branch_id: "b1".to_string(),
            })
        );
    }

    #[test]
    fn test_unbound_staff_scopes_to_owner() {
        let identity = Identity {
            app_user: None,
            staff_member: Some(staff(Some("owner-1"), None)),
        };
        assert_eq!(
            identity.actor(),
            Some(Actor::Owner {
                owner_id: "owner-1".to_string()
            })
        );
    }

    #[test]
    fn test_no_identity_has_no_actor() {
        assert_eq!(Identity::default().actor(), None);

        let orphan = Identity {
            app_user: None,
            staff_member: Some(staff(None, Some("b1"))),
        };
        assert_eq!(orphan.actor(), None);
    }
}
