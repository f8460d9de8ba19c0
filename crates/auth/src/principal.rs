use serde::{Deserialize, Serialize};

use keyward_core::UserId;

use crate::Role;

/// A verified identity: what a successful password check yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Canonical form used as the lookup key everywhere (credential store, subscriptions,
/// revocation cache).
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
