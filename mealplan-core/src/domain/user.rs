//! User identity as issued by the authentication provider

use serde::{Deserialize, Serialize};

/// An authenticated user, immutable for the length of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }

    /// Name given to the plan created for this user
    pub fn default_plan_name(&self) -> String {
        format!("{}'s plan", self.email)
    }
}
