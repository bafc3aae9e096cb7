//! Plan domain model
//!
//! A plan is the unit of meal-scheduling ownership and sharing. Every user
//! owns at most one plan; collaborators are identified by email.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::User;

/// Collection holding plan documents
pub const PLANS_COLLECTION: &str = "mealPlans";

/// Document field names for plans
pub mod fields {
    pub const OWNER_USER_ID: &str = "ownerUserId";
    /// Owner id spelling used before plans carried `ownerUserId`
    pub const LEGACY_USER_ID: &str = "userId";
    pub const OWNER_EMAIL: &str = "ownerEmail";
    pub const NAME: &str = "name";
    pub const SHARED_WITH: &str = "sharedWith";
    pub const CREATED_AT: &str = "createdAt";
}

/// Collaborator emails with read+write access to a plan
///
/// Canonical shape: a sorted array of unique, non-empty emails, trimmed and
/// lowercased.
/// Serializes to (and deserializes from) a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedWith(BTreeSet<String>);

impl SharedWith {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw emails, trimming and dropping blanks and duplicates
    pub fn from_emails<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut shared = Self::new();
        for email in emails {
            shared.insert(email.as_ref());
        }
        shared
    }

    /// Insert an email. Returns false if it was blank or already present.
    pub fn insert(&mut self, email: &str) -> bool {
        let email = canonical_email(email);
        if email.is_empty() {
            return false;
        }
        self.0.insert(email)
    }

    /// Remove an email. Returns false if it was not present.
    pub fn remove(&mut self, email: &str) -> bool {
        self.0.remove(&canonical_email(email))
    }

    pub fn contains(&self, email: &str) -> bool {
        self.0.contains(&canonical_email(email))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON value in the canonical on-disk shape
    pub fn to_value(&self) -> JsonValue {
        JsonValue::Array(self.0.iter().cloned().map(JsonValue::String).collect())
    }
}

/// A meal plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub owner_user_id: String,
    pub owner_email: String,
    pub name: String,
    pub shared_with: SharedWith,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// A fresh, not yet persisted plan for `owner`
    pub fn for_owner(owner: &User, now: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            owner_user_id: owner.id.clone(),
            owner_email: owner.email.clone(),
            name: owner.default_plan_name(),
            shared_with: SharedWith::new(),
            created_at: now,
        }
    }

    pub fn is_owned_by(&self, user: &User) -> bool {
        self.owner_user_id == user.id
    }

    /// Whether `user` may read and write this plan's meals
    pub fn is_accessible_by(&self, user: &User) -> bool {
        self.is_owned_by(user) || self.shared_with.contains(&user.email)
    }

    /// Document body in canonical form (the id lives outside the body)
    pub fn to_fields(&self) -> Map<String, JsonValue> {
        let mut doc = Map::new();
        doc.insert(
            fields::OWNER_USER_ID.into(),
            JsonValue::String(self.owner_user_id.clone()),
        );
        doc.insert(
            fields::OWNER_EMAIL.into(),
            JsonValue::String(self.owner_email.clone()),
        );
        doc.insert(fields::NAME.into(), JsonValue::String(self.name.clone()));
        doc.insert(fields::SHARED_WITH.into(), self.shared_with.to_value());
        doc.insert(
            fields::CREATED_AT.into(),
            JsonValue::String(format_timestamp(&self.created_at)),
        );
        doc
    }
}

/// Emails compare trimmed and case-insensitively
pub fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Timestamp format used in stored documents
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_with_set_semantics() {
        let mut shared = SharedWith::from_emails(["b@x.com", " A@x.com ", "b@x.com", ""]);
        assert_eq!(shared.iter().collect::<Vec<_>>(), vec!["a@x.com", "b@x.com"]);

        assert!(!shared.insert("a@x.com"));
        assert!(shared.contains("B@X.com"));
        assert!(!shared.insert("   "));
        assert!(shared.remove("b@x.com"));
        assert!(!shared.remove("b@x.com"));
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn test_shared_with_serializes_as_array() {
        let shared = SharedWith::from_emails(["c@x.com", "a@x.com"]);
        assert_eq!(
            serde_json::to_value(&shared).unwrap(),
            serde_json::json!(["a@x.com", "c@x.com"])
        );
        assert_eq!(shared.to_value(), serde_json::json!(["a@x.com", "c@x.com"]));
    }

    #[test]
    fn test_plan_for_owner() {
        let user = User::new("u1", "owner@example.com");
        let plan = Plan::for_owner(&user, Utc::now());
        assert!(plan.is_owned_by(&user));
        assert!(plan.shared_with.is_empty());
        assert_eq!(plan.name, "owner@example.com's plan");

        let doc = plan.to_fields();
        assert_eq!(doc[fields::OWNER_USER_ID], "u1");
        assert_eq!(doc[fields::SHARED_WITH], serde_json::json!([]));
        assert!(!doc.contains_key("id"));
    }

    #[test]
    fn test_plan_access() {
        let owner = User::new("u1", "owner@example.com");
        let friend = User::new("u2", "friend@example.com");
        let stranger = User::new("u3", "stranger@example.com");

        let mut plan = Plan::for_owner(&owner, Utc::now());
        plan.shared_with.insert(&friend.email);

        assert!(plan.is_accessible_by(&owner));
        assert!(plan.is_accessible_by(&friend));
        assert!(!plan.is_owned_by(&friend));
        assert!(!plan.is_accessible_by(&stranger));
    }
}
