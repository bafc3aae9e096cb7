//! Sharing manager - edits a plan's collaborator list
//!
//! Both operations read the plan, change the collaborator set in memory and
//! write the whole `sharedWith` field back. Two sessions editing the same
//! plan at once can therefore lose one of the edits (last write wins).

use std::sync::Arc;

use crate::domain::plan::fields as plan_fields;
use crate::domain::result::{Error, Result};
use crate::domain::{Plan, SharedWith, PLANS_COLLECTION};
use crate::ports::{Document, DocumentStore};
use crate::services::normalizer;

/// Sharing manager
pub struct SharingManager {
    store: Arc<dyn DocumentStore>,
}

impl SharingManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Current collaborators of a plan
    pub async fn collaborators(&self, plan_id: &str) -> Result<SharedWith> {
        Ok(self.load_plan(plan_id).await?.shared_with)
    }

    /// Grant `email` access to the plan
    ///
    /// Adding an email that is already present changes nothing and writes
    /// nothing. Returns the resulting collaborator set.
    pub async fn add_collaborator(&self, plan_id: &str, email: &str) -> Result<SharedWith> {
        if email.trim().is_empty() {
            return Err(Error::validation("collaborator email is required"));
        }

        let mut plan = self.load_plan(plan_id).await?;
        if normalizer::is_owner_email(&plan, email) {
            return Err(Error::validation("a plan cannot be shared with its owner"));
        }
        if !plan.shared_with.insert(email) {
            tracing::debug!(plan_id, "collaborator already present");
            return Ok(plan.shared_with);
        }

        self.write_shared_with(&plan).await?;
        tracing::info!(plan_id, count = plan.shared_with.len(), "collaborator added");
        Ok(plan.shared_with)
    }

    /// Revoke `email`'s access. Removing an absent email is a no-op.
    pub async fn remove_collaborator(&self, plan_id: &str, email: &str) -> Result<SharedWith> {
        let mut plan = self.load_plan(plan_id).await?;
        if !plan.shared_with.remove(email) {
            tracing::debug!(plan_id, "collaborator not present");
            return Ok(plan.shared_with);
        }

        self.write_shared_with(&plan).await?;
        tracing::info!(plan_id, count = plan.shared_with.len(), "collaborator removed");
        Ok(plan.shared_with)
    }

    async fn load_plan(&self, plan_id: &str) -> Result<Plan> {
        let raw = self
            .store
            .get_by_id(PLANS_COLLECTION, plan_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("plan {}", plan_id)))?;
        Ok(normalizer::normalize_plan(&raw)?)
    }

    /// Replace the whole field
    async fn write_shared_with(&self, plan: &Plan) -> Result<()> {
        let mut fields = Document::new();
        fields.insert(plan_fields::SHARED_WITH.into(), plan.shared_with.to_value());
        self.store
            .update(PLANS_COLLECTION, &plan.id, fields)
            .await
            .inspect_err(|e| {
                tracing::warn!(plan_id = %plan.id, error = %e, "failed to update collaborators")
            })
    }
}
