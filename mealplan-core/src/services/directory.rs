//! Plan directory - live view of the plans a user can work on
//!
//! Independent live queries (plans the user owns, plans shared with the
//! user's email) are merged latest-of-all. Every update from any side
//! recomposes the whole state from the most recent snapshots, so the order in
//! which the queries deliver does not matter.
//!
//! Plans shared before `sharedWith` became an array hold a `{email: true}`
//! map until their owner signs in and `ensure_plan` rewrites them. A second
//! shared query matches that shape so those plans stay visible meanwhile.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::plan::{canonical_email, fields as plan_fields};
use crate::domain::result::{Error, Result};
use crate::domain::{Plan, SharedWith, User, PLANS_COLLECTION};
use crate::ports::{DocumentStore, Filter, StoredDocument};
use crate::services::normalizer;

/// A plan as listed for the current user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePlan {
    pub plan: Plan,
    pub is_owner: bool,
}

/// Composed directory state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryState {
    pub active_plan_id: Option<String>,
    /// Owned plans first, then shared plans, each in query order
    pub available_plans: Vec<AvailablePlan>,
    /// Collaborators of the active plan
    pub shared_with: SharedWith,
}

impl DirectoryState {
    pub fn active_plan(&self) -> Option<&AvailablePlan> {
        let active = self.active_plan_id.as_deref()?;
        self.available_plans.iter().find(|p| p.plan.id == active)
    }

    pub fn find(&self, plan_id: &str) -> Option<&AvailablePlan> {
        self.available_plans.iter().find(|p| p.plan.id == plan_id)
    }
}

/// Merge owned and shared plans into a directory state
///
/// A selection that is still listed is kept. Otherwise the first listed
/// plan becomes active (owned plans are listed first), or none.
pub fn compose(owned: &[Plan], shared: &[Plan], previous_active: Option<&str>) -> DirectoryState {
    let mut available_plans: Vec<AvailablePlan> = owned
        .iter()
        .map(|plan| AvailablePlan {
            plan: plan.clone(),
            is_owner: true,
        })
        .collect();
    for plan in shared {
        if available_plans.iter().any(|p| p.plan.id == plan.id) {
            continue;
        }
        available_plans.push(AvailablePlan {
            plan: plan.clone(),
            is_owner: false,
        });
    }

    let active = previous_active
        .and_then(|id| available_plans.iter().find(|p| p.plan.id == id))
        .or_else(|| available_plans.first());

    DirectoryState {
        active_plan_id: active.map(|p| p.plan.id.clone()),
        shared_with: active.map(|p| p.plan.shared_with.clone()).unwrap_or_default(),
        available_plans,
    }
}

/// Live plan directory for one user
///
/// Dropping (or closing) the directory cancels both live queries.
pub struct PlanDirectory {
    user: User,
    state: Arc<watch::Sender<DirectoryState>>,
    task: JoinHandle<()>,
}

impl PlanDirectory {
    /// Subscribe to the user's owned and shared plans
    ///
    /// The initial state is composed before this returns.
    pub async fn open(store: Arc<dyn DocumentStore>, user: User) -> Result<Self> {
        let mut owned = store
            .subscribe(
                PLANS_COLLECTION,
                vec![Filter::eq(plan_fields::OWNER_USER_ID, user.id.as_str())],
            )
            .await?;
        let [shared_filters, legacy_filters] = shared_plan_filters(&user.email);
        let mut shared = store.subscribe(PLANS_COLLECTION, shared_filters).await?;
        let mut legacy = store.subscribe(PLANS_COLLECTION, legacy_filters).await?;

        let (sender, _) = watch::channel(DirectoryState::default());
        let state = Arc::new(sender);

        let mut owned_plans = read_plans(&owned.latest());
        let mut shared_plans = shared_only(read_plans(&shared.latest()), &user);
        let mut legacy_plans = shared_only(read_plans(&legacy.latest()), &user);
        recompose(&state, &owned_plans, &shared_plans, &legacy_plans);

        let task_state = Arc::clone(&state);
        let task_user = user.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    alive = owned.changed() => {
                        if !alive {
                            break;
                        }
                        owned_plans = read_plans(&owned.latest());
                    }
                    alive = shared.changed() => {
                        if !alive {
                            break;
                        }
                        shared_plans = shared_only(read_plans(&shared.latest()), &task_user);
                    }
                    alive = legacy.changed() => {
                        if !alive {
                            break;
                        }
                        legacy_plans = shared_only(read_plans(&legacy.latest()), &task_user);
                    }
                }
                recompose(&task_state, &owned_plans, &shared_plans, &legacy_plans);
            }
            tracing::debug!(user_id = %task_user.id, "plan directory stopped");
        });

        tracing::debug!(user_id = %user.id, "plan directory opened");
        Ok(Self { user, state, task })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Current state
    pub fn state(&self) -> DirectoryState {
        self.state.borrow().clone()
    }

    pub fn active_plan_id(&self) -> Option<String> {
        self.state.borrow().active_plan_id.clone()
    }

    /// Receive every recomposed state
    pub fn subscribe(&self) -> watch::Receiver<DirectoryState> {
        self.state.subscribe()
    }

    /// Make a listed plan the active one
    pub fn select_plan(&self, plan_id: &str) -> Result<()> {
        let mut found = false;
        self.state.send_if_modified(|state| {
            let Some(shared_with) = state.find(plan_id).map(|p| p.plan.shared_with.clone()) else {
                return false;
            };
            found = true;
            if state.active_plan_id.as_deref() == Some(plan_id) {
                return false;
            }
            state.shared_with = shared_with;
            state.active_plan_id = Some(plan_id.to_string());
            true
        });

        if found {
            tracing::info!(user_id = %self.user.id, plan_id, "active plan selected");
            Ok(())
        } else {
            Err(Error::not_found(format!("plan {} is not available", plan_id)))
        }
    }

    /// Stop following plan changes
    pub fn close(self) {}
}

impl Drop for PlanDirectory {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Queries for plans shared with `email`: the array shape, then the legacy map shape
pub(crate) fn shared_plan_filters(email: &str) -> [Vec<Filter>; 2] {
    let email = canonical_email(email);
    [
        vec![Filter::array_contains(plan_fields::SHARED_WITH, email.as_str())],
        vec![Filter::map_field_eq(plan_fields::SHARED_WITH, &email, true)],
    ]
}

fn recompose(
    state: &watch::Sender<DirectoryState>,
    owned: &[Plan],
    shared: &[Plan],
    legacy: &[Plan],
) {
    let shared: Vec<Plan> = shared.iter().chain(legacy).cloned().collect();
    state.send_if_modified(|current| {
        let next = compose(owned, &shared, current.active_plan_id.as_deref());
        if *current == next {
            return false;
        }
        if current.active_plan_id != next.active_plan_id {
            tracing::debug!(
                from = ?current.active_plan_id,
                to = ?next.active_plan_id,
                "active plan changed"
            );
        }
        *current = next;
        true
    });
}

fn read_plans(docs: &[StoredDocument]) -> Vec<Plan> {
    docs.iter()
        .filter_map(|doc| match normalizer::normalize_plan(doc) {
            Ok(plan) => Some(plan),
            Err(e) => {
                tracing::warn!(plan_id = %doc.id, error = %e, "skipping invalid plan");
                None
            }
        })
        .collect()
}

fn shared_only(plans: Vec<Plan>, user: &User) -> Vec<Plan> {
    plans.into_iter().filter(|p| !p.is_owned_by(user)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plan(id: &str, owner: &str) -> Plan {
        let mut plan = Plan::for_owner(&User::new(owner, format!("{}@x.com", owner)), Utc::now());
        plan.id = id.to_string();
        plan
    }

    fn ids(state: &DirectoryState) -> Vec<(&str, bool)> {
        state
            .available_plans
            .iter()
            .map(|p| (p.plan.id.as_str(), p.is_owner))
            .collect()
    }

    #[test]
    fn test_owned_plans_listed_first() {
        let state = compose(&[plan("mine", "u1")], &[plan("s1", "u2"), plan("s2", "u3")], None);
        assert_eq!(ids(&state), vec![("mine", true), ("s1", false), ("s2", false)]);
        assert_eq!(state.active_plan_id.as_deref(), Some("mine"));
    }

    #[test]
    fn test_falls_back_to_first_shared_plan() {
        let state = compose(&[], &[plan("s1", "u2"), plan("s2", "u3")], None);
        assert_eq!(state.active_plan_id.as_deref(), Some("s1"));
        assert!(!state.active_plan().unwrap().is_owner);
    }

    #[test]
    fn test_selection_is_sticky() {
        let shared = [plan("s1", "u2")];
        let state = compose(&[plan("mine", "u1")], &shared, Some("s1"));
        assert_eq!(state.active_plan_id.as_deref(), Some("s1"));

        // A third plan appearing does not move the selection
        let state = compose(&[plan("mine", "u1")], &[plan("s0", "u4"), plan("s1", "u2")], Some("s1"));
        assert_eq!(state.active_plan_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_revoked_selection_falls_back() {
        let state = compose(&[plan("mine", "u1")], &[], Some("s1"));
        assert_eq!(state.active_plan_id.as_deref(), Some("mine"));

        let state = compose(&[], &[], Some("s1"));
        assert_eq!(state, DirectoryState::default());
    }

    #[test]
    fn test_active_shared_with_follows_selection() {
        let mut shared_plan = plan("s1", "u2");
        shared_plan.shared_with.insert("u1@x.com");
        let state = compose(&[plan("mine", "u1")], &[shared_plan], Some("s1"));
        assert!(state.shared_with.contains("u1@x.com"));
    }

    #[tokio::test]
    async fn test_directory_follows_store() {
        use crate::adapters::memory::MemoryDocumentStore;
        use std::time::Duration;

        let store = Arc::new(MemoryDocumentStore::new());
        let me = User::new("u1", "u1@x.com");
        let directory = PlanDirectory::open(store.clone(), me.clone()).await.unwrap();
        assert_eq!(directory.state(), DirectoryState::default());

        let mut theirs = plan("", "u2");
        theirs.shared_with.insert("U1@x.com");
        let id = store.insert(PLANS_COLLECTION, theirs.to_fields()).await.unwrap();

        let mut changes = directory.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            changes.wait_for(|s| s.active_plan_id.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(state.active_plan_id.as_deref(), Some(id.as_str()));
        assert!(!state.available_plans[0].is_owner);

        assert!(directory.select_plan("nope").is_err());
        assert_eq!(store.subscriber_count(), 3);
        directory.close();
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_lists_plans_still_shared_as_a_map() {
        use crate::adapters::memory::MemoryDocumentStore;
        use crate::services::SharedMealsService;

        let store = Arc::new(MemoryDocumentStore::new());
        let legacy = serde_json::json!({
            "ownerUserId": "u2",
            "ownerEmail": "u2@x.com",
            "name": "Family",
            "sharedWith": {"u1@x.com": true},
            "createdAt": "2024-01-01T00:00:00.000Z",
        });
        let id = store
            .insert(PLANS_COLLECTION, legacy.as_object().cloned().unwrap())
            .await
            .unwrap();

        let me = User::new("u1", "u1@x.com");
        let directory = PlanDirectory::open(store.clone(), me.clone()).await.unwrap();
        let listed: Vec<String> = directory
            .state()
            .available_plans
            .iter()
            .map(|p| p.plan.id.clone())
            .collect();
        assert_eq!(listed, vec![id.clone()]);

        // The shared meals view agrees with the directory
        let content = SharedMealsService::new(store).load(&me).await.unwrap();
        let shown: Vec<String> = content.plans.iter().map(|p| p.id.clone()).collect();
        assert_eq!(shown, listed);
    }

    #[test]
    fn test_compose_is_repeatable() {
        let owned = [plan("mine", "u1")];
        let shared = [plan("s1", "u2")];
        let first = compose(&owned, &shared, None);
        let second = compose(&owned, &shared, first.active_plan_id.as_deref());
        assert_eq!(first, second);
    }
}
