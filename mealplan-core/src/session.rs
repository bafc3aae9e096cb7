//! Application session - everything that lives while one user is signed in
//!
//! A `Session` owns the user's plan directory and the meal repository of
//! the active plan. Dropping it cancels every live query it opened.
//! `SessionManager` ties sessions to the authentication provider: sign-in
//! starts one, sign-out or a change of user tears it down.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::result::{Error, Result};
use crate::domain::{Plan, SharedWith, User};
use crate::ports::{AuthProvider, DocumentStore};
use crate::services::{
    DirectoryState, EnsuredPlan, MealRepository, PlanDirectory, PlanMigrationService, SharingManager,
};

/// A signed-in user's live state
pub struct Session {
    store: Arc<dyn DocumentStore>,
    user: User,
    ensured: EnsuredPlan,
    directory: PlanDirectory,
    meals: Option<MealRepository>,
    sharing: SharingManager,
}

impl Session {
    /// Ensure the user's plan, then open the live views
    ///
    /// A migration error is returned as is; nothing plan-dependent is opened.
    pub async fn start(store: Arc<dyn DocumentStore>, user: User) -> Result<Self> {
        let ensured = PlanMigrationService::new(Arc::clone(&store))
            .ensure_plan(&user)
            .await?;
        let directory = PlanDirectory::open(Arc::clone(&store), user.clone()).await?;

        let mut session = Self {
            sharing: SharingManager::new(Arc::clone(&store)),
            store,
            user,
            ensured,
            directory,
            meals: None,
        };
        session.meals().await?;
        tracing::info!(user_id = %session.user.id, "session started");
        Ok(session)
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// The plan this user owns
    pub fn owned_plan(&self) -> &Plan {
        &self.ensured.plan
    }

    /// What plan migration did when the session started
    pub fn migration(&self) -> &EnsuredPlan {
        &self.ensured
    }

    pub fn directory(&self) -> &PlanDirectory {
        &self.directory
    }

    pub fn state(&self) -> DirectoryState {
        self.directory.state()
    }

    pub fn sharing(&self) -> &SharingManager {
        &self.sharing
    }

    /// Switch the active plan and reopen the meal view on it
    pub async fn select_plan(&mut self, plan_id: &str) -> Result<()> {
        self.directory.select_plan(plan_id)?;
        self.meals().await?;
        Ok(())
    }

    /// Meals of the active plan, or None when no plan is available
    ///
    /// The repository follows the directory: when the active plan changed
    /// since the last call, the old live query is released and a new one
    /// opened.
    pub async fn meals(&mut self) -> Result<Option<&MealRepository>> {
        let active = self.directory.active_plan_id();
        let stale = match (&self.meals, &active) {
            (Some(repo), Some(plan_id)) => repo.plan_id() != plan_id,
            (None, None) => false,
            _ => true,
        };
        if stale {
            self.meals = None;
            if let Some(plan_id) = &active {
                let repo =
                    MealRepository::open(Arc::clone(&self.store), self.user.clone(), plan_id).await?;
                self.meals = Some(repo);
            }
        }
        Ok(self.meals.as_ref())
    }

    /// Add a collaborator to the active plan, which the user must own
    pub async fn share(&self, email: &str) -> Result<SharedWith> {
        let plan_id = self.owned_active_plan()?;
        self.sharing.add_collaborator(&plan_id, email).await
    }

    /// Remove a collaborator from the active plan, which the user must own
    pub async fn unshare(&self, email: &str) -> Result<SharedWith> {
        let plan_id = self.owned_active_plan()?;
        self.sharing.remove_collaborator(&plan_id, email).await
    }

    fn owned_active_plan(&self) -> Result<String> {
        let state = self.directory.state();
        match state.active_plan() {
            Some(active) if active.is_owner => Ok(active.plan.id.clone()),
            Some(_) => Err(Error::validation("only the plan owner can change sharing")),
            None => Err(Error::not_found("no active plan")),
        }
    }

    /// End the session, releasing every live query
    pub fn close(self) {
        tracing::info!(user_id = %self.user.id, "session closed");
    }
}

/// Starts and stops sessions as the authenticated user changes
pub struct SessionManager {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    auth_changes: watch::Receiver<Option<User>>,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn DocumentStore>, auth: Arc<dyn AuthProvider>) -> Self {
        let auth_changes = auth.subscribe();
        Self {
            store,
            auth,
            auth_changes,
            current: None,
        }
    }

    pub fn session(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<&mut Session> {
        let user = self.auth.sign_in(email, password).await?;
        self.start(user).await
    }

    /// Create the account and its plan right away
    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<&mut Session> {
        let user = self.auth.sign_up(email, password).await?;
        self.start(user).await
    }

    pub async fn sign_out(&mut self) {
        if let Some(session) = self.current.take() {
            session.close();
        }
        self.auth.sign_out().await;
        self.auth_changes.borrow_and_update();
    }

    /// Follow the authentication provider
    ///
    /// If the signed-in user changed since the last call, the current
    /// session is torn down and, when someone is signed in, a new one is
    /// started for them.
    pub async fn sync(&mut self) -> Result<Option<&mut Session>> {
        let user = self.auth_changes.borrow_and_update().clone();
        let current_user = self.current.as_ref().map(|s| s.user().clone());
        if user != current_user {
            if let Some(session) = self.current.take() {
                session.close();
            }
            if let Some(user) = user {
                self.start(user).await?;
            }
        }
        Ok(self.current.as_mut())
    }

    async fn start(&mut self, user: User) -> Result<&mut Session> {
        self.auth_changes.borrow_and_update();
        if let Some(session) = self.current.take() {
            session.close();
        }
        let session = Session::start(Arc::clone(&self.store), user).await?;
        Ok(self.current.insert(session))
    }
}
