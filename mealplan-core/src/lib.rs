//! Mealplan Core - Business logic for a shared weekly meal planner
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Plan, Meal, SharedWith, Week, etc.)
//! - **ports**: Trait definitions for external dependencies (DocumentStore, AuthProvider)
//! - **services**: Business logic orchestration (normalization, plan migration,
//!   plan directory, meals, sharing)
//! - **adapters**: Concrete implementations (DuckDB, in-memory, local auth)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;
pub mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbDocumentStore;
use adapters::local_auth::LocalAuthProvider;
use config::Config;
use ports::{AuthProvider, DocumentStore};
use services::*;

// Re-export commonly used types at crate root
pub use domain::{Meal, MealCategory, MealDraft, MealUpdate, Plan, SharedWith, User, Week};
pub use domain::result::{AuthError, AuthErrorKind, Error, OperationResult, ValidationError};
pub use session::{Session, SessionManager};

/// Database file inside the data directory
pub const DB_FILENAME: &str = "mealplan.duckdb";

/// Main context for meal planner operations
///
/// Holds the configuration, the document store, the auth provider and the
/// services that work without a session.
pub struct MealPlanContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub store: Arc<DuckDbDocumentStore>,
    pub auth: Arc<LocalAuthProvider>,
    pub doctor_service: DoctorService,
    pub shared_meals_service: SharedMealsService,
}

impl MealPlanContext {
    /// Open the data directory, creating the database on first use
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;

        let db_path = data_dir.join(DB_FILENAME);
        let store = Arc::new(
            DuckDbDocumentStore::new(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        let shared: Arc<dyn DocumentStore> = store.clone();

        let auth = Arc::new(LocalAuthProvider::new(Arc::clone(&shared)));
        let doctor_service = DoctorService::new(Arc::clone(&shared));
        let shared_meals_service = SharedMealsService::new(shared);

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            store,
            auth,
            doctor_service,
            shared_meals_service,
        })
    }

    /// A session manager bound to this context's store and auth provider
    pub fn sessions(&self) -> SessionManager {
        let store: Arc<dyn DocumentStore> = self.store.clone();
        let auth: Arc<dyn AuthProvider> = self.auth.clone();
        SessionManager::new(store, auth)
    }

    /// The user remembered in settings, if the account is still usable
    pub async fn restore_user(&self) -> Result<Option<User>> {
        let Some(user) = self.config.session_user.clone() else {
            return Ok(None);
        };
        if self.auth.restore(&user).await? {
            Ok(Some(user))
        } else {
            tracing::warn!(user_id = %user.id, "stored session is no longer valid");
            Ok(None)
        }
    }

    /// Persist the signed-in user and active plan
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.data_dir)
    }
}
