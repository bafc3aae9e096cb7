//! Configuration management
//!
//! Settings live in `settings.json` in the data directory:
//! ```json
//! {
//!   "app": { "activePlanId": "…", "logLevel": "info" },
//!   "session": { "id": "…", "email": "cook@example.com" }
//! }
//! ```
//! Keys this crate does not manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::User;

const SETTINGS_FILE: &str = "settings.json";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<User>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Meal planner configuration (simplified view of settings)
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// User signed in by the last `login`/`signup`
    pub session_user: Option<User>,
    /// Plan selected with `plan use`
    pub active_plan_id: Option<String>,
    /// Default tracing filter when MEALPLAN_LOG is unset
    pub log_level: Option<String>,
}

impl Config {
    /// Load config from the data directory
    ///
    /// A missing or unreadable settings file yields the defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(data_dir)?;
        Ok(Self {
            session_user: raw.session,
            active_plan_id: raw.app.active_plan_id,
            log_level: raw.app.log_level,
        })
    }

    /// Save config to the data directory
    /// Preserves other settings that the CLI doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let mut settings = read_settings(data_dir)?;

        settings.session = self.session_user.clone();
        settings.app.active_plan_id = self.active_plan_id.clone();
        settings.app.log_level = self.log_level.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }

    /// Remember a newly signed-in user; the active plan starts over
    pub fn sign_in(&mut self, user: User) {
        if self.session_user.as_ref() != Some(&user) {
            self.active_plan_id = None;
        }
        self.session_user = Some(user);
    }

    pub fn sign_out(&mut self) {
        self.session_user = None;
        self.active_plan_id = None;
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}
