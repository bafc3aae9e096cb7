//! Authentication port
//!
//! The provider issues a user identity (id + email) and notifies when the
//! signed-in user changes.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{AuthError, User};

/// Authentication provider trait
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, if any
    fn current_user(&self) -> Option<User>;

    /// Change notifications for the signed-in user
    fn subscribe(&self) -> watch::Receiver<Option<User>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn sign_out(&self);
}
