//! Local authentication provider
//!
//! Keeps credentials in the document store (`credentials` collection) with
//! Argon2id password hashes. The user id is the credential document id.
//! Failed sign-ins are counted on the credential document, so throttling
//! holds across processes.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use tokio::sync::watch;

use crate::domain::plan::{canonical_email, format_timestamp};
use crate::domain::result::{Error, Result};
use crate::domain::{AuthError, AuthErrorKind, User};
use crate::ports::{AuthProvider, DocumentStore, Filter, StoredDocument};

/// Collection holding credential documents
pub const CREDENTIALS_COLLECTION: &str = "credentials";

/// Consecutive failed sign-ins before an email is throttled
const MAX_FAILED_ATTEMPTS: u64 = 5;

const FAILED_ATTEMPTS: &str = "failedAttempts";

/// Shortest accepted password
const MIN_PASSWORD_LEN: usize = 6;

/// Authentication against credentials stored next to the plan data
pub struct LocalAuthProvider {
    store: Arc<dyn DocumentStore>,
    current: watch::Sender<Option<User>>,
    email_pattern: Regex,
}

impl LocalAuthProvider {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            store,
            current,
            // Shape check only; deliverability is not our concern
            email_pattern: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"),
        }
    }

    /// Re-establish a session persisted by a previous process
    ///
    /// Returns false (and stays signed out) if the account no longer exists
    /// or has been disabled.
    pub async fn restore(&self, user: &User) -> Result<bool> {
        let valid = match self.store.get_by_id(CREDENTIALS_COLLECTION, &user.id).await? {
            Some(doc) => !is_disabled(&doc) && doc.get_str("email") == Some(user.email.as_str()),
            None => false,
        };
        if valid {
            self.current.send_replace(Some(user.clone()));
        }
        Ok(valid)
    }

    /// Enable or disable an account
    pub async fn set_disabled(&self, email: &str, disabled: bool) -> Result<()> {
        let doc = self
            .find_credentials(&canonical_email(email))
            .await?
            .ok_or_else(|| Error::not_found(format!("account {}", email)))?;
        let mut fields = serde_json::Map::new();
        fields.insert("disabled".into(), JsonValue::Bool(disabled));
        self.store
            .update(CREDENTIALS_COLLECTION, &doc.id, fields)
            .await
    }

    fn check_email(&self, email: &str) -> std::result::Result<(), AuthError> {
        if self.email_pattern.is_match(email) {
            Ok(())
        } else {
            Err(AuthError::new(AuthErrorKind::InvalidEmail))
        }
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<StoredDocument>> {
        let docs = self
            .store
            .query(CREDENTIALS_COLLECTION, &[Filter::eq("email", email)])
            .await?;
        Ok(docs.into_iter().next())
    }

    /// Persist the failed sign-in counter
    ///
    /// A failed write is logged; the sign-in outcome stands regardless.
    async fn record_attempts(&self, doc_id: &str, attempts: u64) {
        let mut fields = serde_json::Map::new();
        fields.insert(FAILED_ATTEMPTS.into(), JsonValue::from(attempts));
        if let Err(e) = self.store.update(CREDENTIALS_COLLECTION, doc_id, fields).await {
            tracing::warn!(error = %e, "failed to record sign-in attempts");
        }
    }
}

fn is_disabled(doc: &StoredDocument) -> bool {
    doc.get("disabled").and_then(JsonValue::as_bool).unwrap_or(false)
}

fn failed_attempts(doc: &StoredDocument) -> u64 {
    doc.get(FAILED_ATTEMPTS).and_then(JsonValue::as_u64).unwrap_or(0)
}

fn hash_password(password: &str) -> std::result::Result<String, AuthError> {
    let salt_bytes: [u8; 16] = rand::thread_rng().gen();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AuthError::other(format!("failed to encode salt: {}", e)))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::other(format!("failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn store_failure(e: Error) -> AuthError {
    AuthError::other(e.to_string())
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<User, AuthError> {
        let email = canonical_email(email);
        self.check_email(&email)?;

        let doc = self
            .find_credentials(&email)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| AuthError::new(AuthErrorKind::UserNotFound))?;

        if is_disabled(&doc) {
            return Err(AuthError::new(AuthErrorKind::UserDisabled));
        }

        let attempts = failed_attempts(&doc);
        if attempts >= MAX_FAILED_ATTEMPTS {
            tracing::warn!(email = %email, "sign-in throttled");
            return Err(AuthError::new(AuthErrorKind::TooManyRequests));
        }

        let stored_hash = doc.get_str("passwordHash").unwrap_or_default();
        if !verify_password(password, stored_hash) {
            self.record_attempts(&doc.id, attempts + 1).await;
            return Err(AuthError::new(AuthErrorKind::WrongPassword));
        }

        if attempts > 0 {
            self.record_attempts(&doc.id, 0).await;
        }
        let user = User::new(doc.id, email);
        tracing::info!(user_id = %user.id, "signed in");
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> std::result::Result<User, AuthError> {
        let email = canonical_email(email);
        self.check_email(&email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::new(AuthErrorKind::WeakPassword));
        }

        if self
            .find_credentials(&email)
            .await
            .map_err(store_failure)?
            .is_some()
        {
            return Err(AuthError::new(AuthErrorKind::EmailAlreadyInUse));
        }

        let password_hash = hash_password(password)?;
        let body = json!({
            "email": email,
            "passwordHash": password_hash,
            "disabled": false,
            "failedAttempts": 0,
            "createdAt": format_timestamp(&Utc::now()),
        });
        let fields = body.as_object().cloned().unwrap_or_default();
        let id = self
            .store
            .insert(CREDENTIALS_COLLECTION, fields)
            .await
            .map_err(store_failure)?;

        let user = User::new(id, email);
        tracing::info!(user_id = %user.id, "signed up");
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) {
        if let Some(user) = self.current.send_replace(None) {
            tracing::info!(user_id = %user.id, "signed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDocumentStore;

    fn provider() -> LocalAuthProvider {
        LocalAuthProvider::new(Arc::new(MemoryDocumentStore::new()))
    }

    fn kind(result: std::result::Result<User, AuthError>) -> AuthErrorKind {
        result.unwrap_err().kind
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let auth = provider();
        let mut changes = auth.subscribe();

        let user = auth.sign_up("Cook@Example.com", "secret1").await.unwrap();
        assert_eq!(user.email, "cook@example.com");
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), Some(user.clone()));

        auth.sign_out().await;
        assert!(auth.current_user().is_none());

        let again = auth.sign_in("cook@example.com", "secret1").await.unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(auth.current_user(), Some(again));
    }

    #[tokio::test]
    async fn test_sign_up_errors() {
        let auth = provider();
        assert_eq!(kind(auth.sign_up("not-an-email", "secret1").await), AuthErrorKind::InvalidEmail);
        assert_eq!(kind(auth.sign_up("a@b.com", "123").await), AuthErrorKind::WeakPassword);

        auth.sign_up("a@b.com", "secret1").await.unwrap();
        assert_eq!(
            kind(auth.sign_up("a@b.com", "secret2").await),
            AuthErrorKind::EmailAlreadyInUse
        );
    }

    #[tokio::test]
    async fn test_sign_in_errors() {
        let auth = provider();
        assert_eq!(kind(auth.sign_in("nobody@b.com", "secret1").await), AuthErrorKind::UserNotFound);

        auth.sign_up("a@b.com", "secret1").await.unwrap();
        assert_eq!(kind(auth.sign_in("a@b.com", "wrong!").await), AuthErrorKind::WrongPassword);

        auth.set_disabled("a@b.com", true).await.unwrap();
        assert_eq!(kind(auth.sign_in("a@b.com", "secret1").await), AuthErrorKind::UserDisabled);
    }

    #[tokio::test]
    async fn test_repeated_failures_are_throttled() {
        let auth = provider();
        auth.sign_up("a@b.com", "secret1").await.unwrap();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            assert_eq!(kind(auth.sign_in("a@b.com", "nope!!").await), AuthErrorKind::WrongPassword);
        }
        assert_eq!(
            kind(auth.sign_in("a@b.com", "secret1").await),
            AuthErrorKind::TooManyRequests
        );
    }

    #[tokio::test]
    async fn test_throttling_survives_a_new_provider() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let first = LocalAuthProvider::new(Arc::clone(&store));
        first.sign_up("a@b.com", "secret1").await.unwrap();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            assert_eq!(kind(first.sign_in("a@b.com", "nope!!").await), AuthErrorKind::WrongPassword);
        }

        // Each `mp login` runs in a fresh process with its own provider
        let second = LocalAuthProvider::new(store);
        assert_eq!(
            kind(second.sign_in("a@b.com", "secret1").await),
            AuthErrorKind::TooManyRequests
        );
    }

    #[tokio::test]
    async fn test_success_resets_failed_attempts() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let auth = LocalAuthProvider::new(Arc::clone(&store));
        auth.sign_up("a@b.com", "secret1").await.unwrap();
        for _ in 0..MAX_FAILED_ATTEMPTS - 1 {
            auth.sign_in("a@b.com", "nope!!").await.unwrap_err();
        }
        auth.sign_in("a@b.com", "secret1").await.unwrap();

        let doc = auth.find_credentials("a@b.com").await.unwrap().unwrap();
        assert_eq!(failed_attempts(&doc), 0);

        let other = LocalAuthProvider::new(store);
        assert_eq!(kind(other.sign_in("a@b.com", "nope!!").await), AuthErrorKind::WrongPassword);
        assert!(other.sign_in("a@b.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn test_restore_session() {
        let auth = provider();
        let user = auth.sign_up("a@b.com", "secret1").await.unwrap();
        auth.sign_out().await;

        assert!(auth.restore(&user).await.unwrap());
        assert_eq!(auth.current_user(), Some(user.clone()));

        auth.sign_out().await;
        auth.set_disabled("a@b.com", true).await.unwrap();
        assert!(!auth.restore(&user).await.unwrap());
        assert!(auth.current_user().is_none());
    }
}
