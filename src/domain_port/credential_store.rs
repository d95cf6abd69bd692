use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    /// The single refresh token currently honored for this user. `None` means
    /// no active session.
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            created_at: self.created_at,
        }
    }
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new record. Fails with `UserExists` when the username or the
    /// email is already taken.
    async fn create(&self, record: CredentialRecord) -> Result<(), AuthError>;

    /// Look up by username first, then by email.
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<CredentialRecord>, AuthError>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<CredentialRecord>, AuthError>;

    /// Unconditionally overwrite (or clear) the stored refresh token.
    async fn set_refresh_token(
        &self,
        user_id: UserId,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError>;

    /// Atomically replace the stored refresh token with `new`, only if it still
    /// equals `expected`. Returns whether the swap happened.
    async fn swap_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        new: &str,
    ) -> Result<bool, AuthError>;

    /// Atomically replace the password hash, only if it still equals
    /// `expected`. Returns whether the swap happened.
    async fn swap_password_hash(
        &self,
        user_id: UserId,
        expected: &str,
        new: &str,
    ) -> Result<bool, AuthError>;
}
