use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use std::sync::Mutex;

/// Credential store kept in process memory. Every per-user mutation runs under
/// the shard write lock of that user's entry, which makes compare-and-swap
/// linearizable per user without any cross-user locking.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: DashMap<UserId, CredentialRecord>,
    by_username: DashMap<String, UserId>,
    by_email: DashMap<String, UserId>,
    // serializes the uniqueness check across both indexes
    create_lock: Mutex<()>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, record: CredentialRecord) -> Result<(), AuthError> {
        let _guard = self
            .create_lock
            .lock()
            .map_err(|e| AuthError::Store(e.to_string()))?;

        if self.by_username.contains_key(&record.username)
            || self.by_email.contains_key(&record.email)
        {
            return Err(AuthError::UserExists);
        }

        self.by_username
            .insert(record.username.clone(), record.user_id);
        self.by_email.insert(record.email.clone(), record.user_id);
        self.records.insert(record.user_id, record);
        Ok(())
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<CredentialRecord>, AuthError> {
        let user_id = username
            .and_then(|u| self.by_username.get(u).map(|id| *id))
            .or_else(|| email.and_then(|e| self.by_email.get(e).map(|id| *id)));

        Ok(user_id.and_then(|id| self.records.get(&id).map(|r| r.clone())))
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.records.get(&user_id).map(|r| r.clone()))
    }

    async fn set_refresh_token(
        &self,
        user_id: UserId,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError> {
        if let Some(mut record) = self.records.get_mut(&user_id) {
            record.refresh_token = refresh_token.map(str::to_owned);
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        new: &str,
    ) -> Result<bool, AuthError> {
        let Some(mut record) = self.records.get_mut(&user_id) else {
            return Ok(false);
        };
        if record.refresh_token.as_deref() != Some(expected) {
            return Ok(false);
        }
        record.refresh_token = Some(new.to_owned());
        Ok(true)
    }

    async fn swap_password_hash(
        &self,
        user_id: UserId,
        expected: &str,
        new: &str,
    ) -> Result<bool, AuthError> {
        let Some(mut record) = self.records.get_mut(&user_id) else {
            return Ok(false);
        };
        if record.password_hash != expected {
            return Ok(false);
        }
        record.password_hash = new.to_owned();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(username: &str, email: &str) -> CredentialRecord {
        CredentialRecord {
            user_id: UserId::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            full_name: "Test User".to_string(),
            password_hash: "hash-0".to_string(),
            refresh_token: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected() {
        let store = MemoryCredentialStore::new();
        store.create(record("alice", "alice@example.com")).await.unwrap();

        let same_name = store.create(record("alice", "other@example.com")).await;
        assert!(matches!(same_name, Err(AuthError::UserExists)));
        let same_mail = store.create(record("bob", "alice@example.com")).await;
        assert!(matches!(same_mail, Err(AuthError::UserExists)));
    }

    #[tokio::test]
    async fn lookup_by_username_then_email() {
        let store = MemoryCredentialStore::new();
        let alice = record("alice", "alice@example.com");
        let id = alice.user_id;
        store.create(alice).await.unwrap();

        let by_name = store
            .find_by_username_or_email(Some("alice"), None)
            .await
            .unwrap();
        assert_eq!(by_name.map(|r| r.user_id), Some(id));

        let by_mail = store
            .find_by_username_or_email(Some("nobody"), Some("alice@example.com"))
            .await
            .unwrap();
        assert_eq!(by_mail.map(|r| r.user_id), Some(id));

        let missing = store
            .find_by_username_or_email(None, Some("ghost@example.com"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn swap_refresh_token_only_on_match() {
        let store = MemoryCredentialStore::new();
        let alice = record("alice", "alice@example.com");
        let id = alice.user_id;
        store.create(alice).await.unwrap();

        assert!(!store.swap_refresh_token(id, "r0", "r1").await.unwrap());

        store.set_refresh_token(id, Some("r1")).await.unwrap();
        assert!(store.swap_refresh_token(id, "r1", "r2").await.unwrap());
        assert!(!store.swap_refresh_token(id, "r1", "r3").await.unwrap());

        let stored = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("r2"));

        store.set_refresh_token(id, None).await.unwrap();
        let stored = store.find_by_id(id).await.unwrap().unwrap();
        assert!(stored.refresh_token.is_none());
    }

    #[tokio::test]
    async fn swap_password_hash_only_on_match() {
        let store = MemoryCredentialStore::new();
        let alice = record("alice", "alice@example.com");
        let id = alice.user_id;
        store.create(alice).await.unwrap();

        assert!(!store.swap_password_hash(id, "stale", "hash-1").await.unwrap());
        assert!(store.swap_password_hash(id, "hash-0", "hash-1").await.unwrap());

        let stored = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "hash-1");
    }

    #[tokio::test]
    async fn unknown_user_is_never_swapped() {
        let store = MemoryCredentialStore::new();
        let ghost = UserId::new_v4();
        assert!(!store.swap_refresh_token(ghost, "a", "b").await.unwrap());
        store.set_refresh_token(ghost, None).await.unwrap();
        assert!(store.find_by_id(ghost).await.unwrap().is_none());
    }
}
