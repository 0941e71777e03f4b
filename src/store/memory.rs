use async_trait::async_trait;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    check_lengths, hash_password, normalize_email, verify_password, CredentialStore, Principal,
};
use crate::error::{Error, Result, UserField};

#[derive(Debug, Clone)]
struct UserRecord {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    roles: Vec<String>,
    is_active: bool,
    last_login: Option<SystemTime>,
    number_of_logins: i64,
}

impl UserRecord {
    fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Users {
    next_id: i64,
    records: Vec<UserRecord>,
}

/// Process-local store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: Mutex<Users>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.lock().await.records.len()
    }

    pub async fn login_count(&self, user_id: i64) -> Option<i64> {
        self.users
            .lock()
            .await
            .records
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.number_of_logins)
    }

    pub async fn last_login(&self, user_id: i64) -> Option<SystemTime> {
        self.users
            .lock()
            .await
            .records
            .iter()
            .find(|user| user.id == user_id)
            .and_then(|user| user.last_login)
    }

    pub async fn set_active(&self, user_id: i64, active: bool) {
        if let Some(user) = self
            .users
            .lock()
            .await
            .records
            .iter_mut()
            .find(|user| user.id == user_id)
        {
            user.is_active = active;
        }
    }

    pub async fn grant_role(&self, user_id: i64, role: &str) {
        if let Some(user) = self
            .users
            .lock()
            .await
            .records
            .iter_mut()
            .find(|user| user.id == user_id)
        {
            if !user.roles.iter().any(|existing| existing == role) {
                user.roles.push(role.to_string());
            }
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<Principal>> {
        let email = normalize_email(email);
        let record = self
            .users
            .lock()
            .await
            .records
            .iter()
            .find(|user| user.email == email)
            .cloned();

        Ok(record
            .filter(|user| user.is_active && verify_password(password, &user.password_hash))
            .map(|user| user.principal()))
    }

    async fn exists(&self, field: UserField, value: &str) -> Result<bool> {
        let users = self.users.lock().await;
        Ok(match field {
            UserField::Username => users.records.iter().any(|user| user.username == value),
            UserField::Email => {
                let email = normalize_email(value);
                users.records.iter().any(|user| user.email == email)
            }
        })
    }

    async fn create(&self, username: &str, email: &str, password: &str) -> Result<Principal> {
        let email = normalize_email(email);
        check_lengths(username, &email)?;
        let password_hash = hash_password(password)?;

        let mut users = self.users.lock().await;
        if users.records.iter().any(|user| user.email == email) {
            return Err(Error::DuplicateField(UserField::Email));
        }
        if users.records.iter().any(|user| user.username == username) {
            return Err(Error::DuplicateField(UserField::Username));
        }

        users.next_id += 1;
        let record = UserRecord {
            id: users.next_id,
            username: username.to_string(),
            email,
            password_hash,
            roles: Vec::new(),
            is_active: true,
            last_login: None,
            number_of_logins: 0,
        };
        let principal = record.principal();
        users.records.push(record);

        debug!(user_id = principal.id, "Created user");

        Ok(principal)
    }

    async fn record_login(&self, user_id: i64) -> Result<()> {
        let mut users = self.users.lock().await;
        match users.records.iter_mut().find(|user| user.id == user_id) {
            Some(user) => {
                user.number_of_logins += 1;
                user.last_login = Some(SystemTime::now());
            }
            None => debug!(user_id, "Login recorded for unknown user"),
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_authenticate() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let created = store
            .create("alice", "Alice@Example.com", "password123")
            .await?;
        assert_eq!(created.email, "alice@example.com");

        let found = store.authenticate("alice@example.com", "password123").await?;
        assert_eq!(found, Some(created));

        assert!(store
            .authenticate("alice@example.com", "wrong-password")
            .await?
            .is_none());
        assert!(store
            .authenticate("nobody@example.com", "password123")
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn duplicates_are_rejected_without_new_rows() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store.create("alice", "alice@example.com", "password123").await?;

        assert!(matches!(
            store.create("alice2", "ALICE@example.com", "password123").await,
            Err(Error::DuplicateField(UserField::Email))
        ));
        assert!(matches!(
            store.create("alice", "other@example.com", "password123").await,
            Err(Error::DuplicateField(UserField::Username))
        ));
        assert_eq!(store.user_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn exists_checks_each_field() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store.create("alice", "alice@example.com", "password123").await?;

        assert!(store.exists(UserField::Username, "alice").await?);
        assert!(store.exists(UserField::Email, "ALICE@example.com").await?);
        assert!(!store.exists(UserField::Username, "bob").await?);
        Ok(())
    }

    #[tokio::test]
    async fn inactive_users_cannot_log_in() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let user = store.create("alice", "alice@example.com", "password123").await?;
        store.set_active(user.id, false).await;

        assert!(store
            .authenticate("alice@example.com", "password123")
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn record_login_increments_counter() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let user = store.create("alice", "alice@example.com", "password123").await?;

        assert!(store.last_login(user.id).await.is_none());

        store.record_login(user.id).await?;
        store.record_login(user.id).await?;
        assert_eq!(store.login_count(user.id).await, Some(2));
        assert!(store.last_login(user.id).await.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn granted_roles_show_up_on_authentication() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let user = store.create("alice", "alice@example.com", "password123").await?;
        store.grant_role(user.id, "admin").await;
        store.grant_role(user.id, "admin").await;

        let found = store.authenticate("alice@example.com", "password123").await?;
        assert_eq!(found.map(|p| p.roles), Some(vec!["admin".to_string()]));
        Ok(())
    }
}
