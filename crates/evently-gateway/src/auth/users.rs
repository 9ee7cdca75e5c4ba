//! User model and credential store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Credential store errors.
///
/// Kept independent of the storage engine; translated into `AuthError`
/// before reaching a client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique key already taken.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// Record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying storage failure.
    #[error("Storage error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("Serialization error: {err}"))
    }
}

/// User role for access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Regular account.
    User,
    /// Full administrative access.
    Admin,
}

impl UserRole {
    /// Check if this role has admin privileges.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "USER"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

/// A role name that is neither `USER` nor `ADMIN`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role '{0}', expected USER or ADMIN")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for UserRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Stored user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email, compared exactly.
    pub email: String,
    /// Argon2 password hash. `None` for accounts created through a provider.
    pub password_hash: Option<String>,
    /// Hash of the only refresh token currently accepted. `None` when signed out.
    pub refresh_token_hash: Option<String>,
    /// Access role.
    pub role: UserRole,
    /// Whether the user may own companies and publish events.
    pub is_creator: bool,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Sanitized view for API responses.
    #[must_use]
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            is_creator: self.is_creator,
            avatar: self.avatar.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Public user representation. Never carries credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    /// Unique user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Access role.
    pub role: UserRole,
    /// Creator flag.
    pub is_creator: bool,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Password hash, if the account has a password.
    pub password_hash: Option<String>,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Access role.
    pub role: UserRole,
    /// Creator flag.
    pub is_creator: bool,
}

impl NewUser {
    /// A regular, non-creator account.
    #[must_use]
    pub fn regular(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password_hash: None,
            avatar: None,
            role: UserRole::User,
            is_creator: false,
        }
    }
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New email.
    pub email: Option<String>,
    /// New password hash.
    pub password_hash: Option<String>,
    /// `Some(None)` signs the user out; `Some(Some(h))` installs a new hash.
    pub refresh_token_hash: Option<Option<String>>,
    /// New role.
    pub role: Option<UserRole>,
    /// New creator flag.
    pub is_creator: Option<bool>,
}

impl UserUpdate {
    /// Replace the stored refresh token hash.
    #[must_use]
    pub fn refresh_token_hash(hash: Option<String>) -> Self {
        Self {
            refresh_token_hash: Some(hash),
            ..Self::default()
        }
    }

    fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(hash) = self.password_hash {
            user.password_hash = Some(hash);
        }
        if let Some(hash) = self.refresh_token_hash {
            user.refresh_token_hash = hash;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(is_creator) = self.is_creator {
            user.is_creator = is_creator;
        }
        user.updated_at = Utc::now();
    }
}

/// Persistence for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by exact email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Find a user by ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Create a user. Fails with `Duplicate` if the email is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Apply a partial update and return the stored result.
    async fn update(&self, id: &str, changes: UserUpdate) -> Result<User, StoreError>;

    /// Delete a user. Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// List all users.
    async fn list(&self) -> Result<Vec<User>, StoreError>;
}

/// User store backed by sled.
///
/// Records live in the `users` tree; `users_by_email` maps each email to
/// its owner's ID and is written with compare-and-swap so two concurrent
/// registrations cannot both claim an address.
pub struct SledUserStore {
    users: sled::Tree,
    emails: sled::Tree,
}

impl SledUserStore {
    /// Open or create a user store under the given directory.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path.join("db"))?;
        Self::with_db(&db)
    }

    /// Create a user store with an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if trees cannot be opened.
    pub fn with_db(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            users: db.open_tree("users")?,
            emails: db.open_tree("users_by_email")?,
        })
    }

    /// Check if any users exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.users
            .get(id.as_bytes())?
            .map(|value| serde_json::from_slice(&value).map_err(StoreError::from))
            .transpose()
    }

    fn put(&self, user: &User) -> Result<(), StoreError> {
        let value = serde_json::to_vec(user)?;
        self.users.insert(user.id.as_bytes(), value)?;
        Ok(())
    }

    /// Point `email` at `id`, failing if another account holds it.
    fn claim_email(&self, email: &str, id: &str) -> Result<(), StoreError> {
        match self
            .emails
            .compare_and_swap(email.as_bytes(), None as Option<&[u8]>, Some(id.as_bytes()))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::Duplicate(email.to_string())),
        }
    }

    /// Drop the index entry for `email` if it still points at `id`.
    fn release_email(&self, email: &str, id: &str) -> Result<(), StoreError> {
        let _ = self.emails.compare_and_swap(
            email.as_bytes(),
            Some(id.as_bytes()),
            None as Option<&[u8]>,
        )?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.users.flush_async().await?;
        self.emails.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SledUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        match self.emails.get(email.as_bytes())? {
            Some(id) => self.get(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.get(id)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            refresh_token_hash: None,
            role: new_user.role,
            is_creator: new_user.is_creator,
            avatar: new_user.avatar,
            created_at: now,
            updated_at: now,
        };

        self.claim_email(&user.email, &user.id)?;
        if let Err(e) = self.put(&user) {
            self.emails.remove(user.email.as_bytes())?;
            return Err(e);
        }
        self.flush().await?;

        tracing::debug!(user_id = %user.id, "Created user");
        Ok(user)
    }

    async fn update(&self, id: &str, changes: UserUpdate) -> Result<User, StoreError> {
        // Compare-and-swap on the whole record, so a concurrent writer
        // never has its fields overwritten by a stale copy.
        let mut claimed: Option<String> = None;
        let user = loop {
            let Some(current) = self.users.get(id.as_bytes())? else {
                if let Some(email) = &claimed {
                    self.release_email(email, id)?;
                }
                return Err(StoreError::NotFound(id.to_string()));
            };

            let old: User = serde_json::from_slice(&current)?;
            let mut user = old.clone();
            changes.clone().apply(&mut user);

            if user.email != old.email && claimed.as_deref() != Some(user.email.as_str()) {
                self.claim_email(&user.email, id)?;
                claimed = Some(user.email.clone());
            }

            let next = serde_json::to_vec(&user)?;
            match self
                .users
                .compare_and_swap(id.as_bytes(), Some(&current), Some(next))?
            {
                Ok(()) => {
                    if user.email != old.email {
                        self.release_email(&old.email, id)?;
                    }
                    break user;
                }
                Err(_) => tracing::trace!(user_id = %id, "User changed concurrently, retrying"),
            }
        };

        self.flush().await?;
        Ok(user)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Some(user) = self.get(id)? else {
            return Ok(false);
        };

        self.emails.remove(user.email.as_bytes())?;
        let removed = self.users.remove(id.as_bytes())?.is_some();
        self.flush().await?;

        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        self.users
            .iter()
            .values()
            .map(|value| Ok(serde_json::from_slice(&value?)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SledUserStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledUserStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_keep_every_field() {
        let (_dir, store) = open_store();
        let store = std::sync::Arc::new(store);

        for round in 0..20 {
            let user = store
                .create(NewUser::regular("Racer", format!("racer{round}@x.com")))
                .await
                .unwrap();

            let updates = [
                UserUpdate::refresh_token_hash(Some(format!("hash-{round}"))),
                UserUpdate {
                    name: Some(format!("Renamed {round}")),
                    ..UserUpdate::default()
                },
                UserUpdate {
                    is_creator: Some(true),
                    ..UserUpdate::default()
                },
                UserUpdate {
                    role: Some(UserRole::Admin),
                    ..UserUpdate::default()
                },
            ];

            let tasks: Vec<_> = updates
                .into_iter()
                .map(|changes| {
                    let store = std::sync::Arc::clone(&store);
                    let id = user.id.clone();
                    tokio::spawn(async move { store.update(&id, changes).await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }

            let stored = store.find_by_id(&user.id).await.unwrap().unwrap();
            let expected_hash = format!("hash-{round}");
            assert_eq!(stored.refresh_token_hash.as_deref(), Some(expected_hash.as_str()));
            assert_eq!(stored.name, format!("Renamed {round}"));
            assert!(stored.is_creator);
            assert_eq!(stored.role, UserRole::Admin);
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (_dir, store) = open_store();
        assert!(store.is_empty());

        let user = store
            .create(NewUser::regular("Alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(!store.is_empty());
        assert_eq!(user.role, UserRole::User);
        assert!(!user.is_creator);
        assert!(user.refresh_token_hash.is_none());

        let by_id = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");

        let by_email = store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn test_email_is_case_sensitive() {
        let (_dir, store) = open_store();
        store
            .create(NewUser::regular("Alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(
            store
                .find_by_email("Alice@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (_dir, store) = open_store();
        let first = store
            .create(NewUser::regular("One", "dup@example.com"))
            .await
            .unwrap();

        let result = store.create(NewUser::regular("Two", "dup@example.com")).await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));

        let kept = store.find_by_email("dup@example.com").await.unwrap().unwrap();
        assert_eq!(kept.id, first.id);
        assert_eq!(kept.name, "One");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_hash_set_and_clear() {
        let (_dir, store) = open_store();
        let user = store
            .create(NewUser::regular("Bob", "bob@example.com"))
            .await
            .unwrap();

        let updated = store
            .update(&user.id, UserUpdate::refresh_token_hash(Some("h1".to_string())))
            .await
            .unwrap();
        assert_eq!(updated.refresh_token_hash.as_deref(), Some("h1"));

        let cleared = store
            .update(&user.id, UserUpdate::refresh_token_hash(None))
            .await
            .unwrap();
        assert!(cleared.refresh_token_hash.is_none());

        let untouched = store
            .update(
                &user.id,
                UserUpdate {
                    name: Some("Robert".to_string()),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(untouched.name, "Robert");
        assert!(untouched.refresh_token_hash.is_none());
    }

    #[tokio::test]
    async fn test_email_change_moves_index() {
        let (_dir, store) = open_store();
        let user = store
            .create(NewUser::regular("Carol", "carol@example.com"))
            .await
            .unwrap();
        store
            .create(NewUser::regular("Dave", "dave@example.com"))
            .await
            .unwrap();

        let taken = store
            .update(
                &user.id,
                UserUpdate {
                    email: Some("dave@example.com".to_string()),
                    ..UserUpdate::default()
                },
            )
            .await;
        assert!(matches!(taken, Err(StoreError::Duplicate(_))));

        store
            .update(
                &user.id,
                UserUpdate {
                    email: Some("carol@new.example".to_string()),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();

        assert!(store.find_by_email("carol@example.com").await.unwrap().is_none());
        let moved = store.find_by_email("carol@new.example").await.unwrap().unwrap();
        assert_eq!(moved.id, user.id);
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let (_dir, store) = open_store();
        let result = store.update("nope", UserUpdate::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_frees_email() {
        let (_dir, store) = open_store();
        let user = store
            .create(NewUser::regular("Eve", "eve@example.com"))
            .await
            .unwrap();

        assert!(store.delete(&user.id).await.unwrap());
        assert!(!store.delete(&user.id).await.unwrap());
        assert!(store.find_by_id(&user.id).await.unwrap().is_none());

        store
            .create(NewUser::regular("Eve again", "eve@example.com"))
            .await
            .unwrap();
    }

    #[test]
    fn test_user_roles() {
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::User.is_admin());
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!(UserRole::User.to_string(), "USER");
        assert_eq!(
            "operator".parse::<UserRole>(),
            Err(ParseRoleError("operator".to_string()))
        );
    }

    #[test]
    fn test_public_user_has_no_secrets() {
        let now = Utc::now();
        let user = User {
            id: "u1".to_string(),
            name: "Alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            refresh_token_hash: Some("$argon2id$refresh".to_string()),
            role: UserRole::User,
            is_creator: false,
            avatar: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(user.to_public()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("isCreator"));
        assert!(obj.keys().all(|k| !k.to_lowercase().contains("password")));
        assert!(obj.keys().all(|k| !k.to_lowercase().contains("refresh")));
        assert_eq!(json["role"], "USER");
    }
}
