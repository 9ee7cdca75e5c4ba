//! Per-user favorite events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::StoreError;

/// A favorited event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    /// Owning user.
    pub user_id: String,
    /// Favorited event.
    pub event_id: String,
    /// When the favorite was added.
    pub created_at: DateTime<Utc>,
}

/// Favorites kept in a sled tree keyed `user_id/event_id`.
pub struct FavoriteStore {
    tree: sled::Tree,
}

impl FavoriteStore {
    /// Open the favorites tree in an existing database.
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be opened.
    pub fn with_db(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            tree: db.open_tree("favorites")?,
        })
    }

    fn key(user_id: &str, event_id: &str) -> String {
        format!("{user_id}/{event_id}")
    }

    /// Add a favorite.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the user already favorited this event.
    pub fn add(&self, user_id: &str, event_id: &str) -> Result<Favorite, StoreError> {
        let favorite = Favorite {
            user_id: user_id.to_string(),
            event_id: event_id.to_string(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_vec(&favorite)?;
        let key = Self::key(user_id, event_id);

        self.tree
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value))?
            .map_err(|_| StoreError::Duplicate(key))?;

        Ok(favorite)
    }

    /// All favorites of a user.
    ///
    /// # Errors
    ///
    /// Returns error on storage failure.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Favorite>, StoreError> {
        self.tree
            .scan_prefix(format!("{user_id}/").as_bytes())
            .values()
            .map(|value| Ok(serde_json::from_slice(&value?)?))
            .collect()
    }

    /// Remove one favorite.
    ///
    /// # Errors
    ///
    /// `NotFound` if it did not exist.
    pub fn remove(&self, user_id: &str, event_id: &str) -> Result<(), StoreError> {
        let key = Self::key(user_id, event_id);
        match self.tree.remove(key.as_bytes())? {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key)),
        }
    }

    /// Remove every favorite of a user. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns error on storage failure.
    pub fn remove_all_for_user(&self, user_id: &str) -> Result<usize, StoreError> {
        let keys = self
            .tree
            .scan_prefix(format!("{user_id}/").as_bytes())
            .keys()
            .collect::<Result<Vec<_>, _>>()?;

        for key in &keys {
            self.tree.remove(key)?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FavoriteStore) {
        let dir = TempDir::new().unwrap();
        let db = sled::open(dir.path()).unwrap();
        (dir, FavoriteStore::with_db(&db).unwrap())
    }

    #[test]
    fn test_add_and_list() {
        let (_dir, favorites) = store();
        favorites.add("u1", "e1").unwrap();
        favorites.add("u1", "e2").unwrap();
        favorites.add("u2", "e1").unwrap();

        let events: Vec<_> = favorites
            .list_for_user("u1")
            .unwrap()
            .into_iter()
            .map(|f| f.event_id)
            .collect();
        assert_eq!(events, vec!["e1", "e2"]);
    }

    #[test]
    fn test_prefix_does_not_leak_between_users() {
        let (_dir, favorites) = store();
        favorites.add("u1", "e1").unwrap();
        favorites.add("u10", "e1").unwrap();

        assert_eq!(favorites.list_for_user("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_and_remove() {
        let (_dir, favorites) = store();
        favorites.add("u1", "e1").unwrap();
        assert!(matches!(
            favorites.add("u1", "e1"),
            Err(StoreError::Duplicate(_))
        ));

        favorites.remove("u1", "e1").unwrap();
        assert!(matches!(
            favorites.remove("u1", "e1"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_all_for_user() {
        let (_dir, favorites) = store();
        favorites.add("u1", "e1").unwrap();
        favorites.add("u1", "e2").unwrap();
        favorites.add("u2", "e1").unwrap();

        assert_eq!(favorites.remove_all_for_user("u1").unwrap(), 2);
        assert!(favorites.list_for_user("u1").unwrap().is_empty());
        assert_eq!(favorites.list_for_user("u2").unwrap().len(), 1);
    }
}
