use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use super::Entity;
use crate::backend::BackendError;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("invalid update: {0}")]
    InvalidPatch(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// CRUD over one entity type. Updates are shallow JSON merge patches; the
/// `id` key of a patch is ignored.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    async fn list(&self) -> Result<Vec<T>, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Option<T>, RepositoryError>;

    async fn insert(&self, item: T) -> Result<T, RepositoryError>;

    async fn update(&self, id: &str, patch: Value) -> Result<T, RepositoryError>;

    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;
}

/// Process-local repository. Contents are lost on restart.
pub struct InMemoryRepository<T> {
    items: RwLock<HashMap<String, T>>,
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|i| (i.id().to_owned(), i)).collect()),
        }
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlays the keys of `patch` onto `target`, skipping `id`.
fn merge_patch(target: &mut Value, patch: Value) -> Result<(), RepositoryError> {
    let (Value::Object(target), Value::Object(patch)) = (target, patch) else {
        return Err(RepositoryError::InvalidPatch("patch must be a JSON object".to_owned()));
    };
    for (key, value) in patch {
        if key != "id" {
            target.insert(key, value);
        }
    }
    Ok(())
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    async fn list(&self) -> Result<Vec<T>, RepositoryError> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn insert(&self, item: T) -> Result<T, RepositoryError> {
        let mut items = self.items.write().await;
        if items.contains_key(item.id()) {
            return Err(RepositoryError::Conflict(item.id().to_owned()));
        }
        items.insert(item.id().to_owned(), item.clone());
        Ok(item)
    }

    async fn update(&self, id: &str, patch: Value) -> Result<T, RepositoryError> {
        let mut items = self.items.write().await;
        let current = items
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_owned()))?;

        let mut value = serde_json::to_value(current).map_err(|e| RepositoryError::InvalidPatch(e.to_string()))?;
        merge_patch(&mut value, patch)?;
        let mut updated: T = serde_json::from_value(value).map_err(|e| RepositoryError::InvalidPatch(e.to_string()))?;
        updated.touch(Utc::now());

        items.insert(id.to_owned(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.items
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_owned()))
    }
}
