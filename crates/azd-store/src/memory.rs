use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::environment::Environment;
use crate::error::StoreError;
use crate::store::EnvironmentStore;

#[derive(Debug, Default)]
struct Inner {
    environments: HashMap<String, Environment>,
    default: Option<String>,
    saves: usize,
}

/// In-memory implementation of [`EnvironmentStore`].
///
/// All data is lost on process exit. Suitable for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEnvironmentStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryEnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub async fn save_count(&self) -> usize {
        self.inner.read().await.saves
    }
}

#[async_trait]
impl EnvironmentStore for InMemoryEnvironmentStore {
    async fn get(&self, name: &str) -> Result<Option<Environment>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.environments.get(name).cloned())
    }

    async fn save(&self, env: &Environment) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.environments.insert(env.name().to_string(), env.clone());
        guard.saves += 1;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.inner.read().await;
        let mut names: Vec<String> = guard.environments.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.environments.remove(name);
        if guard.default.as_deref() == Some(name) {
            guard.default = None;
        }
        Ok(())
    }

    async fn default_environment(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.default.clone())
    }

    async fn set_default(&self, name: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.environments.contains_key(name) {
            return Err(StoreError::EnvironmentNotFound(name.to_string()));
        }
        guard.default = Some(name.to_string());
        Ok(())
    }
}
