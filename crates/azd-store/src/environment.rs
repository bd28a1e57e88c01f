use std::collections::BTreeMap;
use std::sync::Arc;

use azd_domain::keys::{AZURE_ENV_NAME, AZURE_LOCATION, AZURE_SUBSCRIPTION_ID, AZURE_TENANT_ID};
use azd_domain::ConfigTree;
use tokio::sync::RwLock;

/// Handle to the environment of the current invocation. Providers, the
/// manager and prompters take the lock for each read-modify-save step.
pub type SharedEnvironment = Arc<RwLock<Environment>>;

/// A named deployment target: `.env` values plus a structured config tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    name: String,
    values: BTreeMap<String, String>,
    config: ConfigTree,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut values = BTreeMap::new();
        values.insert(AZURE_ENV_NAME.to_string(), name.clone());
        Self { name, values, config: ConfigTree::new() }
    }

    pub fn from_parts(
        name: impl Into<String>,
        values: BTreeMap<String, String>,
        config: ConfigTree,
    ) -> Self {
        Self { name: name.into(), values, config }
    }

    pub fn into_shared(self) -> SharedEnvironment {
        Arc::new(RwLock::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn config(&self) -> &ConfigTree {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigTree {
        &mut self.config
    }

    // ── Values ────────────────────────────────────────────────────────────────

    /// Look up `key` in the `.env` values, then in the process environment.
    pub fn lookup_env(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    /// Same as [`lookup_env`](Self::lookup_env) with missing keys as "".
    pub fn getenv(&self, key: &str) -> String {
        self.lookup_env(key).unwrap_or_default()
    }

    pub fn dotenv_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn dotenv_delete(&mut self, key: &str) {
        self.values.remove(key);
    }

    // ── Well-known values ─────────────────────────────────────────────────────

    pub fn subscription_id(&self) -> String {
        self.getenv(AZURE_SUBSCRIPTION_ID)
    }

    pub fn set_subscription_id(&mut self, id: impl Into<String>) {
        self.dotenv_set(AZURE_SUBSCRIPTION_ID, id);
    }

    pub fn location(&self) -> String {
        self.getenv(AZURE_LOCATION)
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.dotenv_set(AZURE_LOCATION, location);
    }

    pub fn tenant_id(&self) -> String {
        self.getenv(AZURE_TENANT_ID)
    }
}
