use async_trait::async_trait;

use crate::environment::Environment;
use crate::error::StoreError;

#[async_trait]
pub trait EnvironmentStore: Send + Sync + 'static {
    async fn get(&self, name: &str) -> Result<Option<Environment>, StoreError>;
    async fn save(&self, env: &Environment) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<String>, StoreError>;
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    async fn default_environment(&self) -> Result<Option<String>, StoreError>;
    async fn set_default(&self, name: &str) -> Result<(), StoreError>;

    /// Create and persist a new, empty environment.
    async fn create(&self, name: &str) -> Result<Environment, StoreError> {
        validate_name(name)?;
        if self.get(name).await?.is_some() {
            return Err(StoreError::EnvironmentExists(name.to_string()));
        }
        let env = Environment::new(name);
        self.save(&env).await?;
        Ok(env)
    }
}

pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
