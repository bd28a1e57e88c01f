use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AzureError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureResource {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVault {
    pub id: String,
    pub name: String,
    pub location: String,
    pub enable_soft_delete: bool,
    pub enable_purge_protection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfiguration {
    pub id: String,
    pub name: String,
    pub location: String,
    pub enable_soft_delete: bool,
    pub enable_purge_protection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiManagement {
    pub id: String,
    pub name: String,
    pub location: String,
}

/// Remote resource-group and soft-delete operations used by destroy.
#[async_trait]
pub trait ResourceService: Send + Sync + 'static {
    /// Names of the resource groups tagged `tag_name = tag_value`.
    async fn list_resource_groups(
        &self,
        subscription_id: &str,
        tag_name: &str,
        tag_value: &str,
    ) -> Result<Vec<String>, AzureError>;

    async fn list_resource_group_resources(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<Vec<AzureResource>, AzureError>;

    async fn delete_resource_group(&self, subscription_id: &str, resource_group: &str) -> Result<(), AzureError>;

    async fn get_key_vault(&self, subscription_id: &str, resource_group: &str, name: &str) -> Result<KeyVault, AzureError>;
    async fn purge_key_vault(&self, subscription_id: &str, name: &str, location: &str) -> Result<(), AzureError>;

    async fn get_app_configuration(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<AppConfiguration, AzureError>;
    async fn purge_app_configuration(&self, subscription_id: &str, name: &str, location: &str) -> Result<(), AzureError>;

    async fn get_api_management(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<ApiManagement, AzureError>;
    async fn purge_api_management(&self, subscription_id: &str, name: &str, location: &str) -> Result<(), AzureError>;
}

/// `/subscriptions/{sub}/resourceGroups/{name}` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroupId {
    pub subscription_id: String,
    pub name: String,
}

impl ResourceGroupId {
    pub fn parse(id: &str) -> Result<Self, AzureError> {
        let parts: Vec<&str> = id.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [subs, sub, rgs, name, ..]
                if subs.eq_ignore_ascii_case("subscriptions")
                    && rgs.eq_ignore_ascii_case("resourceGroups")
                    && !sub.is_empty()
                    && !name.is_empty() =>
            {
                Ok(Self { subscription_id: sub.to_string(), name: name.to_string() })
            }
            _ => Err(AzureError::InvalidResourceId(id.to_string())),
        }
    }
}
