use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AzureError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub regional_display_name: String,
}

/// Subscriptions and regions visible to the signed-in principal.
#[async_trait]
pub trait AccountService: Send + Sync + 'static {
    async fn subscriptions(&self) -> Result<Vec<Subscription>, AzureError>;
    async fn locations(&self, subscription_id: &str) -> Result<Vec<Location>, AzureError>;
}
