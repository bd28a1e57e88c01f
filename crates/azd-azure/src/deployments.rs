use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AzureError;

/// Where an ARM deployment lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeploymentTarget {
    Subscription { subscription_id: String, location: String },
    ResourceGroup { subscription_id: String, resource_group: String },
}

impl DeploymentTarget {
    pub fn subscription_id(&self) -> &str {
        match self {
            DeploymentTarget::Subscription { subscription_id, .. }
            | DeploymentTarget::ResourceGroup { subscription_id, .. } => subscription_id,
        }
    }

    /// ARM path prefix for deployments at this target.
    pub fn deployments_path(&self) -> String {
        match self {
            DeploymentTarget::Subscription { subscription_id, .. } => format!(
                "/subscriptions/{}/providers/Microsoft.Resources/deployments",
                subscription_id
            ),
            DeploymentTarget::ResourceGroup { subscription_id, resource_group } => format!(
                "/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments",
                subscription_id, resource_group
            ),
        }
    }
}

// ── Models ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentExtended {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub properties: DeploymentProperties,
}

impl DeploymentExtended {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref().and_then(|t| t.get(key)).map(String::as_str)
    }

    pub fn outputs(&self) -> HashMap<String, DeploymentOutput> {
        self.properties.outputs.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProperties {
    #[serde(default)]
    pub provisioning_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<HashMap<String, DeploymentOutput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_resources: Option<Vec<ResourceReference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentOutput {
    #[serde(rename = "type")]
    pub output_type: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReference {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOperation {
    #[serde(default)]
    pub operation_id: String,
    #[serde(default)]
    pub properties: OperationProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProperties {
    #[serde(default)]
    pub provisioning_state: String,
    #[serde(default)]
    pub provisioning_operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resource: Option<TargetResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub resource_name: String,
}

/// One predicted change from a what-if request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfChange {
    pub resource_id: String,
    pub change_type: String,
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Remote ARM deployment operations.
///
/// `get` reports a missing deployment as [`AzureError::DeploymentNotFound`].
#[async_trait]
pub trait DeploymentService: Send + Sync + 'static {
    async fn deploy(
        &self,
        target: &DeploymentTarget,
        name: &str,
        template: &Value,
        parameters: &Value,
        tags: &HashMap<String, String>,
    ) -> Result<DeploymentExtended, AzureError>;

    async fn get(&self, target: &DeploymentTarget, name: &str) -> Result<DeploymentExtended, AzureError>;

    async fn list(&self, target: &DeploymentTarget) -> Result<Vec<DeploymentExtended>, AzureError>;

    async fn delete(&self, target: &DeploymentTarget, name: &str) -> Result<(), AzureError>;

    async fn what_if(
        &self,
        target: &DeploymentTarget,
        name: &str,
        template: &Value,
        parameters: &Value,
    ) -> Result<Vec<WhatIfChange>, AzureError>;

    async fn operations(
        &self,
        target: &DeploymentTarget,
        name: &str,
    ) -> Result<Vec<DeploymentOperation>, AzureError>;
}
