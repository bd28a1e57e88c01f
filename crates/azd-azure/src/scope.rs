use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::deployments::{
    DeploymentExtended, DeploymentOperation, DeploymentService, DeploymentTarget, WhatIfChange,
};
use crate::error::AzureError;

/// A named deployment at a subscription or resource group, bound to the
/// service that talks to ARM.
#[derive(Clone)]
pub struct Scope {
    service: Arc<dyn DeploymentService>,
    target: DeploymentTarget,
    deployment_name: String,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("target", &self.target)
            .field("deployment_name", &self.deployment_name)
            .finish()
    }
}

impl Scope {
    pub fn subscription(
        service: Arc<dyn DeploymentService>,
        subscription_id: impl Into<String>,
        location: impl Into<String>,
        deployment_name: impl Into<String>,
    ) -> Self {
        Self {
            service,
            target: DeploymentTarget::Subscription {
                subscription_id: subscription_id.into(),
                location: location.into(),
            },
            deployment_name: deployment_name.into(),
        }
    }

    pub fn resource_group(
        service: Arc<dyn DeploymentService>,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        deployment_name: impl Into<String>,
    ) -> Self {
        Self {
            service,
            target: DeploymentTarget::ResourceGroup {
                subscription_id: subscription_id.into(),
                resource_group: resource_group.into(),
            },
            deployment_name: deployment_name.into(),
        }
    }

    pub fn target(&self) -> &DeploymentTarget {
        &self.target
    }

    pub fn subscription_id(&self) -> &str {
        self.target.subscription_id()
    }

    pub fn deployment_name(&self) -> &str {
        &self.deployment_name
    }

    pub async fn deploy(
        &self,
        template: &Value,
        parameters: &Value,
        tags: &HashMap<String, String>,
    ) -> Result<DeploymentExtended, AzureError> {
        self.service
            .deploy(&self.target, &self.deployment_name, template, parameters, tags)
            .await
    }

    pub async fn deployment(&self) -> Result<DeploymentExtended, AzureError> {
        self.service.get(&self.target, &self.deployment_name).await
    }

    /// Every deployment at this target, not just the named one.
    pub async fn deployments(&self) -> Result<Vec<DeploymentExtended>, AzureError> {
        self.service.list(&self.target).await
    }

    pub async fn delete_deployment(&self) -> Result<(), AzureError> {
        self.service.delete(&self.target, &self.deployment_name).await
    }

    pub async fn what_if(&self, template: &Value, parameters: &Value) -> Result<Vec<WhatIfChange>, AzureError> {
        self.service
            .what_if(&self.target, &self.deployment_name, template, parameters)
            .await
    }

    pub async fn operations(&self) -> Result<Vec<DeploymentOperation>, AzureError> {
        self.service.operations(&self.target, &self.deployment_name).await
    }
}
