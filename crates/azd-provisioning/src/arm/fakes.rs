//! In-memory Azure services for provider tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use azd_azure::{
    ApiManagement, AppConfiguration, AzureError, AzureResource, DeploymentExtended, DeploymentOperation,
    DeploymentOutput, DeploymentProperties, DeploymentService, DeploymentTarget, KeyVault, ResourceService,
    WhatIfChange,
};
use serde_json::Value;

use crate::error::ProvisionError;
use crate::prompt::Prompter;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

#[derive(Debug, Default)]
pub struct DeploymentsState {
    pub deployed: Vec<(DeploymentTarget, String, Value, Value, HashMap<String, String>)>,
    /// Number of `get` calls that report the deployment as missing first.
    pub not_found_gets: usize,
    pub gets: usize,
    pub outputs: HashMap<String, DeploymentOutput>,
    pub output_resources: Vec<String>,
    pub deleted: Vec<String>,
    pub what_if: Vec<WhatIfChange>,
    pub operations: VecDeque<Vec<DeploymentOperation>>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeDeployments {
    pub state: Arc<Mutex<DeploymentsState>>,
}

impl FakeDeployments {
    pub fn with_output(self, key: &str, output_type: &str, value: Value) -> Self {
        lock(&self.state).outputs.insert(
            key.to_string(),
            DeploymentOutput { output_type: output_type.to_string(), value },
        );
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, DeploymentsState> {
        lock(&self.state)
    }

    fn record(&self, name: &str) -> DeploymentExtended {
        let state = lock(&self.state);
        DeploymentExtended {
            id: format!("/subscriptions/sub/providers/Microsoft.Resources/deployments/{}", name),
            name: name.to_string(),
            properties: DeploymentProperties {
                provisioning_state: "Succeeded".into(),
                outputs: Some(state.outputs.clone()),
                output_resources: Some(
                    state
                        .output_resources
                        .iter()
                        .map(|id| azd_azure::deployments::ResourceReference { id: id.clone() })
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl DeploymentService for FakeDeployments {
    async fn deploy(
        &self,
        target: &DeploymentTarget,
        name: &str,
        template: &Value,
        parameters: &Value,
        tags: &HashMap<String, String>,
    ) -> Result<DeploymentExtended, AzureError> {
        lock(&self.state).deployed.push((
            target.clone(),
            name.to_string(),
            template.clone(),
            parameters.clone(),
            tags.clone(),
        ));
        Ok(self.record(name))
    }

    async fn get(&self, _target: &DeploymentTarget, name: &str) -> Result<DeploymentExtended, AzureError> {
        {
            let mut state = lock(&self.state);
            state.gets += 1;
            if state.not_found_gets > 0 {
                state.not_found_gets -= 1;
                return Err(AzureError::DeploymentNotFound(name.to_string()));
            }
        }
        Ok(self.record(name))
    }

    async fn list(&self, _target: &DeploymentTarget) -> Result<Vec<DeploymentExtended>, AzureError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _target: &DeploymentTarget, name: &str) -> Result<(), AzureError> {
        lock(&self.state).deleted.push(name.to_string());
        Ok(())
    }

    async fn what_if(
        &self,
        _target: &DeploymentTarget,
        _name: &str,
        _template: &Value,
        _parameters: &Value,
    ) -> Result<Vec<WhatIfChange>, AzureError> {
        Ok(lock(&self.state).what_if.clone())
    }

    async fn operations(
        &self,
        _target: &DeploymentTarget,
        _name: &str,
    ) -> Result<Vec<DeploymentOperation>, AzureError> {
        Ok(lock(&self.state).operations.pop_front().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct ResourcesState {
    pub groups: Vec<(String, Vec<AzureResource>)>,
    pub vaults: HashMap<String, KeyVault>,
    pub app_configs: HashMap<String, AppConfiguration>,
    pub apims: HashMap<String, ApiManagement>,
    pub failing_purges: Vec<String>,
    /// Every mutating call, in order, e.g. `delete-rg:rg-a`, `purge-kv:kv1`.
    pub calls: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeResources {
    pub state: Arc<Mutex<ResourcesState>>,
}

pub fn resource(name: &str, resource_type: &str) -> AzureResource {
    AzureResource {
        id: format!("/subscriptions/sub/resourceGroups/rg/providers/{}/{}", resource_type, name),
        name: name.to_string(),
        resource_type: resource_type.to_string(),
        location: "eastus".into(),
    }
}

impl FakeResources {
    pub fn with_group(self, name: &str, resources: Vec<AzureResource>) -> Self {
        lock(&self.state).groups.push((name.to_string(), resources));
        self
    }

    pub fn with_key_vault(self, name: &str, soft_delete: bool, purge_protection: bool) -> Self {
        lock(&self.state).vaults.insert(
            name.to_string(),
            KeyVault {
                id: format!("kv/{}", name),
                name: name.to_string(),
                location: "eastus".into(),
                enable_soft_delete: soft_delete,
                enable_purge_protection: purge_protection,
            },
        );
        self
    }

    pub fn with_app_configuration(self, name: &str, soft_delete: bool, purge_protection: bool) -> Self {
        lock(&self.state).app_configs.insert(
            name.to_string(),
            AppConfiguration {
                id: format!("ac/{}", name),
                name: name.to_string(),
                location: "eastus".into(),
                enable_soft_delete: soft_delete,
                enable_purge_protection: purge_protection,
            },
        );
        self
    }

    pub fn with_api_management(self, name: &str) -> Self {
        lock(&self.state).apims.insert(
            name.to_string(),
            ApiManagement { id: format!("apim/{}", name), name: name.to_string(), location: "eastus".into() },
        );
        self
    }

    pub fn failing_purge(self, name: &str) -> Self {
        lock(&self.state).failing_purges.push(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    fn purge(&self, prefix: &str, name: &str) -> Result<(), AzureError> {
        let mut state = lock(&self.state);
        if state.failing_purges.iter().any(|n| n == name) {
            return Err(AzureError::Api {
                method: "POST",
                url: format!("purge/{}", name),
                status: 403,
                message: "forbidden".into(),
            });
        }
        state.calls.push(format!("{}:{}", prefix, name));
        Ok(())
    }
}

#[async_trait]
impl ResourceService for FakeResources {
    async fn list_resource_groups(
        &self,
        _subscription_id: &str,
        _tag_name: &str,
        _tag_value: &str,
    ) -> Result<Vec<String>, AzureError> {
        Ok(lock(&self.state).groups.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn list_resource_group_resources(
        &self,
        _subscription_id: &str,
        resource_group: &str,
    ) -> Result<Vec<AzureResource>, AzureError> {
        lock(&self.state)
            .groups
            .iter()
            .find(|(name, _)| name == resource_group)
            .map(|(_, resources)| resources.clone())
            .ok_or_else(|| AzureError::NotFound(resource_group.to_string()))
    }

    async fn delete_resource_group(&self, _subscription_id: &str, resource_group: &str) -> Result<(), AzureError> {
        lock(&self.state).calls.push(format!("delete-rg:{}", resource_group));
        Ok(())
    }

    async fn get_key_vault(&self, _subscription_id: &str, _resource_group: &str, name: &str) -> Result<KeyVault, AzureError> {
        lock(&self.state).vaults.get(name).cloned().ok_or_else(|| AzureError::NotFound(name.to_string()))
    }

    async fn purge_key_vault(&self, _subscription_id: &str, name: &str, _location: &str) -> Result<(), AzureError> {
        self.purge("purge-kv", name)
    }

    async fn get_app_configuration(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        name: &str,
    ) -> Result<AppConfiguration, AzureError> {
        lock(&self.state).app_configs.get(name).cloned().ok_or_else(|| AzureError::NotFound(name.to_string()))
    }

    async fn purge_app_configuration(&self, _subscription_id: &str, name: &str, _location: &str) -> Result<(), AzureError> {
        self.purge("purge-ac", name)
    }

    async fn get_api_management(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        name: &str,
    ) -> Result<ApiManagement, AzureError> {
        lock(&self.state).apims.get(name).cloned().ok_or_else(|| AzureError::NotFound(name.to_string()))
    }

    async fn purge_api_management(&self, _subscription_id: &str, name: &str, _location: &str) -> Result<(), AzureError> {
        self.purge("purge-apim", name)
    }
}

/// Fails any prompt; for environments that already carry a subscription and
/// location.
pub struct NoPrompter;

#[async_trait]
impl Prompter for NoPrompter {
    async fn prompt_subscription(&self, _message: &str) -> Result<String, ProvisionError> {
        Err(ProvisionError::Console("unexpected subscription prompt".into()))
    }

    async fn prompt_location(&self, _subscription_id: &str, _message: &str) -> Result<String, ProvisionError> {
        Err(ProvisionError::Console("unexpected location prompt".into()))
    }
}
