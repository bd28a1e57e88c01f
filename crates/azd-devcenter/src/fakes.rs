//! In-memory dev center and deployment services for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use azd_azure::{
    AzureError, Catalog, DeploymentExtended, DeploymentOperation, DeploymentProperties, DeploymentService,
    DeploymentTarget, DevCenter, DevCenterClient, DevCenterEnvironment, EnvironmentDefinition, EnvironmentSpec,
    EnvironmentType, Project, WhatIfChange,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub const RESOURCE_GROUP_ID: &str = "/subscriptions/sub-1/resourceGroups/rg-dev";

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

pub fn deployment(name: &str, state: &str, timestamp: DateTime<Utc>, tags: HashMap<String, String>) -> DeploymentExtended {
    DeploymentExtended {
        id: format!("{}/providers/Microsoft.Resources/deployments/{}", RESOURCE_GROUP_ID, name),
        name: name.to_string(),
        tags: Some(tags),
        properties: DeploymentProperties {
            provisioning_state: state.to_string(),
            timestamp: Some(timestamp),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[derive(Debug, Default)]
pub struct DevCenterState {
    pub projects: Vec<(Project, bool)>,
    pub failing_projects: Vec<String>,
    pub failing_permissions: Vec<String>,
    pub environment_types: Vec<EnvironmentType>,
    pub definitions: Vec<EnvironmentDefinition>,
    pub environments: HashMap<String, DevCenterEnvironment>,
    /// Every mutating call, e.g. `put:dev`, `delete:dev`.
    pub calls: Vec<String>,
    pub last_spec: Option<EnvironmentSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeDevCenter {
    pub state: Arc<Mutex<DevCenterState>>,
}

impl FakeDevCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, dev_center: &str, name: &str, writable: bool) -> Self {
        let project = Project {
            id: format!("/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.DevCenter/projects/{}", name),
            name: name.to_string(),
            description: String::new(),
            dev_center: DevCenter {
                id: format!("/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.DevCenter/devcenters/{}", dev_center),
                name: dev_center.to_string(),
                service_uri: format!("https://{}.devcenter.azure.com", dev_center),
            },
        };
        lock(&self.state).projects.push((project, writable));
        self
    }

    pub fn failing_projects(self, dev_center: &str) -> Self {
        lock(&self.state).failing_projects.push(dev_center.to_string());
        self
    }

    pub fn failing_permission_check(self, project: &str) -> Self {
        lock(&self.state).failing_permissions.push(project.to_string());
        self
    }

    pub fn with_environment_type(self, name: &str) -> Self {
        lock(&self.state).environment_types.push(EnvironmentType {
            name: name.to_string(),
            deployment_target_id: String::new(),
            status: "Enabled".into(),
        });
        self
    }

    pub fn with_definition(self, definition: EnvironmentDefinition) -> Self {
        lock(&self.state).definitions.push(definition);
        self
    }

    pub fn with_environment(self, environment: DevCenterEnvironment) -> Self {
        lock(&self.state).environments.insert(environment.name.clone(), environment);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn last_spec(&self) -> Option<EnvironmentSpec> {
        lock(&self.state).last_spec.clone()
    }
}

#[async_trait]
impl DevCenterClient for FakeDevCenter {
    async fn dev_centers(&self) -> Result<Vec<DevCenter>, AzureError> {
        let mut dev_centers: Vec<DevCenter> = Vec::new();
        for (project, _) in &lock(&self.state).projects {
            if !dev_centers.contains(&project.dev_center) {
                dev_centers.push(project.dev_center.clone());
            }
        }
        Ok(dev_centers)
    }

    async fn projects(&self, dev_center: &DevCenter) -> Result<Vec<Project>, AzureError> {
        let state = lock(&self.state);
        if state.failing_projects.contains(&dev_center.name) {
            return Err(AzureError::Http(format!("{} unreachable", dev_center.name)));
        }
        Ok(state
            .projects
            .iter()
            .filter(|(p, _)| p.dev_center.name == dev_center.name)
            .map(|(p, _)| p.clone())
            .collect())
    }

    async fn project(&self, dev_center: &str, project: &str) -> Result<Project, AzureError> {
        lock(&self.state)
            .projects
            .iter()
            .find(|(p, _)| p.name == project && p.dev_center.name == dev_center)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| AzureError::NotFound(format!("project '{}'", project)))
    }

    async fn has_write_access(&self, project: &Project) -> Result<bool, AzureError> {
        let state = lock(&self.state);
        if state.failing_permissions.contains(&project.name) {
            return Err(AzureError::Http("permissions unavailable".into()));
        }
        Ok(state.projects.iter().any(|(p, writable)| p.id == project.id && *writable))
    }

    async fn catalogs(&self, _project: &Project) -> Result<Vec<Catalog>, AzureError> {
        let mut names: Vec<String> = lock(&self.state).definitions.iter().map(|d| d.catalog_name.clone()).collect();
        names.dedup();
        Ok(names.into_iter().map(|name| Catalog { name }).collect())
    }

    async fn environment_types(&self, _project: &Project) -> Result<Vec<EnvironmentType>, AzureError> {
        Ok(lock(&self.state).environment_types.clone())
    }

    async fn environment_definitions(&self, _project: &Project) -> Result<Vec<EnvironmentDefinition>, AzureError> {
        Ok(lock(&self.state).definitions.clone())
    }

    async fn environment_definition(
        &self,
        _project: &Project,
        catalog: &str,
        name: &str,
    ) -> Result<EnvironmentDefinition, AzureError> {
        lock(&self.state)
            .definitions
            .iter()
            .find(|d| d.catalog_name == catalog && d.name == name)
            .cloned()
            .ok_or_else(|| AzureError::NotFound(format!("environment definition '{}'", name)))
    }

    async fn environments(&self, _project: &Project) -> Result<Vec<DevCenterEnvironment>, AzureError> {
        Ok(lock(&self.state).environments.values().cloned().collect())
    }

    async fn environment(&self, _project: &Project, _user: &str, name: &str) -> Result<DevCenterEnvironment, AzureError> {
        lock(&self.state)
            .environments
            .get(name)
            .cloned()
            .ok_or_else(|| AzureError::NotFound(format!("environment '{}'", name)))
    }

    async fn put_environment(
        &self,
        _project: &Project,
        user: &str,
        name: &str,
        spec: &EnvironmentSpec,
    ) -> Result<(), AzureError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("put:{}", name));
        state.last_spec = Some(spec.clone());
        state.environments.insert(
            name.to_string(),
            DevCenterEnvironment {
                name: name.to_string(),
                environment_type: spec.environment_type.clone(),
                user: user.to_string(),
                catalog_name: spec.catalog_name.clone(),
                environment_definition_name: spec.environment_definition_name.clone(),
                parameters: spec.parameters.clone(),
                provisioning_state: "Succeeded".into(),
                resource_group_id: RESOURCE_GROUP_ID.into(),
            },
        );
        Ok(())
    }

    async fn delete_environment(&self, _project: &Project, _user: &str, name: &str) -> Result<(), AzureError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("delete:{}", name));
        state.environments.remove(name);
        Ok(())
    }
}

/// Deployment service that only lists a fixed set of deployments.
#[derive(Debug, Clone, Default)]
pub struct ListedDeployments {
    pub deployments: Arc<Mutex<Vec<DeploymentExtended>>>,
}

impl ListedDeployments {
    pub fn new(deployments: Vec<DeploymentExtended>) -> Self {
        Self { deployments: Arc::new(Mutex::new(deployments)) }
    }
}

#[async_trait]
impl DeploymentService for ListedDeployments {
    async fn deploy(
        &self,
        _target: &DeploymentTarget,
        name: &str,
        _template: &Value,
        _parameters: &Value,
        _tags: &HashMap<String, String>,
    ) -> Result<DeploymentExtended, AzureError> {
        Err(AzureError::Http(format!("unexpected deploy of {}", name)))
    }

    async fn get(&self, _target: &DeploymentTarget, name: &str) -> Result<DeploymentExtended, AzureError> {
        lock(&self.deployments)
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| AzureError::DeploymentNotFound(name.to_string()))
    }

    async fn list(&self, _target: &DeploymentTarget) -> Result<Vec<DeploymentExtended>, AzureError> {
        Ok(lock(&self.deployments).clone())
    }

    async fn delete(&self, _target: &DeploymentTarget, name: &str) -> Result<(), AzureError> {
        Err(AzureError::Http(format!("unexpected delete of {}", name)))
    }

    async fn what_if(
        &self,
        _target: &DeploymentTarget,
        _name: &str,
        _template: &Value,
        _parameters: &Value,
    ) -> Result<Vec<WhatIfChange>, AzureError> {
        Ok(Vec::new())
    }

    async fn operations(
        &self,
        _target: &DeploymentTarget,
        _name: &str,
    ) -> Result<Vec<DeploymentOperation>, AzureError> {
        Ok(Vec::new())
    }
}
