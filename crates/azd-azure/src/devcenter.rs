use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::{TokenCredential, ARM_SCOPE, DEVCENTER_SCOPE};
use crate::error::AzureError;

const DATA_PLANE_API_VERSION: &str = "2023-04-01";
const RESOURCE_GRAPH_API_VERSION: &str = "2021-03-01";
const PERMISSIONS_API_VERSION: &str = "2022-04-01";

const PROJECTS_QUERY: &str = "Resources \
    | where type in~ ('microsoft.devcenter/projects') \
    | where properties['provisioningState'] =~ 'Succeeded' \
    | project id, location, tenantId, name, properties, type";

const ENVIRONMENT_WRITE_ACTIONS: [&str; 2] = [
    "Microsoft.DevCenter/projects/users/environments/adminWrite/action",
    "Microsoft.DevCenter/projects/users/environments/userWrite/action",
];

// ── Models ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevCenter {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Data-plane endpoint, without a trailing slash.
    #[serde(default)]
    pub service_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub dev_center: DevCenter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentType {
    pub name: String,
    #[serde(default)]
    pub deployment_target_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionParameterType {
    Array,
    Boolean,
    Integer,
    Number,
    Object,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionParameter {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: DefinitionParameterType,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDefinition {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub catalog_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<DefinitionParameter>,
}

/// An ADE environment as reported by the data plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevCenterEnvironment {
    pub name: String,
    #[serde(default)]
    pub environment_type: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub catalog_name: String,
    #[serde(default)]
    pub environment_definition_name: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub provisioning_state: String,
    #[serde(default)]
    pub resource_group_id: String,
}

/// Body of a create-or-update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    pub environment_type: String,
    pub catalog_name: String,
    pub environment_definition_name: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Azure Deployment Environments operations used by azd.
///
/// Projects are addressed through their dev center's data-plane endpoint.
/// A missing environment is reported as [`AzureError::NotFound`].
#[async_trait]
pub trait DevCenterClient: Send + Sync + 'static {
    async fn dev_centers(&self) -> Result<Vec<DevCenter>, AzureError>;

    async fn projects(&self, dev_center: &DevCenter) -> Result<Vec<Project>, AzureError>;

    /// The project called `project` in the dev center matching `dev_center`
    /// by name or endpoint.
    async fn project(&self, dev_center: &str, project: &str) -> Result<Project, AzureError>;

    async fn has_write_access(&self, project: &Project) -> Result<bool, AzureError>;

    async fn catalogs(&self, project: &Project) -> Result<Vec<Catalog>, AzureError>;

    async fn environment_types(&self, project: &Project) -> Result<Vec<EnvironmentType>, AzureError>;

    async fn environment_definitions(&self, project: &Project) -> Result<Vec<EnvironmentDefinition>, AzureError>;

    async fn environment_definition(
        &self,
        project: &Project,
        catalog: &str,
        name: &str,
    ) -> Result<EnvironmentDefinition, AzureError>;

    async fn environments(&self, project: &Project) -> Result<Vec<DevCenterEnvironment>, AzureError>;

    async fn environment(&self, project: &Project, user: &str, name: &str) -> Result<DevCenterEnvironment, AzureError>;

    /// Create or update an environment and wait for the operation to finish.
    async fn put_environment(
        &self,
        project: &Project,
        user: &str,
        name: &str,
        spec: &EnvironmentSpec,
    ) -> Result<(), AzureError>;

    /// Delete an environment and wait for the operation to finish.
    async fn delete_environment(&self, project: &Project, user: &str, name: &str) -> Result<(), AzureError>;
}

// ── REST implementation ───────────────────────────────────────────────────────

/// Discovers projects through Azure Resource Graph and talks to each dev
/// center's data plane.
#[derive(Clone)]
pub struct DevCenterRestClient {
    client: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    management: String,
    user_agent: String,
    poll_interval: Duration,
    projects: Arc<RwLock<Option<Vec<Project>>>>,
}

impl DevCenterRestClient {
    pub fn new(credential: Arc<dyn TokenCredential>, user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential,
            management: "https://management.azure.com".into(),
            user_agent: user_agent.into(),
            poll_interval: Duration::from_secs(5),
            projects: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_management_url(mut self, url: impl Into<String>) -> Self {
        self.management = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Every provisioned project visible to the caller, queried once.
    async fn project_list(&self) -> Result<Vec<Project>, AzureError> {
        {
            let guard = self.projects.read().await;
            if let Some(projects) = guard.as_ref() {
                return Ok(projects.clone());
            }
        }

        let mut guard = self.projects.write().await;
        if let Some(projects) = guard.as_ref() {
            return Ok(projects.clone());
        }

        let url = format!(
            "{}/providers/Microsoft.ResourceGraph/resources?api-version={}",
            self.management, RESOURCE_GRAPH_API_VERSION
        );
        let body = json!({ "query": PROJECTS_QUERY, "options": { "allowPartialScopes": true } });
        let response = self.send(reqwest::Method::POST, &url, ARM_SCOPE, Some(&body)).await?;

        let projects = response["data"]
            .as_array()
            .ok_or_else(|| AzureError::Decode("resource graph response has no data".into()))?
            .iter()
            .map(project_from_graph_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = projects.len(), "discovered dev center projects");

        *guard = Some(projects.clone());
        Ok(projects)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        scope: &str,
        body: Option<&Value>,
    ) -> Result<Value, AzureError> {
        let (_, value) = self.send_raw(method, url, scope, body).await?;
        Ok(value)
    }

    /// Issue a request and return the `Operation-Location` header with the body.
    async fn send_raw(
        &self,
        method: reqwest::Method,
        url: &str,
        scope: &str,
        body: Option<&Value>,
    ) -> Result<(Option<String>, Value), AzureError> {
        let token = self.credential.token(scope).await?;
        let method_name = method_name(&method);
        debug!(url, method = method_name, "dev center request");

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&token)
            .header(reqwest::header::USER_AGENT, &self.user_agent);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| AzureError::Http(format!("{} {}: {}", method_name, url, e)))?;

        let status = resp.status().as_u16();
        let operation = resp
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let value: Value = resp.json().await.unwrap_or(Value::Null);

        match status {
            404 => Err(AzureError::NotFound(url.to_string())),
            s if (200..300).contains(&s) => Ok((operation, value)),
            s => Err(AzureError::Api {
                method: method_name,
                url: url.to_string(),
                status: s,
                message: error_message(&value),
            }),
        }
    }

    async fn get_list<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, AzureError> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next.take() {
            let body = self.send(reqwest::Method::GET, &url, DEVCENTER_SCOPE, None).await?;
            if let Some(values) = body["value"].as_array() {
                for value in values {
                    items.push(decode(value.clone())?);
                }
            }
            next = body["nextLink"].as_str().filter(|s| !s.is_empty()).map(|s| s.to_string());
        }
        Ok(items)
    }

    async fn wait_for_operation(&self, operation_url: &str) -> Result<(), AzureError> {
        loop {
            let body = self
                .send(reqwest::Method::GET, operation_url, DEVCENTER_SCOPE, None)
                .await?;
            match body["status"].as_str().unwrap_or("Succeeded") {
                "Succeeded" => return Ok(()),
                "Failed" | "Canceled" => return Err(AzureError::OperationFailed(error_message(&body))),
                status => debug!(operation_url, status, "dev center operation pending"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn project_url(project: &Project, suffix: &str) -> String {
        format!(
            "{}/projects/{}{}?api-version={}",
            project.dev_center.service_uri, project.name, suffix, DATA_PLANE_API_VERSION
        )
    }
}

#[async_trait]
impl DevCenterClient for DevCenterRestClient {
    async fn dev_centers(&self) -> Result<Vec<DevCenter>, AzureError> {
        let mut dev_centers: Vec<DevCenter> = Vec::new();
        for project in self.project_list().await? {
            if !dev_centers.iter().any(|dc| dc.service_uri == project.dev_center.service_uri) {
                dev_centers.push(project.dev_center);
            }
        }
        Ok(dev_centers)
    }

    async fn projects(&self, dev_center: &DevCenter) -> Result<Vec<Project>, AzureError> {
        Ok(self
            .project_list()
            .await?
            .into_iter()
            .filter(|p| {
                (!dev_center.service_uri.is_empty() && p.dev_center.service_uri == dev_center.service_uri)
                    || (!dev_center.name.is_empty() && p.dev_center.name == dev_center.name)
            })
            .collect())
    }

    async fn project(&self, dev_center: &str, project: &str) -> Result<Project, AzureError> {
        self.project_list()
            .await?
            .into_iter()
            .find(|p| {
                p.name == project
                    && (p.dev_center.name.eq_ignore_ascii_case(dev_center) || p.dev_center.service_uri == dev_center)
            })
            .ok_or_else(|| AzureError::NotFound(format!("project '{}' in dev center '{}'", project, dev_center)))
    }

    async fn has_write_access(&self, project: &Project) -> Result<bool, AzureError> {
        let url = format!(
            "{}{}/providers/Microsoft.Authorization/permissions?api-version={}",
            self.management, project.id, PERMISSIONS_API_VERSION
        );
        let body = self.send(reqwest::Method::GET, &url, ARM_SCOPE, None).await?;
        Ok(permissions_allow_write(&body))
    }

    async fn catalogs(&self, project: &Project) -> Result<Vec<Catalog>, AzureError> {
        self.get_list(&Self::project_url(project, "/catalogs")).await
    }

    async fn environment_types(&self, project: &Project) -> Result<Vec<EnvironmentType>, AzureError> {
        self.get_list(&Self::project_url(project, "/environmentTypes")).await
    }

    async fn environment_definitions(&self, project: &Project) -> Result<Vec<EnvironmentDefinition>, AzureError> {
        self.get_list(&Self::project_url(project, "/environmentDefinitions")).await
    }

    async fn environment_definition(
        &self,
        project: &Project,
        catalog: &str,
        name: &str,
    ) -> Result<EnvironmentDefinition, AzureError> {
        let url = Self::project_url(project, &format!("/catalogs/{}/environmentDefinitions/{}", catalog, name));
        decode(self.send(reqwest::Method::GET, &url, DEVCENTER_SCOPE, None).await?)
    }

    async fn environments(&self, project: &Project) -> Result<Vec<DevCenterEnvironment>, AzureError> {
        self.get_list(&Self::project_url(project, "/environments")).await
    }

    async fn environment(&self, project: &Project, user: &str, name: &str) -> Result<DevCenterEnvironment, AzureError> {
        let url = Self::project_url(project, &format!("/users/{}/environments/{}", user, name));
        decode(self.send(reqwest::Method::GET, &url, DEVCENTER_SCOPE, None).await?)
    }

    async fn put_environment(
        &self,
        project: &Project,
        user: &str,
        name: &str,
        spec: &EnvironmentSpec,
    ) -> Result<(), AzureError> {
        let url = Self::project_url(project, &format!("/users/{}/environments/{}", user, name));
        let body = serde_json::to_value(spec).map_err(|e| AzureError::Decode(e.to_string()))?;
        let (operation, _) = self
            .send_raw(reqwest::Method::PUT, &url, DEVCENTER_SCOPE, Some(&body))
            .await?;
        match operation {
            Some(operation) => self.wait_for_operation(&operation).await,
            None => Ok(()),
        }
    }

    async fn delete_environment(&self, project: &Project, user: &str, name: &str) -> Result<(), AzureError> {
        let url = Self::project_url(project, &format!("/users/{}/environments/{}", user, name));
        let (operation, _) = self
            .send_raw(reqwest::Method::DELETE, &url, DEVCENTER_SCOPE, None)
            .await?;
        match operation {
            Some(operation) => self.wait_for_operation(&operation).await,
            None => Ok(()),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn method_name(method: &reqwest::Method) -> &'static str {
    if *method == reqwest::Method::GET {
        "GET"
    } else if *method == reqwest::Method::PUT {
        "PUT"
    } else if *method == reqwest::Method::POST {
        "POST"
    } else if *method == reqwest::Method::DELETE {
        "DELETE"
    } else {
        "REQUEST"
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AzureError> {
    serde_json::from_value(value).map_err(|e| AzureError::Decode(e.to_string()))
}

fn error_message(body: &Value) -> String {
    let err = body.get("error").unwrap_or(body);
    format!(
        "{}: {}",
        err["code"].as_str().unwrap_or("Unknown"),
        err["message"].as_str().unwrap_or("unknown error")
    )
}

/// Last path segment following `kind` in an ARM resource id.
fn id_segment<'a>(id: &'a str, kind: &str) -> Option<&'a str> {
    let mut parts = id.split('/');
    while let Some(part) = parts.next() {
        if part.eq_ignore_ascii_case(kind) {
            return parts.next();
        }
    }
    None
}

fn project_from_graph_row(row: &Value) -> Result<Project, AzureError> {
    let id = row["id"].as_str().unwrap_or_default().to_string();
    let dev_center_id = row.pointer("/properties/devCenterId").and_then(Value::as_str).unwrap_or_default();
    let dev_center_name = id_segment(dev_center_id, "devcenters")
        .ok_or_else(|| AzureError::InvalidResourceId(dev_center_id.to_string()))?;

    Ok(Project {
        name: row["name"].as_str().unwrap_or_default().to_string(),
        description: row
            .pointer("/properties/description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        dev_center: DevCenter {
            id: dev_center_id.to_string(),
            name: dev_center_name.to_string(),
            service_uri: row
                .pointer("/properties/devCenterUri")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
        },
        id,
    })
}

fn permissions_allow_write(body: &Value) -> bool {
    let strings = |v: &Value| -> Vec<String> {
        v.as_array()
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };
    let matches = |pattern: &str, action: &str| {
        pattern == "*"
            || pattern.eq_ignore_ascii_case(action)
            || pattern
                .strip_suffix('*')
                .map(|prefix| action.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()))
                .unwrap_or(false)
    };

    body["value"].as_array().into_iter().flatten().any(|permission| {
        let allowed = strings(&permission["dataActions"]);
        let denied = strings(&permission["notDataActions"]);
        ENVIRONMENT_WRITE_ACTIONS.iter().any(|action| {
            allowed.iter().any(|p| matches(p, action)) && !denied.iter().any(|p| matches(p, action))
        })
    })
}
