use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::account::{AccountService, Location, Subscription};
use crate::auth::{TokenCredential, ARM_SCOPE};
use crate::deployments::{
    DeploymentExtended, DeploymentOperation, DeploymentService, DeploymentTarget, WhatIfChange,
};
use crate::error::AzureError;
use crate::resources::{ApiManagement, AppConfiguration, AzureResource, KeyVault, ResourceService};

const DEPLOYMENTS_API_VERSION: &str = "2021-04-01";
const RESOURCES_API_VERSION: &str = "2021-04-01";
const KEY_VAULT_API_VERSION: &str = "2022-07-01";
const APP_CONFIG_API_VERSION: &str = "2023-03-01";
const APIM_API_VERSION: &str = "2022-08-01";
const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";

const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";

/// REST client for Azure Resource Manager.
///
/// Implements both [`DeploymentService`] and [`ResourceService`]. Cloning
/// shares the underlying connection pool and credential.
#[derive(Clone)]
pub struct ArmClient {
    client: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    management: String,
    user_agent: String,
    poll_delays: Vec<u64>,
}

impl ArmClient {
    pub fn new(credential: Arc<dyn TokenCredential>, user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential,
            management: DEFAULT_MANAGEMENT_URL.to_string(),
            user_agent: user_agent.into(),
            poll_delays: vec![1, 2, 4, 8, 16, 30],
        }
    }

    /// Point the client at a different management endpoint (sovereign clouds, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.management = url.into().trim_end_matches('/').to_string();
        self
    }

    #[cfg(test)]
    fn with_poll_delays(mut self, delays: Vec<u64>) -> Self {
        self.poll_delays = delays;
        self
    }

    async fn bearer(&self) -> Result<String, AzureError> {
        self.credential.token(ARM_SCOPE).await
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.management, path, api_version)
    }

    // ── ARM error parsing ─────────────────────────────────────────────────────

    fn parse_arm_error(body: &Value) -> String {
        let err = body
            .get("error")
            .or_else(|| body.get("Error"))
            .unwrap_or(body);
        let code = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    fn api_error(method: &'static str, url: &str, status: u16, body: &Value) -> AzureError {
        AzureError::Api { method, url: url.to_string(), status, message: Self::parse_arm_error(body) }
    }

    fn async_operation_url(headers: &reqwest::header::HeaderMap) -> Option<String> {
        headers
            .get("Azure-AsyncOperation")
            .or_else(|| headers.get("Location"))
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    // ── ARM async polling ─────────────────────────────────────────────────────

    /// Poll an ARM async operation URL until it completes or times out.
    ///
    /// `Azure-AsyncOperation` URLs report a `status` field. `Location` URLs
    /// answer 202 while pending and any other 2xx once done, possibly with an
    /// empty body. Backoff cycles through the configured delays, max 120 polls.
    async fn wait_for_operation(&self, op_url: &str) -> Result<Value, AzureError> {
        let max_polls = 120;

        for (i, &delay) in self.poll_delays.iter().cycle().take(max_polls).enumerate() {
            let token = self.bearer().await?;
            let resp = self
                .client
                .get(op_url)
                .bearer_auth(&token)
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .send()
                .await
                .map_err(|e| AzureError::Http(format!("poll {}: {}", op_url, e)))?;

            let code = resp.status().as_u16();
            let body: Value = resp.json().await.unwrap_or(Value::Null);

            if !(200..300).contains(&code) {
                return Err(Self::api_error("GET", op_url, code, &body));
            }

            match body["status"].as_str() {
                Some("Succeeded") => return Ok(body),
                Some(status @ ("Failed" | "Canceled")) => {
                    return Err(AzureError::OperationFailed(format!(
                        "ARM operation {}: {}",
                        status,
                        Self::parse_arm_error(&body)
                    )));
                }
                None if code != 202 => return Ok(body),
                _ => {}
            }

            let poll = i + 1;
            if poll % 10 == 0 {
                info!(poll, op_url, "still waiting for Azure ARM operation");
            } else {
                debug!(poll, op_url, delay, "Azure ARM operation pending, waiting");
            }
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        Err(AzureError::Timeout(format!(
            "Azure ARM operation timed out after {} polls: {}",
            max_polls, op_url
        )))
    }

    // ── ARM HTTP verbs ────────────────────────────────────────────────────────

    async fn arm_get(&self, url: &str) -> Result<(u16, Value), AzureError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| AzureError::Http(format!("GET {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// GET that maps 404 to `not_found` and any other failure to an API error.
    async fn arm_get_ok(
        &self,
        url: &str,
        not_found: impl FnOnce() -> AzureError,
    ) -> Result<Value, AzureError> {
        let (status, body) = self.arm_get(url).await?;
        match status {
            404 => Err(not_found()),
            s if (200..300).contains(&s) => Ok(body),
            s => Err(Self::api_error("GET", url, s, &body)),
        }
    }

    /// Follow `nextLink` pages and concatenate every `value` array.
    async fn arm_list<T: DeserializeOwned>(&self, first_url: &str) -> Result<Vec<T>, AzureError> {
        let mut items = Vec::new();
        let mut next = Some(first_url.to_string());
        while let Some(url) = next.take() {
            let body = self
                .arm_get_ok(&url, || AzureError::NotFound(url.clone()))
                .await?;
            if let Some(values) = body["value"].as_array() {
                for value in values {
                    items.push(decode(value.clone())?);
                }
            }
            next = body["nextLink"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());
        }
        Ok(items)
    }

    async fn arm_put_and_wait(&self, url: &str, body: &Value) -> Result<Value, AzureError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM PUT");
        let resp = self
            .client
            .put(url)
            .bearer_auth(&token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .json(body)
            .send()
            .await
            .map_err(|e| AzureError::Http(format!("PUT {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let async_op = Self::async_operation_url(resp.headers());
        let body_val: Value = resp.json().await.unwrap_or(Value::Null);

        if !(200..300).contains(&status) {
            return Err(Self::api_error("PUT", url, status, &body_val));
        }
        if body_val.get("error").is_some() {
            return Err(AzureError::OperationFailed(format!(
                "PUT {}: {}",
                url,
                Self::parse_arm_error(&body_val)
            )));
        }
        if let Some(op_url) = async_op.filter(|_| status == 201 || status == 202) {
            self.wait_for_operation(&op_url).await?;
        }
        Ok(body_val)
    }

    async fn arm_post(&self, url: &str, body: &Value) -> Result<Value, AzureError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM POST");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .json(body)
            .send()
            .await
            .map_err(|e| AzureError::Http(format!("POST {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let async_op = Self::async_operation_url(resp.headers());
        let body_val: Value = resp.json().await.unwrap_or(Value::Null);

        if !(200..300).contains(&status) {
            return Err(Self::api_error("POST", url, status, &body_val));
        }
        match async_op.filter(|_| status == 202) {
            Some(op_url) => self.wait_for_operation(&op_url).await,
            None => Ok(body_val),
        }
    }

    async fn arm_delete(&self, url: &str) -> Result<(), AzureError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM DELETE");
        let resp = self
            .client
            .delete(url)
            .bearer_auth(&token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| AzureError::Http(format!("DELETE {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        if status == 202 {
            if let Some(op_url) = Self::async_operation_url(resp.headers()) {
                self.wait_for_operation(&op_url).await?;
            }
            return Ok(());
        }
        if status == 404 || (200..300).contains(&status) {
            return Ok(());
        }

        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Err(Self::api_error("DELETE", url, status, &body))
    }

    fn deployment_url(&self, target: &DeploymentTarget, name: &str, suffix: &str) -> String {
        self.url(
            &format!("{}/{}{}", target.deployments_path(), name, suffix),
            DEPLOYMENTS_API_VERSION,
        )
    }

    fn provider_path(subscription_id: &str, resource_group: &str, provider: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            subscription_id, resource_group, provider, name
        )
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AzureError> {
    serde_json::from_value(value).map_err(|e| AzureError::Decode(e.to_string()))
}

fn deployment_body(
    target: &DeploymentTarget,
    template: &Value,
    parameters: &Value,
    tags: Option<&HashMap<String, String>>,
) -> Value {
    let mut body = json!({
        "properties": {
            "template": template,
            "parameters": parameters,
            "mode": "Incremental",
        }
    });
    if let DeploymentTarget::Subscription { location, .. } = target {
        body["location"] = json!(location);
    }
    if let Some(tags) = tags.filter(|t| !t.is_empty()) {
        body["tags"] = json!(tags);
    }
    body
}

// ── DeploymentService ─────────────────────────────────────────────────────────

#[async_trait]
impl DeploymentService for ArmClient {
    async fn deploy(
        &self,
        target: &DeploymentTarget,
        name: &str,
        template: &Value,
        parameters: &Value,
        tags: &HashMap<String, String>,
    ) -> Result<DeploymentExtended, AzureError> {
        let url = self.deployment_url(target, name, "");
        let body = deployment_body(target, template, parameters, Some(tags));
        info!(deployment = name, "starting ARM deployment");
        let created = self.arm_put_and_wait(&url, &body).await?;
        decode(created)
    }

    async fn get(&self, target: &DeploymentTarget, name: &str) -> Result<DeploymentExtended, AzureError> {
        let url = self.deployment_url(target, name, "");
        let body = self
            .arm_get_ok(&url, || AzureError::DeploymentNotFound(name.to_string()))
            .await?;
        decode(body)
    }

    async fn list(&self, target: &DeploymentTarget) -> Result<Vec<DeploymentExtended>, AzureError> {
        let url = self.url(&target.deployments_path(), DEPLOYMENTS_API_VERSION);
        self.arm_list(&url).await
    }

    async fn delete(&self, target: &DeploymentTarget, name: &str) -> Result<(), AzureError> {
        let url = self.deployment_url(target, name, "");
        self.arm_delete(&url).await
    }

    async fn what_if(
        &self,
        target: &DeploymentTarget,
        name: &str,
        template: &Value,
        parameters: &Value,
    ) -> Result<Vec<WhatIfChange>, AzureError> {
        let url = self.deployment_url(target, name, "/whatIf");
        let body = deployment_body(target, template, parameters, None);
        let result = self.arm_post(&url, &body).await?;
        if result["status"].as_str() == Some("Failed") {
            return Err(AzureError::OperationFailed(Self::parse_arm_error(&result)));
        }
        match result.pointer("/properties/changes") {
            Some(changes) => decode(changes.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn operations(
        &self,
        target: &DeploymentTarget,
        name: &str,
    ) -> Result<Vec<DeploymentOperation>, AzureError> {
        let url = self.deployment_url(target, name, "/operations");
        match self.arm_list(&url).await {
            Err(AzureError::NotFound(_)) => Err(AzureError::DeploymentNotFound(name.to_string())),
            other => other,
        }
    }
}

// ── ResourceService ───────────────────────────────────────────────────────────

#[async_trait]
impl ResourceService for ArmClient {
    async fn list_resource_groups(
        &self,
        subscription_id: &str,
        tag_name: &str,
        tag_value: &str,
    ) -> Result<Vec<String>, AzureError> {
        let filter = format!("tagName eq '{}' and tagValue eq '{}'", tag_name, tag_value);
        let mut url = reqwest::Url::parse(&self.url(
            &format!("/subscriptions/{}/resourcegroups", subscription_id),
            RESOURCES_API_VERSION,
        ))
        .map_err(|e| AzureError::Http(e.to_string()))?;
        url.query_pairs_mut().append_pair("$filter", &filter);

        let groups: Vec<AzureResource> = self.arm_list(url.as_str()).await?;
        Ok(groups.into_iter().map(|g| g.name).collect())
    }

    async fn list_resource_group_resources(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<Vec<AzureResource>, AzureError> {
        let url = self.url(
            &format!("/subscriptions/{}/resourceGroups/{}/resources", subscription_id, resource_group),
            RESOURCES_API_VERSION,
        );
        self.arm_list(&url).await
    }

    async fn delete_resource_group(&self, subscription_id: &str, resource_group: &str) -> Result<(), AzureError> {
        let url = self.url(
            &format!("/subscriptions/{}/resourcegroups/{}", subscription_id, resource_group),
            RESOURCES_API_VERSION,
        );
        self.arm_delete(&url).await
    }

    async fn get_key_vault(&self, subscription_id: &str, resource_group: &str, name: &str) -> Result<KeyVault, AzureError> {
        let path = Self::provider_path(subscription_id, resource_group, "Microsoft.KeyVault/vaults", name);
        let url = self.url(&path, KEY_VAULT_API_VERSION);
        let body = self.arm_get_ok(&url, || AzureError::NotFound(path.clone())).await?;
        Ok(KeyVault {
            id: body["id"].as_str().unwrap_or(&path).to_string(),
            name: name.to_string(),
            location: body["location"].as_str().unwrap_or_default().to_string(),
            enable_soft_delete: body.pointer("/properties/enableSoftDelete").and_then(Value::as_bool).unwrap_or(false),
            enable_purge_protection: body
                .pointer("/properties/enablePurgeProtection")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    async fn purge_key_vault(&self, subscription_id: &str, name: &str, location: &str) -> Result<(), AzureError> {
        let url = self.url(
            &format!(
                "/subscriptions/{}/providers/Microsoft.KeyVault/locations/{}/deletedVaults/{}/purge",
                subscription_id, location, name
            ),
            KEY_VAULT_API_VERSION,
        );
        self.arm_post(&url, &Value::Null).await.map(|_| ())
    }

    async fn get_app_configuration(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<AppConfiguration, AzureError> {
        let path = Self::provider_path(
            subscription_id,
            resource_group,
            "Microsoft.AppConfiguration/configurationStores",
            name,
        );
        let url = self.url(&path, APP_CONFIG_API_VERSION);
        let body = self.arm_get_ok(&url, || AzureError::NotFound(path.clone())).await?;
        let retention = body
            .pointer("/properties/softDeleteRetentionInDays")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        // The free SKU has no soft delete.
        let free = body.pointer("/sku/name").and_then(Value::as_str) == Some("free");
        Ok(AppConfiguration {
            id: body["id"].as_str().unwrap_or(&path).to_string(),
            name: name.to_string(),
            location: body["location"].as_str().unwrap_or_default().to_string(),
            enable_soft_delete: !free && retention > 0,
            enable_purge_protection: body
                .pointer("/properties/enablePurgeProtection")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    async fn purge_app_configuration(&self, subscription_id: &str, name: &str, location: &str) -> Result<(), AzureError> {
        let url = self.url(
            &format!(
                "/subscriptions/{}/providers/Microsoft.AppConfiguration/locations/{}/deletedConfigurationStores/{}/purge",
                subscription_id, location, name
            ),
            APP_CONFIG_API_VERSION,
        );
        self.arm_post(&url, &Value::Null).await.map(|_| ())
    }

    async fn get_api_management(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Result<ApiManagement, AzureError> {
        let path = Self::provider_path(subscription_id, resource_group, "Microsoft.ApiManagement/service", name);
        let url = self.url(&path, APIM_API_VERSION);
        let body = self.arm_get_ok(&url, || AzureError::NotFound(path.clone())).await?;
        Ok(ApiManagement {
            id: body["id"].as_str().unwrap_or(&path).to_string(),
            name: name.to_string(),
            location: body["location"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn purge_api_management(&self, subscription_id: &str, name: &str, location: &str) -> Result<(), AzureError> {
        let url = self.url(
            &format!(
                "/subscriptions/{}/providers/Microsoft.ApiManagement/locations/{}/deletedservices/{}",
                subscription_id, location, name
            ),
            APIM_API_VERSION,
        );
        self.arm_delete(&url).await
    }
}

// ── AccountService ────────────────────────────────────────────────────────────

#[async_trait]
impl AccountService for ArmClient {
    async fn subscriptions(&self) -> Result<Vec<Subscription>, AzureError> {
        let url = self.url("/subscriptions", SUBSCRIPTIONS_API_VERSION);
        self.arm_list(&url).await
    }

    async fn locations(&self, subscription_id: &str) -> Result<Vec<Location>, AzureError> {
        let url = self.url(&format!("/subscriptions/{}/locations", subscription_id), SUBSCRIPTIONS_API_VERSION);
        let mut locations: Vec<Location> = self
            .arm_list::<Value>(&url)
            .await?
            .into_iter()
            // Logical regions such as "global" or "us" cannot host resources.
            .filter(|l| l.pointer("/metadata/regionType").and_then(Value::as_str) != Some("Logical"))
            .map(decode)
            .collect::<Result<_, _>>()?;
        locations.sort_by(|a, b| a.regional_display_name.cmp(&b.regional_display_name));
        Ok(locations)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use wiremock::{
        matchers::{body_partial_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const SUB: &str = "sub-123";

    fn client(server: &MockServer) -> ArmClient {
        ArmClient::new(Arc::new(StaticToken("fake-token".into())), "azd/test")
            .with_base_url(server.uri())
            .with_poll_delays(vec![0])
    }

    fn sub_target() -> DeploymentTarget {
        DeploymentTarget::Subscription { subscription_id: SUB.into(), location: "eastus2".into() }
    }

    // ── wait_for_operation ────────────────────────────────────────────────────

    #[tokio::test]
    async fn wait_for_operation_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/operations/test-op"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Succeeded" })))
            .mount(&server)
            .await;

        let url = format!("{}/operations/test-op", server.uri());
        let res = client(&server).wait_for_operation(&url).await.unwrap();
        assert_eq!(res["status"].as_str(), Some("Succeeded"));
    }

    #[tokio::test]
    async fn wait_for_operation_fails_on_failed_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/operations/op-fail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": { "code": "InternalError", "message": "Something went wrong" }
            })))
            .mount(&server)
            .await;

        let url = format!("{}/operations/op-fail", server.uri());
        let err = client(&server).wait_for_operation(&url).await.unwrap_err();
        assert!(matches!(err, AzureError::OperationFailed(_)), "got: {}", err);
        assert!(err.to_string().contains("InternalError"), "got: {}", err);
    }

    #[tokio::test]
    async fn location_polling_finishes_on_plain_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/operations/rg-delete"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = format!("{}/operations/rg-delete", server.uri());
        assert!(client(&server).wait_for_operation(&url).await.is_ok());
    }

    // ── parse_arm_error (pure) ────────────────────────────────────────────────

    #[test]
    fn parse_arm_error_standard() {
        let body = json!({
            "error": { "code": "ResourceNotFound", "message": "The resource was not found" }
        });
        let msg = ArmClient::parse_arm_error(&body);
        assert_eq!(msg, "ResourceNotFound: The resource was not found");
    }

    #[test]
    fn parse_arm_error_missing_fields_gives_fallback() {
        let msg = ArmClient::parse_arm_error(&json!({ "error": {} }));
        assert_eq!(msg, "Unknown: unknown error");
    }

    // ── Deployments ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn deploy_at_subscription_scope_waits_for_completion() {
        let server = MockServer::start().await;
        let deployment_path = format!("/subscriptions/{}/providers/Microsoft.Resources/deployments/dev-1", SUB);

        Mock::given(method("PUT"))
            .and(path(deployment_path.as_str()))
            .and(header("authorization", "Bearer fake-token"))
            .and(body_partial_json(json!({
                "location": "eastus2",
                "tags": { "azd-env-name": "dev" },
                "properties": { "mode": "Incremental" }
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Azure-AsyncOperation", format!("{}/operations/deploy", server.uri()))
                    .set_body_json(json!({ "name": "dev-1", "properties": { "provisioningState": "Accepted" } })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/deploy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Succeeded" })))
            .expect(1)
            .mount(&server)
            .await;

        let tags = HashMap::from([("azd-env-name".to_string(), "dev".to_string())]);
        let deployment = client(&server)
            .deploy(&sub_target(), "dev-1", &json!({}), &json!({}), &tags)
            .await
            .unwrap();
        assert_eq!(deployment.name, "dev-1");
    }

    #[tokio::test]
    async fn get_missing_deployment_is_deployment_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/resourcegroups/rg/providers/Microsoft.Resources/deployments/gone", SUB)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "DeploymentNotFound", "message": "not found" }
            })))
            .mount(&server)
            .await;

        let target = DeploymentTarget::ResourceGroup { subscription_id: SUB.into(), resource_group: "rg".into() };
        let err = client(&server).get(&target, "gone").await.unwrap_err();
        assert!(matches!(err, AzureError::DeploymentNotFound(name) if name == "gone"));
    }

    #[tokio::test]
    async fn get_deployment_decodes_outputs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/providers/Microsoft.Resources/deployments/dev-1", SUB)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "/subscriptions/sub-123/providers/Microsoft.Resources/deployments/dev-1",
                "name": "dev-1",
                "tags": { "azd-env-name": "dev" },
                "properties": {
                    "provisioningState": "Succeeded",
                    "timestamp": "2024-01-02T03:04:05Z",
                    "outputs": { "webUri": { "type": "String", "value": "https://x" } },
                    "outputResources": [ { "id": "/subscriptions/sub-123/resourceGroups/rg-dev" } ]
                }
            })))
            .mount(&server)
            .await;

        let deployment = client(&server).get(&sub_target(), "dev-1").await.unwrap();
        assert_eq!(deployment.tag("azd-env-name"), Some("dev"));
        assert_eq!(deployment.outputs()["webUri"].value, json!("https://x"));
        assert_eq!(deployment.properties.output_resources.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_follows_next_link() {
        let server = MockServer::start().await;
        let list_path = format!("/subscriptions/{}/providers/Microsoft.Resources/deployments", SUB);
        Mock::given(method("GET"))
            .and(path(list_path.as_str()))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [ { "name": "b" } ] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(list_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { "name": "a" } ],
                "nextLink": format!("{}{}?api-version=2021-04-01&page=2", server.uri(), list_path)
            })))
            .mount(&server)
            .await;

        let names: Vec<String> = client(&server)
            .list(&sub_target())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn what_if_returns_changes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/subscriptions/{}/providers/Microsoft.Resources/deployments/dev-1/whatIf", SUB)))
            .respond_with(
                ResponseTemplate::new(202).insert_header("Location", format!("{}/operations/whatif", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/whatif"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Succeeded",
                "properties": { "changes": [ { "resourceId": "/subscriptions/sub-123/resourceGroups/rg", "changeType": "Create" } ] }
            })))
            .mount(&server)
            .await;

        let changes = client(&server)
            .what_if(&sub_target(), "dev-1", &json!({}), &json!({}))
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, "Create");
    }

    // ── Resources ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn list_resource_groups_filters_by_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/resourcegroups", SUB)))
            .and(query_param("$filter", "tagName eq 'azd-env-name' and tagValue eq 'dev'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { "id": "/subscriptions/sub-123/resourceGroups/rg-dev", "name": "rg-dev", "type": "Microsoft.Resources/resourceGroups", "location": "eastus2" } ]
            })))
            .mount(&server)
            .await;

        let groups = client(&server).list_resource_groups(SUB, "azd-env-name", "dev").await.unwrap();
        assert_eq!(groups, vec!["rg-dev"]);
    }

    #[tokio::test]
    async fn delete_resource_group_polls_location() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("/subscriptions/{}/resourcegroups/rg-dev", SUB)))
            .respond_with(
                ResponseTemplate::new(202).insert_header("Location", format!("{}/operations/rg", server.uri())),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/rg"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete_resource_group(SUB, "rg-dev").await.unwrap();
    }

    #[tokio::test]
    async fn get_key_vault_reads_soft_delete_flags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/kv1", SUB)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "kv-id",
                "location": "eastus2",
                "properties": { "enableSoftDelete": true, "enablePurgeProtection": false }
            })))
            .mount(&server)
            .await;

        let vault = client(&server).get_key_vault(SUB, "rg", "kv1").await.unwrap();
        assert!(vault.enable_soft_delete);
        assert!(!vault.enable_purge_protection);
        assert_eq!(vault.location, "eastus2");
    }

    #[tokio::test]
    async fn purge_key_vault_posts_to_deleted_vaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/subscriptions/{}/providers/Microsoft.KeyVault/locations/eastus2/deletedVaults/kv1/purge", SUB)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).purge_key_vault(SUB, "kv1", "eastus2").await.unwrap();
    }

    #[tokio::test]
    async fn purge_failure_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("/subscriptions/{}/providers/Microsoft.ApiManagement/locations/eastus2/deletedservices/apim", SUB)))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": "AuthorizationFailed", "message": "denied" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).purge_api_management(SUB, "apim", "eastus2").await.unwrap_err();
        assert!(matches!(err, AzureError::Api { status: 403, .. }), "got: {}", err);
    }

    #[tokio::test]
    async fn locations_skip_logical_regions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/locations", SUB)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "name": "westus", "displayName": "West US", "regionalDisplayName": "(US) West US", "metadata": { "regionType": "Physical" } },
                    { "name": "global", "displayName": "Global", "regionalDisplayName": "Global", "metadata": { "regionType": "Logical" } },
                    { "name": "eastus", "displayName": "East US", "regionalDisplayName": "(US) East US", "metadata": { "regionType": "Physical" } }
                ]
            })))
            .mount(&server)
            .await;

        let names: Vec<String> = client(&server)
            .locations(SUB)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["eastus", "westus"]);
    }
}
