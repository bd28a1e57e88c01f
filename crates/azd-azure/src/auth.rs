use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AzureError;

pub const ARM_SCOPE: &str = "https://management.azure.com/.default";
pub const DEVCENTER_SCOPE: &str = "https://devcenter.azure.com/.default";

/// Abstraction over bearer-token acquisition.
#[async_trait]
pub trait TokenCredential: Send + Sync + 'static {
    async fn token(&self, scope: &str) -> Result<String, AzureError>;
}

// ── Token cache ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Per-scope token cache shared by concurrent callers.
///
/// Readers take the read lock and return a live token. On a miss the caller
/// takes the write lock and checks again before fetching, so a burst of
/// concurrent first requests performs exactly one fetch.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F, Fut>(&self, scope: &str, fetch: F) -> Result<String, AzureError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), AzureError>>,
    {
        {
            let guard = self.entries.read().await;
            if let Some(cached) = guard.get(scope).filter(|c| Instant::now() < c.expires_at) {
                return Ok(cached.token.clone());
            }
        }

        let mut guard = self.entries.write().await;
        if let Some(cached) = guard.get(scope).filter(|c| Instant::now() < c.expires_at) {
            return Ok(cached.token.clone());
        }

        let (token, lifetime) = fetch().await?;
        // Refresh a minute early so a token never expires mid-request.
        let expires_at = Instant::now() + lifetime.saturating_sub(Duration::from_secs(60));
        guard.insert(scope.to_string(), CachedToken { token: token.clone(), expires_at });
        Ok(token)
    }
}

// ── Service Principal ─────────────────────────────────────────────────────────

pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    login_base: String,
    client: reqwest::Client,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            tenant_id,
            client_id,
            client_secret,
            login_base: "https://login.microsoftonline.com".into(),
            client: reqwest::Client::new(),
            cache: TokenCache::new(),
        }
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self, scope: &str) -> Result<String, AzureError> {
        self.cache
            .get_or_fetch(scope, || async {
                let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
                let params = [
                    ("grant_type", "client_credentials"),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("scope", scope),
                ];
                let resp: Value = self
                    .client
                    .post(&url)
                    .form(&params)
                    .send()
                    .await
                    .map_err(|e| AzureError::Auth(format!("SP token request: {}", e)))?
                    .json()
                    .await
                    .map_err(|e| AzureError::Auth(format!("SP token decode: {}", e)))?;

                let tok = resp["access_token"]
                    .as_str()
                    .ok_or_else(|| AzureError::Auth(format!("SP token: no access_token in response: {}", resp)))?
                    .to_string();
                let expires_in = resp["expires_in"].as_u64().unwrap_or(3600);
                Ok((tok, Duration::from_secs(expires_in)))
            })
            .await
    }
}

// ── Managed Identity (IMDS) ───────────────────────────────────────────────────

pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new(), cache: TokenCache::new() }
    }
}

impl Default for ManagedIdentityCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn token(&self, scope: &str) -> Result<String, AzureError> {
        let resource = scope.trim_end_matches(".default").to_string();
        self.cache
            .get_or_fetch(scope, || async {
                let resp: Value = self
                    .client
                    .get("http://169.254.169.254/metadata/identity/oauth2/token")
                    .header("Metadata", "true")
                    .query(&[("api-version", "2018-02-01"), ("resource", resource.as_str())])
                    .send()
                    .await
                    .map_err(|e| AzureError::Auth(format!("IMDS token request: {}", e)))?
                    .json()
                    .await
                    .map_err(|e| AzureError::Auth(format!("IMDS token decode: {}", e)))?;

                let tok = resp["access_token"]
                    .as_str()
                    .ok_or_else(|| AzureError::Auth(format!("IMDS token: no access_token: {}", resp)))?
                    .to_string();
                let expires_in = resp["expires_in"]
                    .as_str()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(3600);
                Ok((tok, Duration::from_secs(expires_in)))
            })
            .await
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

pub struct AzureCliCredential {
    tenant_id: Option<String>,
    cache: TokenCache,
}

impl AzureCliCredential {
    pub fn new(tenant_id: Option<String>) -> Self {
        Self { tenant_id, cache: TokenCache::new() }
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn token(&self, scope: &str) -> Result<String, AzureError> {
        self.cache
            .get_or_fetch(scope, || async {
                let mut args = vec!["account", "get-access-token", "--scope", scope, "--output", "json"];
                if let Some(tenant) = self.tenant_id.as_deref().filter(|t| !t.is_empty()) {
                    args.extend(["--tenant", tenant]);
                }
                debug!(scope, "requesting token from Azure CLI");

                let output = tokio::process::Command::new("az")
                    .args(&args)
                    .output()
                    .await
                    .map_err(|e| AzureError::Auth(format!("az CLI not found: {}. Install the Azure CLI or configure service principal credentials.", e)))?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(AzureError::Auth(format!(
                        "az account get-access-token failed: {}. Run 'az login' first.",
                        stderr.trim()
                    )));
                }

                let resp: Value = serde_json::from_slice(&output.stdout)
                    .map_err(|e| AzureError::Auth(format!("az CLI output parse: {}", e)))?;
                let tok = resp["accessToken"]
                    .as_str()
                    .ok_or_else(|| AzureError::Auth("az CLI: no accessToken in output".into()))?
                    .to_string();
                let lifetime = resp["expires_on"]
                    .as_i64()
                    .map(|at| at - chrono::Utc::now().timestamp())
                    .filter(|secs| *secs > 0)
                    .map(|secs| Duration::from_secs(secs as u64))
                    .unwrap_or(Duration::from_secs(300));
                Ok((tok, lifetime))
            })
            .await
    }
}

// ── Static (tests) ────────────────────────────────────────────────────────────

pub struct StaticToken(pub String);

#[async_trait]
impl TokenCredential for StaticToken {
    async fn token(&self, _scope: &str) -> Result<String, AzureError> {
        Ok(self.0.clone())
    }
}

/// Pick a credential the same way for every client:
/// 1. `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET` + tenant → Service Principal
/// 2. `IDENTITY_ENDPOINT` env var → Managed Identity (IMDS)
/// 3. Otherwise → Azure CLI (`az account get-access-token`)
pub fn default_credential(tenant_id: Option<String>) -> Arc<dyn TokenCredential> {
    let tenant = tenant_id
        .filter(|t| !t.is_empty())
        .or_else(|| std::env::var("AZURE_TENANT_ID").ok().filter(|t| !t.is_empty()));

    if let (Ok(cid), Ok(cs), Some(tid)) = (
        std::env::var("AZURE_CLIENT_ID"),
        std::env::var("AZURE_CLIENT_SECRET"),
        tenant.clone(),
    ) {
        return Arc::new(ClientSecretCredential::new(tid, cid, cs));
    }
    if std::env::var("IDENTITY_ENDPOINT").is_ok() {
        return Arc::new(ManagedIdentityCredential::new());
    }
    Arc::new(AzureCliCredential::new(tenant))
}
