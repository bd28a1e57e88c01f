use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use azd_async::Task;
use azd_azure::Scope;
use azd_domain::{Deployment, DestroyOptions, Options, Progress, State};
use azd_store::{EnvironmentStore, SharedEnvironment};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::console::Console;
use crate::error::ProvisionError;
use crate::prompt::Prompter;

/// A long-running provider operation.
pub type ProvisionTask<R> = Task<R, Progress, ProvisionError>;

/// Provider-specific material produced by `plan` and consumed by `deploy`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDetails {
    Arm {
        template: Value,
        /// ARM parameters object: `{ "<name>": { "value": ... } }`.
        parameters: Value,
    },
    Terraform {
        plan_file: PathBuf,
        var_file: PathBuf,
        state_file: Option<PathBuf>,
    },
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentPlan {
    pub deployment: Deployment,
    pub details: PlanDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployResult {
    pub deployment: Deployment,
}

/// One predicted change to a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewChange {
    pub change_type: String,
    pub resource_type: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPreview {
    pub status: String,
    pub changes: Vec<PreviewChange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployPreviewResult {
    pub preview: DeploymentPreview,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateResult {
    pub state: State,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestroyResult {
    /// Environment values that no longer hold after the destroy.
    pub invalidated_env_keys: Vec<String>,
}

/// Collaborators every provider is constructed with.
#[derive(Clone)]
pub struct ProviderContext {
    pub env: SharedEnvironment,
    pub store: Arc<dyn EnvironmentStore>,
    pub console: Arc<dyn Console>,
    pub prompter: Arc<dyn Prompter>,
}

impl ProviderContext {
    pub fn new(
        env: SharedEnvironment,
        store: Arc<dyn EnvironmentStore>,
        console: Arc<dyn Console>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self { env, store, console, prompter }
    }

    pub async fn env_name(&self) -> String {
        self.env.read().await.name().to_string()
    }
}

/// A provisioning backend.
///
/// The manager drives every provider through the same sequence:
/// `initialize`, then `plan` or `preview`, then `deploy`; `state` and
/// `destroy` may follow any successful `initialize`. Operations other than
/// `initialize` return a [`ProvisionTask`] whose body runs on its own tokio
/// task, so implementations keep their collaborators behind `Arc`s and move
/// clones into the body.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Bind the provider to the infrastructure at `project_path`.
    ///
    /// Calling this again with an environment that is already configured does
    /// not prompt.
    async fn initialize(&mut self, project_path: &Path, options: Options) -> Result<(), ProvisionError>;

    fn plan(&self) -> ProvisionTask<DeploymentPlan>;

    /// Whether `deploy` needs an Azure location resolved by the caller.
    /// Providers whose backend picks the placement return `false`.
    fn requires_location(&self) -> bool {
        true
    }

    fn preview(&self) -> ProvisionTask<DeployPreviewResult> {
        Task::from_result(Err(ProvisionError::NotSupported(format!(
            "preview is not supported for {}",
            self.name()
        ))))
    }

    fn deploy(&self, plan: DeploymentPlan, scope: Scope) -> ProvisionTask<DeployResult>;

    fn state(&self, scope: Scope) -> ProvisionTask<StateResult>;

    fn destroy(&self, deployment: Deployment, options: DestroyOptions) -> ProvisionTask<DestroyResult>;
}

/// Resolve `<project>/<path>/<module><extension>`.
pub(crate) fn module_file(project_path: &Path, options: &Options, extension: &str) -> PathBuf {
    project_path
        .join(&options.path)
        .join(format!("{}{}", options.module, extension))
}

/// Output keys are upper-cased on the way in so consumers see one casing no
/// matter how the template was written.
pub(crate) fn normalize_output_key(key: &str) -> String {
    key.to_uppercase()
}
