use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use azd_async::TaskEvent;
use azd_azure::{resource_types, DeploymentService, Scope};
use azd_domain::{DestroyOptions, Options, OutputParameter, ProviderKind};
use tracing::{debug, info};

use crate::console::Console;
use crate::error::{ProvisionError, ResultExt};
use crate::prompt::LOCATION_PROMPT;
use crate::provider::{
    DeployPreviewResult, DeployResult, DeploymentPlan, DestroyResult, Provider, ProviderContext, ProvisionTask,
    StateResult,
};
use crate::registry::ProviderRegistry;

const LOCATION_PARAMETER: &str = "location";

/// Stops the spinner when dropped, whatever way the operation ends.
struct SpinnerGuard<'a> {
    console: &'a dyn Console,
}

impl<'a> SpinnerGuard<'a> {
    fn start(console: &'a dyn Console, title: &str) -> Self {
        console.show_spinner(title);
        Self { console }
    }
}

impl Drop for SpinnerGuard<'_> {
    fn drop(&mut self) {
        self.console.stop_spinner();
    }
}

/// Drives the active provider through provision, preview, state and destroy,
/// and keeps the local environment in step with the results.
pub struct Manager {
    registry: Arc<ProviderRegistry>,
    context: ProviderContext,
    deployments: Arc<dyn DeploymentService>,
    project_path: PathBuf,
    options: Options,
    provider: Option<Box<dyn Provider>>,
}

impl Manager {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        context: ProviderContext,
        deployments: Arc<dyn DeploymentService>,
        project_path: impl Into<PathBuf>,
        options: Options,
    ) -> Self {
        Self {
            registry,
            context,
            deployments,
            project_path: project_path.into(),
            options: options.with_defaults(&[]),
            provider: None,
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Create the configured provider and bind it to the project.
    pub async fn initialize(&mut self) -> Result<(), ProvisionError> {
        let kind = self.options.provider.unwrap_or(ProviderKind::Bicep);
        let mut provider = self
            .registry
            .create(kind)
            .context("initializing infrastructure provider")?;
        debug!(provider = provider.name(), path = %self.project_path.display(), "initializing provider");

        provider
            .initialize(&self.project_path, self.options.clone())
            .await
            .context("initializing infrastructure provider")?;
        self.provider = Some(provider);
        Ok(())
    }

    fn provider(&self) -> Result<&dyn Provider, ProvisionError> {
        self.provider
            .as_deref()
            .ok_or_else(|| ProvisionError::InvalidParameter("provisioning manager is not initialized".into()))
    }

    /// Forward the task's progress into the spinner title and pause the
    /// spinner while the task is prompting.
    async fn run_with_progress<R: Send + 'static>(
        &self,
        title: &str,
        mut task: ProvisionTask<R>,
    ) -> Result<R, ProvisionError> {
        let console = self.context.console.as_ref();
        let _spinner = SpinnerGuard::start(console, title);
        let mut current = title.to_string();

        while let Some(event) = task.next_event().await {
            match event {
                TaskEvent::Progress(progress) => {
                    current = progress.message;
                    if console.is_spinner_running() {
                        console.show_spinner(&current);
                    }
                }
                TaskEvent::Interactive(true) => console.stop_spinner(),
                TaskEvent::Interactive(false) => console.show_spinner(&current),
            }
        }
        task.wait().await
    }

    pub async fn plan(&self) -> Result<DeploymentPlan, ProvisionError> {
        let provider = self.provider()?;
        self.run_with_progress("Planning infrastructure provisioning", provider.plan())
            .await
            .context("planning infrastructure provisioning")
    }

    /// Plan, deploy, then write the deployment outputs to the environment.
    pub async fn provision(&self) -> Result<DeployResult, ProvisionError> {
        let provider = self.provider()?;
        let plan = self.plan().await?;

        let location = if provider.requires_location() {
            self.ensure_location(&plan).await?
        } else {
            self.context.env.read().await.location()
        };
        let scope = {
            let env = self.context.env.read().await;
            Scope::subscription(self.deployments.clone(), env.subscription_id(), location, env.name())
        };

        let result = self
            .run_with_progress("Provisioning Azure resources", provider.deploy(plan, scope))
            .await
            .context("error deploying infrastructure")?;

        self.update_environment(&result.deployment.outputs)
            .await
            .context("updating environment with deployment outputs")?;

        info!(outputs = result.deployment.outputs.len(), "infrastructure provisioned");
        self.context
            .console
            .message("\nSUCCESS: Your Azure resources have been provisioned");
        Ok(result)
    }

    /// Predicted changes, with resource types replaced by their display names
    /// where one is known.
    pub async fn preview(&self) -> Result<DeployPreviewResult, ProvisionError> {
        let provider = self.provider()?;
        let mut result = self
            .run_with_progress("Generating infrastructure preview", provider.preview())
            .await
            .context("error previewing infrastructure")?;

        for change in &mut result.preview.changes {
            if let Some(display) = resource_types::display_name(&change.resource_type) {
                change.resource_type = display.to_string();
            }
        }
        Ok(result)
    }

    pub async fn state(&self) -> Result<StateResult, ProvisionError> {
        let provider = self.provider()?;
        let scope = self.environment_scope().await;
        self.run_with_progress("Retrieving infrastructure state", provider.state(scope))
            .await
            .context("error retrieving state")
    }

    /// Destroy the infrastructure, then drop every invalidated value from the
    /// environment and save it.
    pub async fn destroy(&self, options: DestroyOptions) -> Result<DestroyResult, ProvisionError> {
        let provider = self.provider()?;
        let plan = self.plan().await?;

        let result = self
            .run_with_progress("Deleting Azure resources", provider.destroy(plan.deployment, options))
            .await
            .context("error deleting Azure resources")?;

        {
            let mut env = self.context.env.write().await;
            for key in &result.invalidated_env_keys {
                env.dotenv_delete(key);
            }
            self.context.store.save(&env).await.context("saving environment")?;
        }

        info!(invalidated = result.invalidated_env_keys.len(), "infrastructure destroyed");
        self.context
            .console
            .message("\nSUCCESS: Your Azure resources have been deleted");
        Ok(result)
    }

    /// Write each output into the environment's values and save. Arrays and
    /// objects are stored as compact JSON.
    pub async fn update_environment(
        &self,
        outputs: &HashMap<String, OutputParameter>,
    ) -> Result<(), ProvisionError> {
        if outputs.is_empty() {
            return Ok(());
        }

        let mut env = self.context.env.write().await;
        for (key, output) in outputs {
            env.dotenv_set(key.clone(), output.env_value());
        }
        self.context.store.save(&env).await.context("writing environment")?;
        Ok(())
    }

    /// The deployment location: the template's `location` parameter when it
    /// holds a value, else the environment's, else a prompt. The answer is
    /// not written back anywhere.
    async fn ensure_location(&self, plan: &DeploymentPlan) -> Result<String, ProvisionError> {
        let from_parameter = plan.deployment.parameters.get(LOCATION_PARAMETER).and_then(|param| {
            param
                .value
                .as_ref()
                .or(param.default_value.as_ref())
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
        if let Some(location) = from_parameter {
            return Ok(location);
        }

        let (subscription_id, location) = {
            let env = self.context.env.read().await;
            (env.subscription_id(), env.location())
        };
        if !location.trim().is_empty() {
            return Ok(location);
        }

        let mut location = String::new();
        while location.trim().is_empty() {
            location = self
                .context
                .prompter
                .prompt_location(&subscription_id, LOCATION_PROMPT)
                .await?;
        }
        Ok(location)
    }

    async fn environment_scope(&self) -> Scope {
        let env = self.context.env.read().await;
        Scope::subscription(self.deployments.clone(), env.subscription_id(), env.location(), env.name())
    }
}
