use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use azd_async::{Task, TaskContext};
use azd_azure::{DeploymentExtended, DevCenterEnvironment, EnvironmentDefinition, EnvironmentSpec, Project, Scope};
use azd_domain::{ConfigTree, Deployment, DestroyOptions, InputParameter, Options, Progress, Resource, State};
use azd_provisioning::{
    progress_disabled, ConsoleOptions, DeployPreviewResult, DeployResult, DeploymentPlan, DeploymentProgress,
    DestroyResult, PlanDetails, Provider, ProviderContext, ProvisionError, ProvisionTask, ResultExt, StateResult,
};
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Config, DEFAULT_USER};
use crate::manager::DevCenterManager;
use crate::prompter::{DevCenterPrompter, PROVISION_PARAMETERS_PATH};

const CONFIRM_DESTROY_PROMPT: &str = "Are you sure you want to continue?";

/// Poll timings for deploy.
#[derive(Debug, Clone)]
pub struct DevCenterSettings {
    /// Wait before and between checks for the environment's resource group
    /// and ARM deployment.
    pub environment_initial_delay: Duration,
    pub environment_interval: Duration,
    /// Wait before and between deployment operation listings.
    pub progress_initial_delay: Duration,
    pub progress_interval: Duration,
}

impl Default for DevCenterSettings {
    fn default() -> Self {
        Self {
            environment_initial_delay: Duration::from_secs(3),
            environment_interval: Duration::from_secs(5),
            progress_initial_delay: Duration::from_secs(3),
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Provisions an Azure Deployment Environments environment from a catalog
/// definition. ADE runs the deployment; this provider creates or deletes the
/// environment and reads its outputs back.
#[derive(Clone)]
pub struct DevCenterProvider {
    context: ProviderContext,
    manager: Arc<DevCenterManager>,
    prompter: Arc<DevCenterPrompter>,
    project_config: ConfigTree,
    user_config: ConfigTree,
    settings: DevCenterSettings,
    config: Config,
    infra_path: PathBuf,
}

impl DevCenterProvider {
    /// `project_config` is the project file's `platform.config` section and
    /// `user_config` the whole user config tree.
    pub fn new(
        context: ProviderContext,
        manager: Arc<DevCenterManager>,
        project_config: ConfigTree,
        user_config: ConfigTree,
    ) -> Self {
        let prompter = Arc::new(DevCenterPrompter::new(context.console.clone(), manager.clone()));
        Self {
            context,
            manager,
            prompter,
            project_config,
            user_config,
            settings: DevCenterSettings::default(),
            config: Config::default(),
            infra_path: PathBuf::new(),
        }
    }

    pub fn with_settings(mut self, settings: DevCenterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The effective config after `initialize`.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Complete the config by prompting, then record in the environment
    /// every value no other source supplied.
    async fn ensure_env(&mut self) -> Result<(), ProvisionError> {
        let current = {
            let env = self.context.env.read().await;
            Config::resolve(&env, &self.project_config, &self.user_config)
        };

        let mut updated = current.clone();
        self.prompter.prompt_for_config(&mut updated).await?;
        if updated.environment_type.is_empty() {
            let env_type = self
                .prompter
                .prompt_environment_type(&updated.name, &updated.project)
                .await?;
            updated.environment_type = env_type.name;
        }
        if updated.user.is_empty() {
            updated.user = DEFAULT_USER.to_string();
        }

        let added = updated.added_since(&current);
        if !added.is_empty() {
            let mut env = self.context.env.write().await;
            for (path, value) in added {
                env.config_mut().set(path, value)?;
            }
            self.context.store.save(&env).await.context("failed saving environment")?;
        }

        self.config = updated;
        Ok(())
    }

    fn valid_config(&self) -> Result<&Config, ProvisionError> {
        self.config.ensure_valid().context("invalid devcenter configuration")?;
        Ok(&self.config)
    }

    async fn project(&self) -> Result<Project, ProvisionError> {
        let config = self.valid_config()?;
        self.manager
            .client()
            .project(&config.name, &config.project)
            .await
            .context("failed getting project")
    }

    async fn definition(&self, project: &Project) -> Result<EnvironmentDefinition, ProvisionError> {
        self.manager
            .client()
            .environment_definition(project, &self.config.catalog, &self.config.environment_definition)
            .await
            .context("failed getting environment definition")
    }

    async fn environment(&self, project: &Project, env_name: &str) -> Result<DevCenterEnvironment, ProvisionError> {
        self.manager
            .client()
            .environment(project, &self.config.user, env_name)
            .await
            .context("failed getting environment")
    }

    /// Settle every parameter, asking for the ones nothing else supplies,
    /// and cache the answers in the environment.
    async fn resolve_parameters(
        &self,
        ctx: &TaskContext<Progress>,
        definition: &EnvironmentDefinition,
    ) -> Result<HashMap<String, Value>, ProvisionError> {
        let known = {
            let env = self.context.env.read().await;
            DevCenterPrompter::known_parameters(&env, definition)?
        };

        let mut values = known.values;
        for param in &known.missing {
            let value = ctx
                .interact(move || self.prompter.prompt_parameter(param))
                .await
                .context("failed prompting for parameters")?;
            values.insert(param.id.clone(), value);
        }

        let mut env = self.context.env.write().await;
        for (key, value) in &values {
            let path = format!("{}.{}", PROVISION_PARAMETERS_PATH, key);
            env.config_mut()
                .set(&path, value.clone())
                .with_context(|| format!("failed setting config value {}", path))?;
        }
        self.context.store.save(&env).await.context("failed saving environment")?;
        Ok(values)
    }

    async fn plan_deployment(&self, ctx: &TaskContext<Progress>) -> Result<DeploymentPlan, ProvisionError> {
        ctx.set_progress(Progress::new("Retrieving environment definition"));
        let project = self.project().await?;
        let definition = self.definition(&project).await?;

        let known = {
            let env = self.context.env.read().await;
            DevCenterPrompter::known_parameters(&env, &definition)?
        };
        Ok(DeploymentPlan {
            deployment: Deployment { parameters: input_parameters(&definition, &known.values), outputs: HashMap::new() },
            details: PlanDetails::None,
        })
    }

    async fn deploy_environment(&self, ctx: &TaskContext<Progress>) -> Result<DeployResult, ProvisionError> {
        let project = self.project().await?;
        let config = &self.config;

        if has_infra_templates(&self.infra_path).await {
            self.context.console.message(&format!(
                "WARNING: IaC templates were found at '{}'. IaC templates are not supported for Dev Center environments and will be ignored.\n",
                self.infra_path.display()
            ));
        }

        ctx.set_progress(Progress::new("Retrieving environment definition"));
        let definition = self.definition(&project).await?;
        let parameters = self.resolve_parameters(ctx, &definition).await?;

        let env_name = self.context.env_name().await;
        let exists = self.manager.client().environment(&project, &config.user, &env_name).await.is_ok();
        let verb = if exists { "Updating" } else { "Creating" };
        ctx.set_progress(Progress::new(format!("{} devcenter environment {}", verb, env_name)));

        let spec = EnvironmentSpec {
            environment_type: config.environment_type.clone(),
            catalog_name: config.catalog.clone(),
            environment_definition_name: config.environment_definition.clone(),
            parameters: parameters.clone(),
        };

        let cancel = CancellationToken::new();
        if !progress_disabled() {
            let poller = EnvironmentPoller {
                manager: self.manager.clone(),
                config: config.clone(),
                project: project.clone(),
                env_name: env_name.clone(),
                settings: self.settings.clone(),
            };
            tokio::spawn(poller.run(ctx.clone(), cancel.clone()));
        }

        let put = self
            .manager
            .client()
            .put_environment(&project, &config.user, &env_name, &spec)
            .await;
        cancel.cancel();
        put.context("failed creating environment")?;
        info!(environment = %env_name, "devcenter environment deployed");

        let environment = self.environment(&project, &env_name).await?;
        let outputs = self
            .manager
            .outputs(config, &environment)
            .await
            .context("failed getting environment outputs")?;

        Ok(DeployResult {
            deployment: Deployment { parameters: input_parameters(&definition, &parameters), outputs },
        })
    }

    async fn environment_state(&self, ctx: &TaskContext<Progress>) -> Result<StateResult, ProvisionError> {
        let project = self.project().await?;
        ctx.set_progress(Progress::new("Retrieving devcenter environment"));
        let env_name = self.context.env_name().await;
        let environment = self.environment(&project, &env_name).await?;
        let outputs = self
            .manager
            .outputs(&self.config, &environment)
            .await
            .context("failed getting environment outputs")?;

        let resources = Some(environment.resource_group_id)
            .filter(|id| !id.is_empty())
            .map(Resource::new)
            .into_iter()
            .collect();
        Ok(StateResult { state: State { outputs, resources } })
    }

    async fn destroy_environment(
        &self,
        ctx: &TaskContext<Progress>,
        options: DestroyOptions,
    ) -> Result<DestroyResult, ProvisionError> {
        let config = self.valid_config()?;
        let env_name = self.context.env_name().await;

        if !options.force() {
            let console = self.context.console.as_ref();
            let name = env_name.as_str();
            let confirmed = ctx
                .interact(move || async move {
                    console.message("WARNING: This will delete the following Dev Center environment and all of its resources:\n");
                    console.message(&format!("Dev Center: {}", config.name));
                    console.message(&format!("Project: {}", config.project));
                    console.message(&format!("Environment Type: {}", config.environment_type));
                    console.message(&format!("Environment Definition: {}", config.environment_definition));
                    console.message(&format!("Environment: {}\n", name));
                    console
                        .confirm(ConsoleOptions::new(CONFIRM_DESTROY_PROMPT).with_default(false))
                        .await
                })
                .await
                .context("destroy operation interrupted")?;
            if !confirmed {
                return Err(ProvisionError::Declined("destroy operation cancelled".into()));
            }
        }

        let project = self.project().await?;
        let environment = self
            .manager
            .client()
            .environment(&project, &config.user, &env_name)
            .await
            .context("failed getting devcenter environment")?;
        let outputs = self
            .manager
            .outputs(config, &environment)
            .await
            .context("failed getting environment outputs")?;

        ctx.set_progress(Progress::new(format!("Deleting devcenter environment {}", env_name)));
        self.manager
            .client()
            .delete_environment(&project, &config.user, &env_name)
            .await
            .context("failed deleting environment")?;
        info!(environment = %env_name, "devcenter environment deleted");

        let mut keys: Vec<String> = outputs.into_keys().collect();
        keys.sort();
        Ok(DestroyResult { invalidated_env_keys: keys })
    }
}

#[async_trait]
impl Provider for DevCenterProvider {
    fn name(&self) -> &'static str {
        "Dev Center"
    }

    async fn initialize(&mut self, project_path: &Path, options: Options) -> Result<(), ProvisionError> {
        self.infra_path = project_path.join(&options.with_defaults(&[]).path);
        self.ensure_env().await
    }

    fn plan(&self) -> ProvisionTask<DeploymentPlan> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.plan_deployment(&ctx).await })
    }

    fn requires_location(&self) -> bool {
        false
    }

    fn preview(&self) -> ProvisionTask<DeployPreviewResult> {
        Task::from_result(Err(ProvisionError::NotSupported("preview is not supported for devcenter".into())))
    }

    fn deploy(&self, _plan: DeploymentPlan, _scope: Scope) -> ProvisionTask<DeployResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.deploy_environment(&ctx).await })
    }

    fn state(&self, _scope: Scope) -> ProvisionTask<StateResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.environment_state(&ctx).await })
    }

    fn destroy(&self, _deployment: Deployment, options: DestroyOptions) -> ProvisionTask<DestroyResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.destroy_environment(&ctx, options).await })
    }
}

/// Waits for ADE to create the environment's resource group and start its
/// ARM deployment, then hands over to a [`DeploymentProgress`] reporter.
struct EnvironmentPoller {
    manager: Arc<DevCenterManager>,
    config: Config,
    project: Project,
    env_name: String,
    settings: DevCenterSettings,
}

impl EnvironmentPoller {
    async fn run(self, ctx: TaskContext<Progress>, cancel: CancellationToken) {
        let started = Utc::now();
        let mut delay = self.settings.environment_initial_delay;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.settings.environment_interval;

            let found = tokio::select! {
                _ = cancel.cancelled() => return,
                found = self.running_deployment(started) => found,
            };
            if let Some(scope) = found {
                debug!(deployment = %scope.deployment_name(), "reporting devcenter deployment progress");
                let progress = DeploymentProgress::new(scope, ctx);
                tokio::spawn(progress.run(
                    cancel,
                    self.settings.progress_initial_delay,
                    self.settings.progress_interval,
                ));
                return;
            }
        }
    }

    /// The ARM deployment ADE started after `started`, once the resource
    /// group exists.
    async fn running_deployment(&self, started: chrono::DateTime<Utc>) -> Option<Scope> {
        let environment = self
            .manager
            .client()
            .environment(&self.project, &self.config.user, &self.env_name)
            .await
            .ok()?;
        if environment.provisioning_state == "Creating" || environment.resource_group_id.is_empty() {
            return None;
        }

        let running = |d: &DeploymentExtended| {
            d.properties.provisioning_state == "Running" && d.properties.timestamp.is_some_and(|t| t > started)
        };
        self.manager
            .deployment_scope(&self.config, &environment, Some(&running))
            .await
            .ok()
    }
}

fn input_parameters(definition: &EnvironmentDefinition, values: &HashMap<String, Value>) -> HashMap<String, InputParameter> {
    definition
        .parameters
        .iter()
        .map(|param| {
            let input = InputParameter {
                param_type: serde_json::to_value(param.param_type)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                default_value: param.default.clone(),
                value: values.get(&param.id).cloned(),
            };
            (param.id.clone(), input)
        })
        .collect()
}

/// Whether `path` holds anything at all.
async fn has_infra_templates(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}
