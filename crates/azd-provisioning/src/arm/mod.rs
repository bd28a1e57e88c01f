//! ARM JSON and Bicep provisioning.

mod progress;
mod purge;
mod template;

#[cfg(test)]
pub(crate) mod fakes;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use azd_async::{Task, TaskContext};
use azd_azure::{
    resource_types, AzureError, DeploymentExtended, DeploymentOutput, DeploymentService, ResourceService, Scope,
};
use azd_domain::keys::ENV_NAME_TAG;
use azd_domain::{Deployment, DestroyOptions, Options, OutputParameter, ParameterType, Progress, ProviderKind, Resource, State};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ProvisionError, ResultExt};
use crate::parameters::ParameterResolver;
use crate::prompt::ensure_subscription_and_location;
use crate::provider::{
    module_file, normalize_output_key, DeployPreviewResult, DeployResult, DeploymentPlan, DeploymentPreview,
    DestroyResult, PlanDetails, PreviewChange, Provider, ProviderContext, ProvisionTask, StateResult,
};

pub use progress::{progress_disabled, DeploymentProgress};
pub use template::ArmTemplate;

use purge::ResourceGroupDestroyer;
use template::{arm_parameters, compile_bicep, read_arm_template, read_parameters_file};

/// Attempts after the first when a just-finished deployment is not yet readable.
const DEPLOYMENT_FETCH_RETRIES: u32 = 10;

/// Tunables, overridable for tests.
#[derive(Debug, Clone)]
pub struct ArmSettings {
    pub bicep_path: PathBuf,
    pub retry_base_delay: Duration,
    pub progress_initial_delay: Duration,
    pub progress_interval: Duration,
}

impl Default for ArmSettings {
    fn default() -> Self {
        Self {
            bicep_path: PathBuf::from("bicep"),
            retry_base_delay: Duration::from_secs(1),
            progress_initial_delay: Duration::from_secs(3),
            progress_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct ModuleFiles {
    template: PathBuf,
    parameters: PathBuf,
}

/// Deploys an ARM template (or a Bicep module compiled to one) at
/// subscription scope.
#[derive(Clone)]
pub struct ArmProvider {
    kind: ProviderKind,
    context: ProviderContext,
    deployments: Arc<dyn DeploymentService>,
    resources: Arc<dyn ResourceService>,
    settings: ArmSettings,
    module: Option<ModuleFiles>,
}

impl ArmProvider {
    pub fn new(
        kind: ProviderKind,
        context: ProviderContext,
        deployments: Arc<dyn DeploymentService>,
        resources: Arc<dyn ResourceService>,
    ) -> Self {
        Self { kind, context, deployments, resources, settings: ArmSettings::default(), module: None }
    }

    pub fn with_settings(mut self, settings: ArmSettings) -> Self {
        self.settings = settings;
        self
    }

    fn module(&self) -> Result<&ModuleFiles, ProvisionError> {
        self.module
            .as_ref()
            .ok_or_else(|| ProvisionError::NotSupported(format!("{} provider is not initialized", self.name())))
    }

    async fn load_template(&self) -> Result<(Value, ArmTemplate), ProvisionError> {
        let module = self.module()?;
        let raw = match self.kind {
            ProviderKind::Bicep => compile_bicep(&self.settings.bicep_path, &module.template).await?,
            _ => read_arm_template(&module.template).await?,
        };
        let template = ArmTemplate::parse(&module.template, &raw)?;
        Ok((raw, template))
    }

    async fn plan_deployment(&self, ctx: &TaskContext<Progress>) -> Result<DeploymentPlan, ProvisionError> {
        let compiling = match self.kind {
            ProviderKind::Bicep => "Compiling Bicep template",
            _ => "Loading Arm template",
        };
        ctx.set_progress(Progress::new(compiling));
        let (raw, template) = self.load_template().await.context("creating template")?;

        ctx.set_progress(Progress::new("Resolving template parameters"));
        let file_values = {
            let env = self.context.env.read().await;
            read_parameters_file(&self.module()?.parameters, &env).await?
        };
        let resolver = ParameterResolver {
            ctx,
            console: self.context.console.as_ref(),
            env: &self.context.env,
            store: self.context.store.as_ref(),
        };
        let parameters = resolver.ensure_parameters(&template.parameters, &file_values).await?;

        let details = PlanDetails::Arm { template: raw, parameters: arm_parameters(&parameters) };
        let deployment = Deployment { parameters, outputs: template.declared_outputs()? };
        Ok(DeploymentPlan { deployment, details })
    }

    async fn deploy_plan(
        &self,
        ctx: &TaskContext<Progress>,
        plan: DeploymentPlan,
        scope: Scope,
    ) -> Result<DeployResult, ProvisionError> {
        let PlanDetails::Arm { template, parameters } = &plan.details else {
            return Err(ProvisionError::InvalidParameter(format!(
                "deployment plan was not produced by the {} provider",
                self.name()
            )));
        };

        let env_name = self.context.env_name().await;
        let tags = HashMap::from([(ENV_NAME_TAG.to_string(), env_name)]);

        ctx.set_progress(Progress::new("Creating/Updating resources"));
        let cancel = CancellationToken::new();
        let reporter = (!progress_disabled()).then(|| {
            let progress = DeploymentProgress::new(scope.clone(), ctx.clone());
            tokio::spawn(progress.run(
                cancel.clone(),
                self.settings.progress_initial_delay,
                self.settings.progress_interval,
            ))
        });

        let deployed = scope.deploy(template, parameters, &tags).await;
        cancel.cancel();
        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }
        deployed.context("deploying to subscription")?;
        info!(deployment = %scope.deployment_name(), "deployment finished");

        let record = wait_for_deployment(&scope, self.settings.retry_base_delay).await?;
        let mut deployment = plan.deployment;
        deployment.outputs = output_parameters(&record.outputs())?;
        Ok(DeployResult { deployment })
    }

    async fn read_state(&self, ctx: &TaskContext<Progress>, scope: Scope) -> Result<StateResult, ProvisionError> {
        ctx.set_progress(Progress::new("Loading Arm template"));
        self.load_template().await.context("compiling arm template")?;

        ctx.set_progress(Progress::new("Retrieving Azure deployment"));
        let record = scope.deployment().await.context("retrieving deployment")?;

        let resources = record
            .properties
            .output_resources
            .iter()
            .flatten()
            .map(|r| Resource::new(r.id.clone()))
            .collect();

        ctx.set_progress(Progress::new("Normalizing output parameters"));
        let outputs = output_parameters(&record.outputs())?;
        Ok(StateResult { state: State { outputs, resources } })
    }

    async fn subscription_scope(&self) -> Scope {
        let env = self.context.env.read().await;
        Scope::subscription(self.deployments.clone(), env.subscription_id(), env.location(), env.name())
    }

    async fn preview_plan(&self, ctx: &TaskContext<Progress>) -> Result<DeployPreviewResult, ProvisionError> {
        let plan = self.plan_deployment(ctx).await?;
        let PlanDetails::Arm { template, parameters } = &plan.details else {
            return Err(ProvisionError::InvalidParameter("preview requires an ARM plan".into()));
        };

        ctx.set_progress(Progress::new("Generating infrastructure preview"));
        let scope = self.subscription_scope().await;
        let changes = scope.what_if(template, parameters).await.context("running what-if")?;

        let changes = changes
            .into_iter()
            .map(|change| {
                let (resource_type, name) = split_resource_id(&change.resource_id);
                PreviewChange { change_type: change.change_type, resource_type, name }
            })
            .collect();
        Ok(DeployPreviewResult { preview: DeploymentPreview { status: "Completed".into(), changes } })
    }

    async fn destroy_deployment(
        &self,
        ctx: &TaskContext<Progress>,
        deployment: Deployment,
        options: DestroyOptions,
    ) -> Result<DestroyResult, ProvisionError> {
        let scope = self.subscription_scope().await;
        let destroyer = ResourceGroupDestroyer {
            ctx,
            console: self.context.console.as_ref(),
            resources: self.resources.clone(),
            subscription_id: scope.subscription_id().to_string(),
            env_name: scope.deployment_name().to_string(),
            options,
        };
        let deleted = destroyer.run().await?;
        debug!(resources = deleted.len(), "resource groups destroyed");

        ctx.set_progress(Progress::new("Deleting deployment"));
        scope
            .delete_deployment()
            .await
            .context("deleting subscription deployment")?;
        self.context
            .console
            .message(&format!("Deleted deployment {}", scope.deployment_name()));

        let mut invalidated_env_keys: Vec<String> = deployment.outputs.into_keys().collect();
        invalidated_env_keys.sort();
        Ok(DestroyResult { invalidated_env_keys })
    }
}

#[async_trait]
impl Provider for ArmProvider {
    fn name(&self) -> &'static str {
        match self.kind {
            ProviderKind::Bicep => "Bicep",
            _ => "Arm",
        }
    }

    async fn initialize(&mut self, project_path: &Path, options: Options) -> Result<(), ProvisionError> {
        let extension = match self.kind {
            ProviderKind::Bicep => ".bicep",
            _ => ".json",
        };
        self.module = Some(ModuleFiles {
            template: module_file(project_path, &options, extension),
            parameters: module_file(project_path, &options, ".parameters.json"),
        });
        ensure_subscription_and_location(
            &self.context.env,
            self.context.store.as_ref(),
            self.context.prompter.as_ref(),
        )
        .await
    }

    fn plan(&self) -> ProvisionTask<DeploymentPlan> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.plan_deployment(&ctx).await })
    }

    fn preview(&self) -> ProvisionTask<DeployPreviewResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.preview_plan(&ctx).await })
    }

    fn deploy(&self, plan: DeploymentPlan, scope: Scope) -> ProvisionTask<DeployResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.deploy_plan(&ctx, plan, scope).await })
    }

    fn state(&self, scope: Scope) -> ProvisionTask<StateResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.read_state(&ctx, scope).await })
    }

    fn destroy(&self, deployment: Deployment, options: DestroyOptions) -> ProvisionTask<DestroyResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.destroy_deployment(&ctx, deployment, options).await })
    }
}

/// Fetch the deployment that was just created, backing off while ARM still
/// reports it as missing.
async fn wait_for_deployment(scope: &Scope, base_delay: Duration) -> Result<DeploymentExtended, ProvisionError> {
    let mut delay = base_delay;
    for attempt in 0..=DEPLOYMENT_FETCH_RETRIES {
        match scope.deployment().await {
            Ok(record) => return Ok(record),
            Err(AzureError::DeploymentNotFound(_)) if attempt < DEPLOYMENT_FETCH_RETRIES => {
                debug!(attempt, ?delay, "deployment not readable yet");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e @ AzureError::DeploymentNotFound(_)) => {
                return Err(ProvisionError::from(e).context("timed out waiting for deployment"))
            }
            Err(e) => return Err(ProvisionError::from(e).context("failed waiting for deployment")),
        }
    }
    Err(ProvisionError::from(AzureError::DeploymentNotFound(scope.deployment_name().to_string()))
        .context("timed out waiting for deployment"))
}

/// Outputs of a deployment record, keys upper-cased.
fn output_parameters(
    outputs: &HashMap<String, DeploymentOutput>,
) -> Result<HashMap<String, OutputParameter>, ProvisionError> {
    outputs
        .iter()
        .map(|(key, output)| {
            let param_type = ParameterType::from_arm_type(&output.output_type)?;
            Ok((normalize_output_key(key), OutputParameter::new(param_type, output.value.clone())))
        })
        .collect()
}

/// Split an ARM resource id into its resource type and name.
fn split_resource_id(id: &str) -> (String, String) {
    let segments: Vec<&str> = id.trim_matches('/').split('/').collect();
    let name = segments.last().copied().unwrap_or_default().to_string();

    if let Some(pos) = segments.iter().rposition(|s| s.eq_ignore_ascii_case("providers")) {
        let rest = &segments[pos + 1..];
        if rest.len() >= 3 {
            let types: Vec<&str> = rest[1..].iter().step_by(2).copied().collect();
            return (format!("{}/{}", rest[0], types.join("/")), name);
        }
    }
    if segments.len() == 4 && segments[2].eq_ignore_ascii_case("resourceGroups") {
        return (resource_types::RESOURCE_GROUP.to_string(), name);
    }
    (String::new(), name)
}
