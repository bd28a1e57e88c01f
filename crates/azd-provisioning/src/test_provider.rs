use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use azd_async::{Task, TaskContext};
use azd_azure::Scope;
use azd_domain::{Deployment, DestroyOptions, Options, OutputParameter, ParameterType, Progress, State};
use serde_json::Value;
use tracing::debug;

use crate::arm::ArmTemplate;
use crate::error::ProvisionError;
use crate::parameters::ParameterResolver;
use crate::provider::{
    module_file, normalize_output_key, DeployPreviewResult, DeployResult, DeploymentPlan, DeploymentPreview,
    DestroyResult, PlanDetails, PreviewChange, Provider, ProviderContext, ProvisionTask, StateResult,
};

/// A provider that simulates infrastructure locally.
///
/// - Reads parameter declarations from `<path>/<module>.json` when present.
/// - Resolves them like the ARM provider does, prompts included.
/// - "Deploys" by echoing every resolved parameter back as an output.
/// - Talks to no remote service.
#[derive(Clone)]
pub struct TestProvider {
    context: ProviderContext,
    module: Option<PathBuf>,
    deployed: Arc<Mutex<HashMap<String, OutputParameter>>>,
}

impl TestProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context, module: None, deployed: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn deployed(&self) -> HashMap<String, OutputParameter> {
        match self.deployed.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_deployed(&self, outputs: HashMap<String, OutputParameter>) {
        match self.deployed.lock() {
            Ok(mut guard) => *guard = outputs,
            Err(poisoned) => *poisoned.into_inner() = outputs,
        }
    }

    async fn template(&self) -> Result<ArmTemplate, ProvisionError> {
        let Some(path) = &self.module else {
            return Ok(ArmTemplate::default());
        };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let raw: Value = serde_json::from_str(&contents).map_err(|e| ProvisionError::InvalidTemplate {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                ArmTemplate::parse(path, &raw)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no test template, planning an empty deployment");
                Ok(ArmTemplate::default())
            }
            Err(e) => Err(ProvisionError::io(path, e)),
        }
    }

    async fn plan_deployment(&self, ctx: &TaskContext<Progress>) -> Result<DeploymentPlan, ProvisionError> {
        ctx.set_progress(Progress::new("Loading test template"));
        let template = self.template().await?;

        let resolver = ParameterResolver {
            ctx,
            console: self.context.console.as_ref(),
            env: &self.context.env,
            store: self.context.store.as_ref(),
        };
        let parameters = resolver.ensure_parameters(&template.parameters, &HashMap::new()).await?;
        let outputs = template.declared_outputs()?;
        Ok(DeploymentPlan { deployment: Deployment { parameters, outputs }, details: PlanDetails::None })
    }

    fn outputs_for(deployment: &Deployment) -> Result<HashMap<String, OutputParameter>, ProvisionError> {
        let mut outputs = HashMap::new();
        for (key, param) in &deployment.parameters {
            let value = param.value.clone().or_else(|| param.default_value.clone());
            let Some(value) = value.filter(|v| !v.is_null()) else { continue };
            let param_type: ParameterType = param.param_type.parse()?;
            outputs.insert(normalize_output_key(key), OutputParameter::new(param_type, value));
        }
        Ok(outputs)
    }
}

#[async_trait]
impl Provider for TestProvider {
    fn name(&self) -> &'static str {
        "Test"
    }

    async fn initialize(&mut self, project_path: &Path, options: Options) -> Result<(), ProvisionError> {
        self.module = Some(module_file(project_path, &options, ".json"));
        Ok(())
    }

    fn plan(&self) -> ProvisionTask<DeploymentPlan> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.plan_deployment(&ctx).await })
    }

    fn preview(&self) -> ProvisionTask<DeployPreviewResult> {
        let this = self.clone();
        Task::run(move |ctx| async move {
            let plan = this.plan_deployment(&ctx).await?;
            let deployed = this.deployed();
            let changes = TestProvider::outputs_for(&plan.deployment)?
                .into_keys()
                .map(|name| PreviewChange {
                    change_type: if deployed.contains_key(&name) { "Modify" } else { "Create" }.to_string(),
                    resource_type: "Test/outputs".to_string(),
                    name,
                })
                .collect();
            Ok(DeployPreviewResult { preview: DeploymentPreview { status: "Completed".into(), changes } })
        })
    }

    fn deploy(&self, plan: DeploymentPlan, _scope: Scope) -> ProvisionTask<DeployResult> {
        let this = self.clone();
        Task::run(move |ctx| async move {
            ctx.set_progress(Progress::new("Deploying test resources"));
            let mut deployment = plan.deployment;
            deployment.outputs = TestProvider::outputs_for(&deployment)?;
            this.set_deployed(deployment.outputs.clone());
            Ok(DeployResult { deployment })
        })
    }

    fn state(&self, _scope: Scope) -> ProvisionTask<StateResult> {
        let this = self.clone();
        Task::run(move |_ctx| async move {
            Ok(StateResult { state: State { outputs: this.deployed(), resources: Vec::new() } })
        })
    }

    fn destroy(&self, deployment: Deployment, _options: DestroyOptions) -> ProvisionTask<DestroyResult> {
        let this = self.clone();
        Task::run(move |ctx| async move {
            ctx.set_progress(Progress::new("Destroying test resources"));
            let mut keys: Vec<String> = this.deployed().into_keys().collect();
            keys.extend(deployment.outputs.into_keys());
            keys.sort();
            keys.dedup();
            this.set_deployed(HashMap::new());
            Ok(DestroyResult { invalidated_env_keys: keys })
        })
    }
}
