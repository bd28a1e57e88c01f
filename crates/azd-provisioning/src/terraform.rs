use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use azd_async::{Task, TaskContext, TaskError};
use azd_azure::Scope;
use azd_domain::{
    Deployment, DestroyOptions, DomainError, InputParameter, Options, OutputParameter, ParameterType, Progress,
    Resource, State,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::envsubst;
use crate::error::{ProvisionError, ResultExt};
use crate::prompt::ensure_subscription_and_location;
use crate::provider::{
    normalize_output_key, DeployResult, DeploymentPlan, DestroyResult, PlanDetails, Provider, ProviderContext,
    ProvisionTask, StateResult,
};

const AZURERM_PROVIDER: &str = "registry.terraform.io/hashicorp/azurerm";
const REMOTE_BACKEND_MARKER: &str = r#"backend "azurerm""#;
const BACKEND_TEMPLATE: &str = "provider.conf.json";
const STATE_FILE: &str = "terraform.tfstate";

#[derive(Debug, Clone)]
pub struct TerraformSettings {
    /// The `terraform` (or `tofu`) executable.
    pub binary: PathBuf,
    /// Captured commands are killed after this long.
    pub command_timeout: Duration,
}

impl Default for TerraformSettings {
    fn default() -> Self {
        Self { binary: PathBuf::from("terraform"), command_timeout: Duration::from_secs(30 * 60) }
    }
}

/// Every file the provider reads or writes, fixed at `initialize`.
#[derive(Debug, Clone)]
struct TerraformPaths {
    /// `<project>/<path>`, the working directory of every command.
    module_dir: PathBuf,
    parameters_template: PathBuf,
    backend_template: PathBuf,
    /// `<project>/.azure/<env>/<path>`.
    staging_dir: PathBuf,
    parameters_file: PathBuf,
    backend_config: PathBuf,
    plan_file: PathBuf,
    state_file: PathBuf,
    data_dir: PathBuf,
}

impl TerraformPaths {
    fn new(project_path: &Path, options: &Options, env_name: &str) -> Self {
        let module_dir = project_path.join(&options.path);
        let staging_dir = project_path.join(".azure").join(env_name).join(&options.path);
        Self {
            parameters_template: module_dir.join(format!("{}.tfvars.json", options.module)),
            backend_template: module_dir.join(BACKEND_TEMPLATE),
            parameters_file: staging_dir.join(format!("{}.tfvars.json", options.module)),
            backend_config: staging_dir.join(format!("{}.conf.json", env_name)),
            plan_file: staging_dir.join(format!("{}.tfplan", options.module)),
            state_file: staging_dir.join(STATE_FILE),
            data_dir: staging_dir.join(".terraform"),
            module_dir,
            staging_dir,
        }
    }
}

/// Provisions infrastructure by driving the `terraform` CLI.
///
/// State stays local under `.azure/<env>/` unless one of the module's `.tf`
/// files declares an `azurerm` backend, in which case the backend settings
/// come from `provider.conf.json` with `${VAR}` references expanded.
#[derive(Clone)]
pub struct TerraformProvider {
    context: ProviderContext,
    settings: TerraformSettings,
    paths: Option<Arc<TerraformPaths>>,
}

impl TerraformProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context, settings: TerraformSettings::default(), paths: None }
    }

    pub fn with_settings(mut self, settings: TerraformSettings) -> Self {
        self.settings = settings;
        self
    }

    fn paths(&self) -> Result<Arc<TerraformPaths>, ProvisionError> {
        self.paths
            .clone()
            .ok_or_else(|| ProvisionError::InvalidParameter("terraform provider is not initialized".into()))
    }

    async fn plan_deployment(&self, ctx: &TaskContext<Progress>) -> Result<DeploymentPlan, ProvisionError> {
        let paths = self.paths()?;
        let remote = is_remote_backend(&paths.module_dir).await.context("reading backend config")?;

        ctx.set_progress(Progress::new("Initializing terraform"));
        self.init(&paths, remote).await.context("terraform init failed")?;

        ctx.set_progress(Progress::new("Generating terraform parameters"));
        self.write_parameters_file(&paths).await.context("creating parameters file")?;

        ctx.set_progress(Progress::new("Validating terraform template"));
        self.run(&paths, &["validate".into(), "-no-color".into()])
            .await
            .context("terraform validate failed")?;

        ctx.set_progress(Progress::new("Planning terraform deployment"));
        let mut args = vec![
            "plan".to_string(),
            "-no-color".into(),
            "-input=false".into(),
            arg("-out", &paths.plan_file),
            arg("-var-file", &paths.parameters_file),
        ];
        if !remote {
            args.push(arg("-state", &paths.state_file));
        }
        self.run(&paths, &args).await.context("terraform plan failed")?;

        let parameters = self.deployment_parameters(&paths).await.context("create terraform template failed")?;
        Ok(DeploymentPlan {
            deployment: Deployment { parameters, outputs: HashMap::new() },
            details: PlanDetails::Terraform {
                plan_file: paths.plan_file.clone(),
                var_file: paths.parameters_file.clone(),
                state_file: (!remote).then(|| paths.state_file.clone()),
            },
        })
    }

    async fn apply(&self, ctx: &TaskContext<Progress>, plan: DeploymentPlan) -> Result<DeployResult, ProvisionError> {
        let paths = self.paths()?;
        let PlanDetails::Terraform { plan_file, var_file, state_file } = &plan.details else {
            return Err(ProvisionError::InvalidParameter("deploy requires a terraform plan".into()));
        };

        ctx.set_progress(Progress::new("Applying terraform plan"));
        let mut args = vec!["apply".to_string(), "-no-color".into(), "-input=false".into()];
        if let Some(state) = state_file {
            args.push(arg("-state", state));
        }
        if tokio::fs::try_exists(plan_file).await.unwrap_or(false) {
            args.push(plan_file.display().to_string());
        } else {
            debug!(plan = %plan_file.display(), "no saved plan, applying from parameters");
            if !tokio::fs::try_exists(var_file).await.unwrap_or(false) {
                return Err(ProvisionError::InvalidParameter(format!(
                    "parameters file not found: {}",
                    var_file.display()
                )));
            }
            args.push("-auto-approve".into());
            args.push(arg("-var-file", var_file));
        }
        self.run(&paths, &args).await.context("template deploy failed")?;

        ctx.set_progress(Progress::new("Reading terraform outputs"));
        let outputs = self
            .outputs(&paths, state_file.is_none())
            .await
            .context("create terraform template failed")?;

        let mut deployment = plan.deployment;
        deployment.outputs = outputs;
        Ok(DeployResult { deployment })
    }

    async fn current_state(&self, ctx: &TaskContext<Progress>) -> Result<StateResult, ProvisionError> {
        let paths = self.paths()?;
        let remote = is_remote_backend(&paths.module_dir).await.context("reading backend config")?;

        ctx.set_progress(Progress::new("Retrieving terraform state"));
        let mut args = vec!["show".to_string(), "-json".into(), "-no-color".into()];
        if !remote {
            args.push(paths.state_file.display().to_string());
        }
        let shown = self.run(&paths, &args).await.context("fetching terraform state failed")?;
        let shown: ShowOutput = serde_json::from_str(shown.trim()).context("fetching terraform state failed")?;

        let values = shown.values.unwrap_or_default();
        Ok(StateResult {
            state: State { outputs: convert_outputs(values.outputs)?, resources: azure_resources(&values.root_module) },
        })
    }

    async fn teardown(&self, ctx: &TaskContext<Progress>, options: DestroyOptions) -> Result<DestroyResult, ProvisionError> {
        let paths = self.paths()?;
        let remote = is_remote_backend(&paths.module_dir).await.context("reading backend config")?;

        if !tokio::fs::try_exists(&paths.parameters_file).await.unwrap_or(false) {
            self.write_parameters_file(&paths).await.context("creating parameters file")?;
        }

        ctx.set_progress(Progress::new("Reading terraform outputs"));
        let outputs = self
            .outputs(&paths, remote)
            .await
            .context("load terraform template output failed")?;

        ctx.set_progress(Progress::new("Destroying terraform deployment"));
        let mut args = vec!["destroy".to_string(), "-no-color".into(), arg("-var-file", &paths.parameters_file)];
        if !remote {
            args.push(arg("-state", &paths.state_file));
        }
        if options.force() {
            args.push("-auto-approve".into());
        }
        ctx.interact(|| async { self.run_interactive(&paths, &args).await.context("terraform destroy failed") })
            .await?;

        let mut invalidated_env_keys: Vec<String> = outputs.into_keys().collect();
        invalidated_env_keys.sort();
        Ok(DestroyResult { invalidated_env_keys })
    }

    async fn init(&self, paths: &TerraformPaths, remote: bool) -> Result<(), ProvisionError> {
        let mut args = vec!["init".to_string(), "-no-color".into(), "-input=false".into()];
        if remote {
            debug!(template = %paths.backend_template.display(), "generating terraform backend config");
            self.expand_template(&paths.backend_template, &paths.backend_config)
                .await
                .context("creating terraform backend config file")?;
            args.push(arg("-backend-config", &paths.backend_config));
        }
        self.run(paths, &args).await?;
        Ok(())
    }

    async fn write_parameters_file(&self, paths: &TerraformPaths) -> Result<(), ProvisionError> {
        self.expand_template(&paths.parameters_template, &paths.parameters_file).await
    }

    /// Copy `template` to `target` with `${VAR}` references expanded from
    /// the environment.
    async fn expand_template(&self, template: &Path, target: &Path) -> Result<(), ProvisionError> {
        let raw = tokio::fs::read_to_string(template)
            .await
            .map_err(|e| ProvisionError::io(template, e))?;
        let expanded = {
            let env = self.context.env.read().await;
            envsubst::substitute(&raw, |name| env.lookup_env(name))
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProvisionError::io(parent, e))?;
        }
        tokio::fs::write(target, expanded)
            .await
            .map_err(|e| ProvisionError::io(target, e))
    }

    /// The generated tfvars entries become the deployment's parameters.
    async fn deployment_parameters(
        &self,
        paths: &TerraformPaths,
    ) -> Result<HashMap<String, InputParameter>, ProvisionError> {
        let raw = tokio::fs::read_to_string(&paths.parameters_file)
            .await
            .map_err(|e| ProvisionError::io(&paths.parameters_file, e))?;
        let values: serde_json::Map<String, Value> =
            serde_json::from_str(&raw).map_err(|e| ProvisionError::InvalidTemplate {
                path: paths.parameters_file.clone(),
                message: e.to_string(),
            })?;

        Ok(values
            .into_iter()
            .map(|(key, value)| {
                let param = InputParameter {
                    param_type: value_type(&value).as_str().to_string(),
                    default_value: None,
                    value: Some(value),
                };
                (key, param)
            })
            .collect())
    }

    async fn outputs(
        &self,
        paths: &TerraformPaths,
        remote: bool,
    ) -> Result<HashMap<String, OutputParameter>, ProvisionError> {
        let mut args = vec!["output".to_string(), "-json".into(), "-no-color".into()];
        if !remote {
            args.push(arg("-state", &paths.state_file));
        }
        let raw = self.run(paths, &args).await.context("reading deployment output failed")?;
        let outputs: HashMap<String, TerraformOutput> = serde_json::from_str(raw.trim())?;
        convert_outputs(outputs)
    }

    async fn command(&self, paths: &TerraformPaths) -> Command {
        let mut cmd = Command::new(&self.settings.binary);
        cmd.current_dir(&paths.module_dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_DATA_DIR", &paths.data_dir);

        let env = self.context.env.read().await;
        cmd.env("ARM_SUBSCRIPTION_ID", env.subscription_id());
        let tenant_id = env.tenant_id();
        if !tenant_id.is_empty() {
            cmd.env("ARM_TENANT_ID", tenant_id);
        }
        cmd
    }

    fn tool_error(&self, args: &[String], message: impl Into<String>) -> ProvisionError {
        ProvisionError::Tool {
            tool: self.settings.binary.display().to_string(),
            command: args.first().cloned().unwrap_or_default(),
            message: message.into(),
        }
    }

    /// Run a sub-command with stdout captured and returned. Stderr is
    /// mirrored to the log and becomes the error message on failure.
    async fn run(&self, paths: &TerraformPaths, args: &[String]) -> Result<String, ProvisionError> {
        info!(binary = %self.settings.binary.display(), ?args, dir = %paths.module_dir.display(), "running terraform");
        tokio::fs::create_dir_all(&paths.staging_dir)
            .await
            .map_err(|e| ProvisionError::io(&paths.staging_dir, e))?;

        let mut cmd = self.command(paths).await;
        cmd.args(args)
            .env("TF_INPUT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| self.tool_error(args, format!("spawn {}: {}", self.settings.binary.display(), e)))?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(self.tool_error(args, "output streams were not captured"));
        };

        let stdout_task = drain(stdout, "stdout");
        let stderr_task = drain(stderr, "stderr");
        let collected = tokio::time::timeout(self.settings.command_timeout, async {
            (stdout_task.await, stderr_task.await)
        })
        .await;

        let (stdout, stderr) = match collected {
            Ok((Ok(stdout), Ok(stderr))) => (stdout, stderr),
            Ok((Err(e), _)) | Ok((_, Err(e))) => return Err(TaskError::Panicked(e.to_string()).into()),
            Err(_) => {
                let _ = child.kill().await;
                return Err(self.tool_error(
                    args,
                    format!("timed out after {} minutes", self.settings.command_timeout.as_secs() / 60),
                ));
            }
        };

        let status = child.wait().await.map_err(|e| self.tool_error(args, format!("wait: {}", e)))?;
        if !status.success() {
            let code = status.code().unwrap_or(-1);
            warn!(binary = %self.settings.binary.display(), code, "terraform exited non-zero");
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(self.tool_error(args, format!("exit code {}: {}", code, detail)));
        }
        Ok(stdout)
    }

    /// Run a sub-command attached to the user's terminal so terraform can
    /// ask its own questions.
    async fn run_interactive(&self, paths: &TerraformPaths, args: &[String]) -> Result<(), ProvisionError> {
        info!(binary = %self.settings.binary.display(), ?args, "running terraform interactively");
        let mut cmd = self.command(paths).await;
        cmd.args(args).stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());

        let status = cmd
            .status()
            .await
            .map_err(|e| self.tool_error(args, format!("spawn {}: {}", self.settings.binary.display(), e)))?;
        if !status.success() {
            return Err(self.tool_error(args, format!("exit code {}", status.code().unwrap_or(-1))));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for TerraformProvider {
    fn name(&self) -> &'static str {
        "Terraform"
    }

    async fn initialize(&mut self, project_path: &Path, options: Options) -> Result<(), ProvisionError> {
        let project_path = tokio::fs::canonicalize(project_path)
            .await
            .map_err(|e| ProvisionError::io(project_path, e))?;
        let env_name = self.context.env_name().await;
        self.paths = Some(Arc::new(TerraformPaths::new(&project_path, &options, &env_name)));

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

    fn deploy(&self, plan: DeploymentPlan, _scope: Scope) -> ProvisionTask<DeployResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.apply(&ctx, plan).await })
    }

    fn state(&self, _scope: Scope) -> ProvisionTask<StateResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.current_state(&ctx).await })
    }

    fn destroy(&self, _deployment: Deployment, options: DestroyOptions) -> ProvisionTask<DestroyResult> {
        let this = self.clone();
        Task::run(move |ctx| async move { this.teardown(&ctx, options).await })
    }
}

fn arg(flag: &str, path: &Path) -> String {
    format!("{}={}", flag, path.display())
}

fn drain<R>(reader: R, stream: &'static str) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut collected = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "azd::terraform", stream, "{}", line);
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

/// True when any `.tf` file in `module_dir` configures an `azurerm` backend.
async fn is_remote_backend(module_dir: &Path) -> Result<bool, ProvisionError> {
    let mut entries = tokio::fs::read_dir(module_dir)
        .await
        .map_err(|e| ProvisionError::io(module_dir, e))?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| ProvisionError::io(module_dir, e))? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("tf") || !path.is_file() {
            continue;
        }
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ProvisionError::io(&path, e))?;
        if contents.contains(REMOTE_BACKEND_MARKER) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn value_type(value: &Value) -> ParameterType {
    match value {
        Value::Bool(_) => ParameterType::Boolean,
        Value::Number(_) => ParameterType::Number,
        Value::Array(_) => ParameterType::Array,
        Value::Object(_) => ParameterType::Object,
        Value::String(_) | Value::Null => ParameterType::String,
    }
}

#[derive(Debug, Deserialize)]
struct TerraformOutput {
    /// A primitive name, or `["<kind>", <schema>...]` for complex types.
    #[serde(rename = "type")]
    output_type: Value,
    #[serde(default)]
    value: Value,
}

fn output_type(output_type: &Value) -> Result<ParameterType, ProvisionError> {
    let unsupported = || DomainError::UnsupportedParameterType(output_type.to_string());
    let parsed = match output_type {
        Value::String(primitive) => match primitive.as_str() {
            "string" => ParameterType::String,
            "bool" => ParameterType::Boolean,
            "number" => ParameterType::Number,
            _ => return Err(unsupported().into()),
        },
        Value::Array(parts) => match parts.first().and_then(Value::as_str) {
            Some("list" | "tuple" | "set") => ParameterType::Array,
            Some("object" | "map") => ParameterType::Object,
            _ => return Err(unsupported().into()),
        },
        _ => ParameterType::String,
    };
    Ok(parsed)
}

fn convert_outputs(
    outputs: HashMap<String, TerraformOutput>,
) -> Result<HashMap<String, OutputParameter>, ProvisionError> {
    let mut converted = HashMap::new();
    for (key, output) in outputs {
        if output.value.is_null() || output.value.as_str() == Some("null") {
            continue;
        }
        let param_type = output_type(&output.output_type)?;
        converted.insert(normalize_output_key(&key), OutputParameter::new(param_type, output.value));
    }
    Ok(converted)
}

#[derive(Debug, Default, Deserialize)]
struct ShowOutput {
    #[serde(default)]
    values: Option<ShowValues>,
}

#[derive(Debug, Default, Deserialize)]
struct ShowValues {
    #[serde(default)]
    outputs: HashMap<String, TerraformOutput>,
    #[serde(default)]
    root_module: ModuleState,
}

#[derive(Debug, Default, Deserialize)]
struct ModuleState {
    #[serde(default)]
    resources: Vec<TerraformResource>,
    #[serde(default)]
    child_modules: Vec<ModuleState>,
}

#[derive(Debug, Deserialize)]
struct TerraformResource {
    address: String,
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    provider_name: String,
    #[serde(default)]
    values: serde_json::Map<String, Value>,
}

impl TerraformResource {
    fn azure_id(&self) -> Option<&str> {
        let key = match self.resource_type.as_str() {
            "azurerm_key_vault_secret" => "resource_id",
            _ => "id",
        };
        match self.values.get(key).and_then(Value::as_str) {
            Some(id) => Some(id),
            None => {
                debug!(address = %self.address, key, "resource has no string id, ignoring");
                None
            }
        }
    }
}

/// Managed `azurerm` resources across the whole module tree, one per id.
fn azure_resources(root: &ModuleState) -> Vec<Resource> {
    fn visit<'a>(module: &'a ModuleState, ids: &mut BTreeSet<&'a str>) {
        for resource in &module.resources {
            if resource.mode == "managed" && resource.provider_name == AZURERM_PROVIDER {
                if let Some(id) = resource.azure_id() {
                    ids.insert(id);
                }
            }
        }
        for child in &module.child_modules {
            visit(child, ids);
        }
    }

    let mut ids = BTreeSet::new();
    visit(root, &mut ids);
    ids.into_iter().map(Resource::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::fakes::{FakeDeployments, NoPrompter};
    use crate::console::ScriptedConsole;
    use azd_store::{Environment, InMemoryEnvironmentStore};
    use serde_json::json;

    const OUTPUTS: &str = r#"{
      "website_url": { "sensitive": false, "type": "string", "value": "https://web.example" },
      "ports": { "sensitive": false, "type": ["list", "number"], "value": [80, 443] },
      "unset": { "sensitive": false, "type": "string", "value": null }
    }"#;

    const SHOW: &str = r#"{
      "format_version": "1.0",
      "values": {
        "outputs": { "website_url": { "sensitive": false, "type": "string", "value": "https://web.example" } },
        "root_module": {
          "resources": [
            { "address": "azurerm_resource_group.rg", "mode": "managed", "type": "azurerm_resource_group",
              "provider_name": "registry.terraform.io/hashicorp/azurerm",
              "values": { "id": "/subscriptions/sub/resourceGroups/rg-dev" } },
            { "address": "data.azurerm_client_config.current", "mode": "data", "type": "azurerm_client_config",
              "provider_name": "registry.terraform.io/hashicorp/azurerm", "values": { "id": "ignored" } }
          ],
          "child_modules": [
            { "resources": [
                { "address": "module.kv.azurerm_key_vault_secret.s", "mode": "managed",
                  "type": "azurerm_key_vault_secret", "provider_name": "registry.terraform.io/hashicorp/azurerm",
                  "values": { "id": "https://kv.vault.azure.net/secrets/s", "resource_id": "/subscriptions/sub/kv/secrets/s" } },
                { "address": "module.kv.random_string.suffix", "mode": "managed", "type": "random_string",
                  "provider_name": "registry.terraform.io/hashicorp/random", "values": { "id": "abc" } }
            ] }
          ]
        }
      }
    }"#;

    #[cfg(unix)]
    fn fake_terraform(dir: &Path) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let script = dir.join("terraform");
        let body = format!(
            r#"#!/bin/sh
echo "$ARM_SUBSCRIPTION_ID $*" >> "{log}"
case "$1" in
  init) echo "Terraform has been successfully initialized!" ;;
  validate) echo "Success! The configuration is valid." ;;
  plan)
    for a in "$@"; do
      case "$a" in -out=*) : > "${{a#-out=}}" ;; esac
    done
    echo "Plan: 1 to add" ;;
  apply|destroy) echo "Apply complete!" ;;
  output) cat <<'JSON'
{OUTPUTS}
JSON
  ;;
  show) cat <<'JSON'
{SHOW}
JSON
  ;;
  *) echo "unexpected command $1" >&2; exit 1 ;;
esac
"#,
            log = log.display(),
            OUTPUTS = OUTPUTS,
            SHOW = SHOW,
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    async fn provider(project: &Path, binary: PathBuf) -> TerraformProvider {
        let mut env = Environment::new("dev");
        env.set_subscription_id("sub-123");
        env.set_location("westus2");
        let context = ProviderContext::new(
            env.into_shared(),
            Arc::new(InMemoryEnvironmentStore::new()),
            Arc::new(ScriptedConsole::new()),
            Arc::new(NoPrompter),
        );
        let mut provider = TerraformProvider::new(context)
            .with_settings(TerraformSettings { binary, command_timeout: Duration::from_secs(30) });
        provider.initialize(project, Options::default().with_defaults(&[])).await.unwrap();
        provider
    }

    fn scope() -> Scope {
        Scope::subscription(Arc::new(FakeDeployments::default()), "sub-123", "westus2", "dev")
    }

    // The only test that executes a script, so no other test forks while the
    // script file is being written.
    #[cfg(unix)]
    #[tokio::test]
    async fn drives_the_terraform_cli_through_a_full_lifecycle() {
        let tools = tempfile::tempdir().unwrap();
        let (binary, log) = fake_terraform(tools.path());

        let project = tempfile::tempdir().unwrap();
        let infra = project.path().join("infra");
        tokio::fs::create_dir_all(&infra).await.unwrap();
        tokio::fs::write(infra.join("main.tf"), "resource \"azurerm_resource_group\" \"rg\" {}\n").await.unwrap();
        tokio::fs::write(
            infra.join("main.tfvars.json"),
            r#"{ "location": "${AZURE_LOCATION}", "environment_name": "${AZURE_ENV_NAME}", "replicas": 2 }"#,
        )
        .await
        .unwrap();

        let provider = provider(project.path(), binary).await;
        let plan = provider.plan().wait().await.unwrap();

        let root = tokio::fs::canonicalize(project.path()).await.unwrap();
        let staging = root.join(".azure/dev/infra");
        let PlanDetails::Terraform { plan_file, var_file, state_file } = &plan.details else {
            panic!("expected a terraform plan, got {:?}", plan.details);
        };
        assert_eq!(plan_file, &staging.join("main.tfplan"));
        assert_eq!(var_file, &staging.join("main.tfvars.json"));
        assert_eq!(state_file.as_deref(), Some(staging.join("terraform.tfstate").as_path()));

        let written: Value = serde_json::from_str(&tokio::fs::read_to_string(var_file).await.unwrap()).unwrap();
        assert_eq!(written, json!({ "location": "westus2", "environment_name": "dev", "replicas": 2 }));
        assert_eq!(plan.deployment.parameters["replicas"].param_type, "number");
        assert_eq!(plan.deployment.parameters["location"].value, Some(json!("westus2")));

        let deployed = provider.deploy(plan, scope()).wait().await.unwrap().deployment;
        assert_eq!(deployed.outputs["WEBSITE_URL"].value, json!("https://web.example"));
        assert_eq!(deployed.outputs["PORTS"].param_type, ParameterType::Array);
        assert!(!deployed.outputs.contains_key("UNSET"));

        let state = provider.state(scope()).wait().await.unwrap().state;
        assert_eq!(state.outputs.len(), 1);
        assert_eq!(
            state.resources,
            vec![Resource::new("/subscriptions/sub/kv/secrets/s"), Resource::new("/subscriptions/sub/resourceGroups/rg-dev")]
        );

        let destroyed = provider.destroy(deployed, DestroyOptions::new(true, false)).wait().await.unwrap();
        assert_eq!(destroyed.invalidated_env_keys, vec!["PORTS", "WEBSITE_URL"]);

        let calls = tokio::fs::read_to_string(&log).await.unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        let state_arg = format!("-state={}", staging.join("terraform.tfstate").display());
        let var_arg = format!("-var-file={}", staging.join("main.tfvars.json").display());
        assert_eq!(calls[0], "sub-123 init -no-color -input=false");
        assert_eq!(calls[1], "sub-123 validate -no-color");
        assert!(calls[2].starts_with("sub-123 plan -no-color -input=false -out="));
        assert!(calls[2].ends_with(&format!("{} {}", var_arg, state_arg)));
        assert_eq!(
            calls[3],
            format!("sub-123 apply -no-color -input=false {} {}", state_arg, staging.join("main.tfplan").display())
        );
        assert_eq!(calls[4], format!("sub-123 output -json -no-color {}", state_arg));
        assert_eq!(calls[5], format!("sub-123 show -json -no-color {}", staging.join("terraform.tfstate").display()));
        assert_eq!(calls[6], format!("sub-123 output -json -no-color {}", state_arg));
        assert_eq!(calls[7], format!("sub-123 destroy -no-color {} {} -auto-approve", var_arg, state_arg));
    }

    #[tokio::test]
    async fn missing_binary_fails_init_with_context() {
        let project = tempfile::tempdir().unwrap();
        let infra = project.path().join("infra");
        tokio::fs::create_dir_all(&infra).await.unwrap();
        tokio::fs::write(infra.join("main.tfvars.json"), "{}").await.unwrap();

        let provider = provider(project.path(), project.path().join("no-such-terraform")).await;
        let err = provider.plan().wait().await.unwrap_err();
        assert!(err.to_string().starts_with("terraform init failed: "), "{}", err);
        assert!(matches!(err.root(), ProvisionError::Tool { command, .. } if command == "init"));
    }

    #[tokio::test]
    async fn remote_backend_is_detected_from_tf_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("main.tf"), "resource \"x\" \"y\" {}\n").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), r#"backend "azurerm""#).await.unwrap();
        assert!(!is_remote_backend(dir.path()).await.unwrap());

        tokio::fs::write(
            dir.path().join("provider.tf"),
            "terraform {\n  backend \"azurerm\" {}\n}\n",
        )
        .await
        .unwrap();
        assert!(is_remote_backend(dir.path()).await.unwrap());
    }

    #[test]
    fn output_types_map_to_parameter_types() {
        assert_eq!(output_type(&json!("string")).unwrap(), ParameterType::String);
        assert_eq!(output_type(&json!("bool")).unwrap(), ParameterType::Boolean);
        assert_eq!(output_type(&json!(["tuple", ["string"]])).unwrap(), ParameterType::Array);
        assert_eq!(output_type(&json!(["map", "string"])).unwrap(), ParameterType::Object);
        assert!(matches!(
            output_type(&json!("dynamic")),
            Err(ProvisionError::Domain(DomainError::UnsupportedParameterType(_)))
        ));
    }
}
