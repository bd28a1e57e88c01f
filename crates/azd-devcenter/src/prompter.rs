use std::collections::HashMap;
use std::sync::Arc;

use azd_azure::{DefinitionParameter, DefinitionParameterType, EnvironmentDefinition, EnvironmentType, Project};
use azd_provisioning::{Console, ConsoleOptions};
use azd_store::Environment;
use serde_json::Value;

use crate::config::Config;
use crate::error::{DevCenterError, ResultExt};
use crate::manager::DevCenterManager;

/// Config section caching environment definition parameter values.
pub const PROVISION_PARAMETERS_PATH: &str = "provision.parameters";

/// Prefix of the per-parameter environment variable override.
pub const PARAMETER_OVERRIDE_PREFIX: &str = "AZURE_PARAM_";

const ENVIRONMENT_NAME_PARAMETER: &str = "environmentName";
const REPO_URL_PARAMETER: &str = "repoUrl";

/// Parameter values settled without asking, and the parameters still needing
/// an answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnownParameters {
    pub values: HashMap<String, Value>,
    pub missing: Vec<DefinitionParameter>,
}

/// Asks the user to choose dev center settings and parameter values.
pub struct DevCenterPrompter {
    console: Arc<dyn Console>,
    manager: Arc<DevCenterManager>,
}

impl DevCenterPrompter {
    pub fn new(console: Arc<dyn Console>, manager: Arc<DevCenterManager>) -> Self {
        Self { console, manager }
    }

    /// Fill in the project and environment definition when they are missing.
    pub async fn prompt_for_config(&self, config: &mut Config) -> Result<(), DevCenterError> {
        if config.project.is_empty() {
            let project = self.prompt_project(&config.name).await?;
            config.name = project.dev_center.name;
            config.project = project.name;
        }

        if config.environment_definition.is_empty() {
            let definition = self.prompt_environment_definition(&config.name, &config.project).await?;
            config.catalog = definition.catalog_name;
            config.environment_definition = definition.name;
        }
        Ok(())
    }

    /// Pick one of the writable projects, limited to `dev_center` when it is
    /// set. A single candidate is returned without asking.
    pub async fn prompt_project(&self, dev_center: &str) -> Result<Project, DevCenterError> {
        let mut projects = self.manager.writable_projects().await?;
        projects.retain(|p| dev_center.is_empty() || p.dev_center.name.eq_ignore_ascii_case(dev_center));
        if projects.is_empty() {
            return Err(DevCenterError::NotFound("no dev center projects found".into()));
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));

        if projects.len() == 1 {
            return Ok(projects.remove(0));
        }

        let labels = disambiguate(&projects, |p| &p.name, |p| &p.dev_center.name);
        let index = self
            .console
            .select(ConsoleOptions::new("Select a project:").with_options(labels))
            .await?;
        Ok(projects.swap_remove(index))
    }

    pub async fn prompt_environment_type(
        &self,
        dev_center: &str,
        project_name: &str,
    ) -> Result<EnvironmentType, DevCenterError> {
        let project = self.manager.client().project(dev_center, project_name).await?;
        let mut types = self.manager.client().environment_types(&project).await?;
        if types.is_empty() {
            return Err(DevCenterError::NotFound(format!("no environment types found for '{}'", project_name)));
        }
        types.sort_by(|a, b| a.name.cmp(&b.name));

        if types.len() == 1 {
            return Ok(types.remove(0));
        }

        let names = types.iter().map(|t| t.name.clone()).collect();
        let index = self
            .console
            .select(ConsoleOptions::new("Select an environment type:").with_options(names))
            .await?;
        Ok(types.swap_remove(index))
    }

    pub async fn prompt_environment_definition(
        &self,
        dev_center: &str,
        project_name: &str,
    ) -> Result<EnvironmentDefinition, DevCenterError> {
        let project = self.manager.client().project(dev_center, project_name).await?;
        let mut definitions = self.manager.client().environment_definitions(&project).await?;
        if definitions.is_empty() {
            return Err(DevCenterError::NotFound(format!(
                "no environment definitions found for '{}'",
                project_name
            )));
        }
        definitions.sort_by(|a, b| a.name.cmp(&b.name));

        let labels = disambiguate(&definitions, |d| &d.name, |d| &d.catalog_name);
        let index = self
            .console
            .select(ConsoleOptions::new("Select an environment definition:").with_options(labels))
            .await?;
        Ok(definitions.swap_remove(index))
    }

    /// Resolve what can be resolved without the user, in order: an
    /// `AZURE_PARAM_<ID>` override, the cached `provision.parameters.<id>`
    /// value, then the auto-filled `environmentName` and `repoUrl`.
    ///
    /// An override set to the empty string leaves the parameter out entirely.
    pub fn known_parameters(
        env: &Environment,
        definition: &EnvironmentDefinition,
    ) -> Result<KnownParameters, DevCenterError> {
        let mut known = KnownParameters::default();

        for param in &definition.parameters {
            let override_name = format!("{}{}", PARAMETER_OVERRIDE_PREFIX, param.id.to_uppercase());
            if let Some(raw) = env.lookup_env(&override_name) {
                if raw.is_empty() {
                    continue;
                }
                let value = parse_override(&raw, param.param_type)
                    .map_err(|message| DevCenterError::InvalidOverride { name: override_name, message })?;
                known.values.insert(param.id.clone(), value);
                continue;
            }

            let path = format!("{}.{}", PROVISION_PARAMETERS_PATH, param.id);
            if let Some(value) = env.config().get(&path) {
                known.values.insert(param.id.clone(), value.clone());
                continue;
            }

            if param.id == ENVIRONMENT_NAME_PARAMETER {
                known.values.insert(param.id.clone(), Value::String(env.name().to_string()));
                continue;
            }

            if param.id == REPO_URL_PARAMETER {
                let repo_url = param
                    .allowed
                    .first()
                    .cloned()
                    .or_else(|| param.default.as_ref().and_then(Value::as_str).map(str::to_string))
                    .filter(|url| !url.is_empty());
                if let Some(url) = repo_url {
                    known.values.insert(param.id.clone(), Value::String(url));
                    continue;
                }
            }

            known.missing.push(param.clone());
        }
        Ok(known)
    }

    /// Ask for one parameter value in the form its type calls for.
    pub async fn prompt_parameter(&self, param: &DefinitionParameter) -> Result<Value, DevCenterError> {
        let label = if param.name.is_empty() { &param.id } else { &param.name };
        let mut options = ConsoleOptions::new(format!("Enter a value for {}", label))
            .with_help(param.description.clone())
            .with_options(param.allowed.clone());
        if let Some(default) = &param.default {
            options = options.with_default(default.clone());
        }
        let failed = || format!("failed to prompt for {}", label);

        match param.param_type {
            DefinitionParameterType::Boolean => {
                let answer = self.console.confirm(options).await.context(failed())?;
                Ok(Value::Bool(answer))
            }
            DefinitionParameterType::String if !param.allowed.is_empty() => {
                let index = self.console.select(options).await.context(failed())?;
                Ok(Value::String(param.allowed[index].clone()))
            }
            DefinitionParameterType::String => {
                let answer = self.console.prompt(options).await.context(failed())?;
                Ok(Value::String(answer))
            }
            DefinitionParameterType::Integer => {
                let answer = self.console.prompt(options).await.context(failed())?;
                let number: i64 = answer.trim().parse().map_err(|e| {
                    DevCenterError::InvalidParameter(format!("failed to convert {} to int: {}", label, e))
                })?;
                Ok(Value::from(number))
            }
            other => Err(DevCenterError::InvalidParameter(format!(
                "failed to prompt for {}, unsupported parameter type: {}",
                label,
                type_name(other)
            ))),
        }
    }
}

/// Labels for a select list; entries sharing a name get `name (qualifier)`.
fn disambiguate<T>(items: &[T], name: impl Fn(&T) -> &String, qualifier: impl Fn(&T) -> &String) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let duplicated = items.iter().filter(|other| name(other) == name(item)).count() > 1;
            if duplicated {
                format!("{} ({})", name(item), qualifier(item))
            } else {
                name(item).clone()
            }
        })
        .collect()
}

fn parse_override(raw: &str, param_type: DefinitionParameterType) -> Result<Value, String> {
    match param_type {
        DefinitionParameterType::String => Ok(Value::String(raw.to_string())),
        DefinitionParameterType::Boolean => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(format!("invalid boolean value '{}', expected true/false", raw)),
        },
        DefinitionParameterType::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("invalid integer value '{}': {}", raw, e)),
        other => Err(format!("unsupported parameter type: {}", type_name(other))),
    }
}

fn type_name(param_type: DefinitionParameterType) -> &'static str {
    match param_type {
        DefinitionParameterType::Array => "array",
        DefinitionParameterType::Boolean => "boolean",
        DefinitionParameterType::Integer => "integer",
        DefinitionParameterType::Number => "number",
        DefinitionParameterType::Object => "object",
        DefinitionParameterType::String => "string",
    }
}
