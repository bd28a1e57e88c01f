use std::collections::{BTreeMap, HashMap};

use azd_async::TaskContext;
use azd_domain::{InputParameter, ParameterType, Progress};
use azd_store::{EnvironmentStore, SharedEnvironment};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::console::{Console, ConsoleOptions};
use crate::error::ProvisionError;

pub const SAVE_PARAMETER_PROMPT: &str = "Save the value in the environment for future use";

/// A parameter declaration as it appears in an ARM template (or a compiled
/// Bicep module).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParameter {
    #[serde(rename = "type")]
    pub arm_type: String,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(default)]
    pub min_value: Option<i64>,
    #[serde(default)]
    pub max_value: Option<i64>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub metadata: Option<ParameterMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParameterMetadata {
    #[serde(default)]
    pub description: Option<String>,
}

impl TemplateParameter {
    pub fn new(arm_type: impl Into<String>) -> Self {
        Self { arm_type: arm_type.into(), ..Default::default() }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn parameter_type(&self) -> Result<ParameterType, ProvisionError> {
        Ok(ParameterType::from_arm_type(&self.arm_type)?)
    }

    /// `secureString` and `secureObject` values are never written to disk.
    pub fn is_secure(&self) -> bool {
        self.arm_type.to_ascii_lowercase().starts_with("secure")
    }

    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }

    pub fn description(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.description.as_deref())
    }
}

/// Config path under which a prompted value for `key` is remembered.
pub fn config_key(key: &str) -> String {
    format!("{}.{}", azd_domain::keys::INFRA_PARAMETERS_PATH, key)
}

/// Everything parameter resolution needs besides the template itself.
pub struct ParameterResolver<'a> {
    pub ctx: &'a TaskContext<Progress>,
    pub console: &'a dyn Console,
    pub env: &'a SharedEnvironment,
    pub store: &'a dyn EnvironmentStore,
}

impl ParameterResolver<'_> {
    /// Resolve a value for each template parameter, in key order:
    ///
    /// 1. a value from the parameters file, with boolean and number strings
    ///    relaxed to their declared type;
    /// 2. nothing, when the template declares a default;
    /// 3. a value saved under `infra.parameters.<key>` by an earlier run, as
    ///    long as it still fits the declared type (a stale value is dropped);
    /// 4. a prompt. Non-secure answers may be saved for the next run.
    ///
    /// The result has an entry for every template parameter; parameters left
    /// to their default carry no value.
    pub async fn ensure_parameters(
        &self,
        template: &BTreeMap<String, TemplateParameter>,
        file_values: &HashMap<String, Value>,
    ) -> Result<HashMap<String, InputParameter>, ProvisionError> {
        let mut resolved = HashMap::with_capacity(template.len());
        let mut config_modified = false;

        for (key, param) in template {
            let param_type = param.parameter_type()?;
            let mut input = InputParameter {
                param_type: param_type.as_str().to_string(),
                default_value: param.default_value.clone(),
                value: None,
            };

            if let Some(value) = file_values.get(key) {
                input.value = Some(param_type.coerce_file_value(value.clone()));
                resolved.insert(key.clone(), input);
                continue;
            }

            if param.has_default() {
                resolved.insert(key.clone(), input);
                continue;
            }

            let path = config_key(key);
            let saved = self.env.read().await.config().get(&path).cloned();
            if let Some(saved) = saved {
                if param_type.is_assignable(&saved) {
                    input.value = Some(saved);
                    resolved.insert(key.clone(), input);
                    continue;
                }
                debug!(parameter = %key, "saved value no longer fits parameter type, prompting again");
                self.env.write().await.config_mut().unset(&path)?;
                config_modified = true;
            }

            let (value, save) = self
                .ctx
                .interact(|| async {
                    let value = prompt_for_parameter(self.console, key, param, param_type).await?;
                    let save = if param.is_secure() {
                        false
                    } else {
                        self.console.confirm(ConsoleOptions::new(SAVE_PARAMETER_PROMPT)).await?
                    };
                    Ok::<_, ProvisionError>((value, save))
                })
                .await
                .map_err(|e| e.context("prompting for value"))?;

            if save {
                match self.env.write().await.config_mut().set(&path, value.clone()) {
                    Ok(()) => config_modified = true,
                    Err(e) => self.console.message(&format!("warning: failed to set value: {}", e)),
                }
            }

            input.value = Some(value);
            resolved.insert(key.clone(), input);
        }

        if config_modified {
            let env = self.env.read().await;
            if let Err(e) = self.store.save(&env).await {
                warn!(error = %e, "failed to save configured parameter values");
                self.console
                    .message(&format!("warning: failed to save configured values: {}", e));
            }
        }

        Ok(resolved)
    }
}

/// Ask the user for a value of `param`, re-asking until the answer fits the
/// declared type and bounds.
pub async fn prompt_for_parameter(
    console: &dyn Console,
    key: &str,
    param: &TemplateParameter,
    param_type: ParameterType,
) -> Result<Value, ProvisionError> {
    let kind = if param.is_secure() { "secured parameter" } else { "parameter" };
    let message = format!("Enter a value for the '{}' infrastructure {}:", key, kind);
    let help = param.description().unwrap_or_default().to_string();

    if let Some(allowed) = &param.allowed_values {
        if allowed.is_empty() {
            return Err(ProvisionError::InvalidParameter(format!(
                "parameter '{}' has no allowed values defined",
                key
            )));
        }
        let options = allowed.iter().map(display_value).collect();
        let choice = console
            .select(ConsoleOptions::new(&message).with_help(help).with_options(options))
            .await?;
        return Ok(allowed[choice].clone());
    }

    match param_type {
        ParameterType::Boolean => {
            let options = vec!["False".to_string(), "True".to_string()];
            let choice = console
                .select(ConsoleOptions::new(&message).with_help(help).with_options(options))
                .await?;
            Ok(Value::Bool(choice == 1))
        }
        _ => loop {
            let mut options = ConsoleOptions::new(&message).with_help(help.clone());
            if param.is_secure() {
                options = options.secret();
            }
            let answer = console.prompt(options).await?;
            match convert_answer(key, param, param_type, &answer) {
                Ok(value) => return Ok(value),
                Err(reason) => console.message(&format!("Error: {}", reason)),
            }
        },
    }
}

fn convert_answer(
    key: &str,
    param: &TemplateParameter,
    param_type: ParameterType,
    answer: &str,
) -> Result<Value, String> {
    match param_type {
        ParameterType::Number => {
            let n: i64 = answer
                .trim()
                .parse()
                .map_err(|_| format!("failed to convert '{}' to an integer", answer))?;
            if param.min_value.is_some_and(|min| n < min) || param.max_value.is_some_and(|max| n > max) {
                return Err(format!(
                    "value for '{}' must be between {} and {}",
                    key,
                    param.min_value.map_or("-inf".to_string(), |v| v.to_string()),
                    param.max_value.map_or("inf".to_string(), |v| v.to_string()),
                ));
            }
            Ok(Value::from(n))
        }
        ParameterType::String => {
            let len = answer.chars().count();
            if param.min_length.is_some_and(|min| len < min) || param.max_length.is_some_and(|max| len > max) {
                return Err(format!(
                    "length of '{}' must be between {} and {} characters",
                    key,
                    param.min_length.unwrap_or(0),
                    param.max_length.map_or("any".to_string(), |v| v.to_string()),
                ));
            }
            Ok(Value::String(answer.to_string()))
        }
        ParameterType::Array => match serde_json::from_str::<Value>(answer) {
            Ok(v @ Value::Array(_)) => Ok(v),
            _ => Err(format!("'{}' is not a valid JSON array", answer)),
        },
        ParameterType::Object => match serde_json::from_str::<Value>(answer) {
            Ok(v @ Value::Object(_)) => Ok(v),
            _ => Err(format!("'{}' is not a valid JSON object", answer)),
        },
        ParameterType::Boolean => {
            azd_domain::parse_bool(answer.trim()).map(Value::Bool).ok_or_else(|| format!("'{}' is not a boolean", answer))
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
