use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use azd_domain::{OutputParameter, ParameterType};
use azd_store::Environment;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::envsubst;
use crate::error::ProvisionError;
use crate::parameters::TemplateParameter;
use crate::provider::normalize_output_key;

/// The parts of an ARM template the provider reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArmTemplate {
    #[serde(default)]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(default)]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateOutput {
    #[serde(rename = "type")]
    pub output_type: String,
}

impl ArmTemplate {
    pub fn parse(path: &Path, raw: &Value) -> Result<Self, ProvisionError> {
        serde_json::from_value(raw.clone()).map_err(|e| ProvisionError::InvalidTemplate {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Declared outputs with upper-cased keys and no values yet.
    pub fn declared_outputs(&self) -> Result<HashMap<String, OutputParameter>, ProvisionError> {
        self.outputs
            .iter()
            .map(|(key, output)| {
                let param_type = ParameterType::from_arm_type(&output.output_type)?;
                Ok((normalize_output_key(key), OutputParameter::new(param_type, Value::Null)))
            })
            .collect()
    }
}

/// Read a JSON template from disk.
pub async fn read_arm_template(path: &Path) -> Result<Value, ProvisionError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProvisionError::io(path, e))?;
    serde_json::from_str(&contents).map_err(|e| ProvisionError::InvalidTemplate {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Compile a Bicep module to an ARM template with `bicep build --stdout`.
pub async fn compile_bicep(bicep: &Path, module: &Path) -> Result<Value, ProvisionError> {
    debug!(module = %module.display(), "compiling bicep module");
    let output = tokio::process::Command::new(bicep)
        .arg("build")
        .arg(module)
        .arg("--stdout")
        .output()
        .await
        .map_err(|e| ProvisionError::Tool {
            tool: "bicep".into(),
            command: "build".into(),
            message: format!("failed to launch {}: {}", bicep.display(), e),
        })?;

    if !output.status.success() {
        return Err(ProvisionError::Tool {
            tool: "bicep".into(),
            command: "build".into(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    serde_json::from_slice(&output.stdout).map_err(|e| ProvisionError::InvalidTemplate {
        path: module.to_path_buf(),
        message: e.to_string(),
    })
}

/// Values from a `<module>.parameters.json` file after `${VAR}` expansion
/// against `env`. A missing file yields no values. Entries without a
/// literal `value` (Key Vault references) are left out.
pub async fn read_parameters_file(
    path: &Path,
    env: &Environment,
) -> Result<HashMap<String, Value>, ProvisionError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no parameters file");
            return Ok(HashMap::new());
        }
        Err(e) => return Err(ProvisionError::io(path, e)),
    };

    let expanded = envsubst::substitute(&raw, |name| env.lookup_env(name));
    let file: ParametersFile = serde_json::from_str(&expanded).map_err(|e| ProvisionError::InvalidTemplate {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(file
        .parameters
        .into_iter()
        .filter_map(|(key, entry)| entry.value.map(|v| (key, v)))
        .collect())
}

#[derive(Debug, Default, Deserialize)]
struct ParametersFile {
    #[serde(default)]
    parameters: HashMap<String, ParameterEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ParameterEntry {
    #[serde(default)]
    value: Option<Value>,
}

/// ARM parameters object for the parameters that carry a value.
pub fn arm_parameters(resolved: &HashMap<String, azd_domain::InputParameter>) -> Value {
    let map = resolved
        .iter()
        .filter(|(_, p)| p.has_value())
        .map(|(k, p)| (k.clone(), serde_json::json!({ "value": p.value })))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(map)
}
