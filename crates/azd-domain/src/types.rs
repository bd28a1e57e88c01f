use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;

// ── Parameter types ───────────────────────────────────────────────────────────

/// Canonical type of a deployment input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "bool")]
    Boolean,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "array")]
    Array,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "bool",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
        }
    }

    /// Map an ARM / Bicep template type string onto the canonical set.
    ///
    /// Unknown strings indicate a template feature this tool does not support
    /// and are reported as [`DomainError::UnsupportedParameterType`].
    pub fn from_arm_type(s: &str) -> Result<Self, DomainError> {
        match s {
            "String" | "string" | "secureString" | "securestring" => Ok(ParameterType::String),
            "Bool" | "bool" => Ok(ParameterType::Boolean),
            "Int" | "int" => Ok(ParameterType::Number),
            "Object" | "object" | "secureObject" | "secureobject" => Ok(ParameterType::Object),
            "Array" | "array" => Ok(ParameterType::Array),
            other => Err(DomainError::UnsupportedParameterType(other.to_string())),
        }
    }

    /// Whether `value` can be passed as-is for a parameter of this type.
    ///
    /// Numbers must be integral: `1` and `1.0` are accepted, `1.5` is not.
    pub fn is_assignable(&self, value: &Value) -> bool {
        match self {
            ParameterType::Array => value.is_array(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Number => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            ParameterType::Object => value.is_object(),
            ParameterType::String => value.is_string(),
        }
    }

    /// Relax a parameters-file value for boolean and number parameters.
    ///
    /// Strings that parse as the declared type are converted; anything else is
    /// returned untouched and left for [`is_assignable`](Self::is_assignable)
    /// to reject later.
    pub fn coerce_file_value(&self, value: Value) -> Value {
        match (self, &value) {
            (ParameterType::Boolean, Value::String(s)) => match parse_bool(s) {
                Some(b) => Value::Bool(b),
                None => value,
            },
            (ParameterType::Number, Value::String(s)) => match s.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => value,
            },
            _ => value,
        }
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterType {
    type Err = DomainError;

    /// Parses the canonical names produced by [`ParameterType::as_str`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ParameterType::String),
            "number" => Ok(ParameterType::Number),
            "bool" => Ok(ParameterType::Boolean),
            "object" => Ok(ParameterType::Object),
            "array" => Ok(ParameterType::Array),
            other => Err(DomainError::UnsupportedParameterType(other.to_string())),
        }
    }
}

/// `1`, `t`, `true` and `0`, `f`, `false`, in lower, upper or title case.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

// ── Parameters ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParameter {
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl InputParameter {
    /// True for any non-null value. An empty string counts as a value.
    pub fn has_value(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_null())
    }

    /// True for any non-null default. An empty string counts as a default.
    pub fn has_default_value(&self) -> bool {
        self.default_value.as_ref().is_some_and(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputParameter {
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub value: Value,
}

impl OutputParameter {
    pub fn new(param_type: ParameterType, value: impl Into<Value>) -> Self {
        Self { param_type, value: value.into() }
    }

    /// Render the value the way it is written to the environment file:
    /// strings verbatim, arrays and objects as compact JSON.
    pub fn env_value(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// ── Deployment & state ────────────────────────────────────────────────────────

/// A deployment of one environment: the resolved inputs and, after a deploy,
/// the outputs read back from the remote record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub parameters: HashMap<String, InputParameter>,
    pub outputs: HashMap<String, OutputParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
}

impl Resource {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub outputs: HashMap<String, OutputParameter>,
    pub resources: Vec<Resource>,
}

impl State {
    /// Merge `other` into this state. Outputs from `other` win on key
    /// conflicts; resources from `other` replace entries with the same id and
    /// are appended otherwise.
    pub fn merge_into(&mut self, other: &State) {
        for (key, output) in &other.outputs {
            self.outputs.insert(key.clone(), output.clone());
        }

        for resource in &other.resources {
            match self.resources.iter_mut().find(|r| r.id == resource.id) {
                Some(existing) => *existing = resource.clone(),
                None => self.resources.push(resource.clone()),
            }
        }
    }
}

// ── Destroy options ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    force: bool,
    purge: bool,
}

impl DestroyOptions {
    pub fn new(force: bool, purge: bool) -> Self {
        Self { force, purge }
    }

    /// Skip the "this will delete N resources" confirmation.
    pub fn force(&self) -> bool {
        self.force
    }

    /// Purge soft-deleted resources without asking.
    pub fn purge(&self) -> bool {
        self.purge
    }
}

// ── Provider kind ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Bicep,
    Arm,
    Terraform,
    DevCenter,
    Test,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Bicep => "bicep",
            ProviderKind::Arm => "arm",
            ProviderKind::Terraform => "terraform",
            ProviderKind::DevCenter => "devcenter",
            ProviderKind::Test => "test",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bicep" => Ok(ProviderKind::Bicep),
            "arm" => Ok(ProviderKind::Arm),
            "terraform" => Ok(ProviderKind::Terraform),
            "devcenter" => Ok(ProviderKind::DevCenter),
            "test" => Ok(ProviderKind::Test),
            _ => Err(DomainError::UnsupportedProvider(s.to_string())),
        }
    }
}

// ── Progress ──────────────────────────────────────────────────────────────────

/// A progress update emitted by a long-running provider operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Progress {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), timestamp: Utc::now() }
    }
}
