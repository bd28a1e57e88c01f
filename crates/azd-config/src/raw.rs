use serde::{Deserialize, Serialize};

/// Raw YAML representation of the project file (azure.yaml)
#[derive(Debug, Deserialize, Serialize)]
pub struct RawProject {
    pub name: String,
    #[serde(default)]
    pub infra: Option<RawInfra>,
    #[serde(default)]
    pub platform: Option<RawPlatform>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawInfra {
    /// Provider name; absent or empty means "use the default provider".
    pub provider: Option<String>,
    pub path: Option<String>,
    pub module: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawPlatform {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Option<serde_yaml::Value>,
}
