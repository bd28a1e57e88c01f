use std::path::{Path, PathBuf};

use azd_domain::{ConfigTree, Options, ProviderKind};
use serde_json::Value;
use tracing::debug;

use crate::error::ConfigError;
use crate::project::{PlatformConfig, ProjectConfig};
use crate::raw::{RawInfra, RawProject};

pub const PROJECT_FILE_NAMES: [&str; 2] = ["azure.yaml", "azure.yml"];

const USER_CONFIG_FILE: &str = "config.json";

/// Walk up from `start` until a directory containing a project file is found.
pub fn find_project_dir(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        if PROJECT_FILE_NAMES.iter().any(|name| current.join(name).is_file()) {
            return Ok(current.to_path_buf());
        }
        dir = current.parent();
    }
    Err(ConfigError::ProjectNotFound(start.display().to_string()))
}

/// Load the project file from `dir`.
pub fn load_project(dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let file = PROJECT_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| ConfigError::ProjectNotFound(dir.display().to_string()))?;
    let path_str = file.display().to_string();

    debug!("Loading project from {:?}", file);
    let contents = std::fs::read_to_string(&file).map_err(|e| ConfigError::Io {
        path: path_str.clone(),
        source: e,
    })?;
    let raw: RawProject = serde_yaml::from_str(&contents).map_err(|e| ConfigError::YamlParse {
        path: path_str.clone(),
        source: e,
    })?;

    let infra = convert_infra(raw.infra.unwrap_or_default(), &path_str)?;

    let platform = match raw.platform {
        Some(p) => {
            let config = match p.config {
                Some(yaml) => {
                    let json = serde_json::to_value(yaml).map_err(|e| ConfigError::Conversion {
                        path: path_str.clone(),
                        message: format!("platform.config: {e}"),
                    })?;
                    match json {
                        Value::Object(map) => ConfigTree::from_map(map),
                        Value::Null => ConfigTree::new(),
                        other => {
                            return Err(ConfigError::Conversion {
                                path: path_str,
                                message: format!("platform.config must be a mapping, got {other}"),
                            })
                        }
                    }
                }
                None => ConfigTree::new(),
            };
            Some(PlatformConfig { kind: p.kind, config })
        }
        None => None,
    };

    Ok(ProjectConfig {
        name: raw.name,
        path: dir.to_path_buf(),
        infra,
        platform,
    })
}

fn convert_infra(raw: RawInfra, path: &str) -> Result<Options, ConfigError> {
    let provider = match raw.provider.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(name) => Some(name.parse::<ProviderKind>().map_err(|e| ConfigError::Conversion {
            path: path.to_string(),
            message: e.to_string(),
        })?),
    };

    Ok(Options {
        provider,
        path: raw.path.unwrap_or_default(),
        module: raw.module.unwrap_or_default(),
    })
}

/// Directory holding the per-user config file.
///
/// `AZD_CONFIG_DIR` overrides the default of `~/.azd`.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("AZD_CONFIG_DIR") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::home_dir().map(|home| home.join(".azd"))
}

/// Load `config.json` from `dir`. A missing file yields an empty tree.
pub fn load_user_config(dir: &Path) -> Result<ConfigTree, ConfigError> {
    let file = dir.join(USER_CONFIG_FILE);
    if !file.exists() {
        return Ok(ConfigTree::new());
    }
    let path_str = file.display().to_string();
    let contents = std::fs::read_to_string(&file).map_err(|e| ConfigError::Io {
        path: path_str.clone(),
        source: e,
    })?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::JsonParse {
        path: path_str,
        source: e,
    })
}
