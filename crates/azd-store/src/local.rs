use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use azd_domain::ConfigTree;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::environment::Environment;
use crate::error::StoreError;
use crate::store::{validate_name, EnvironmentStore};

const DOTENV_FILE: &str = ".env";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootConfig {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_environment: Option<String>,
}

/// Stores environments under a project's `.azure` directory:
///
/// ```text
/// .azure/
///   config.json          <- default environment
///   <env>/
///     .env               <- values
///     config.json        <- config tree
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `<project_dir>/.azure`.
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(".azure"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn read_root_config(&self) -> Result<RootConfig, StoreError> {
        let path = self.root.join(CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RootConfig { version: 1, ..Default::default() }),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn write_root_config(&self, config: &RootConfig) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_err(&self.root, e))?;
        let path = self.root.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&path, contents).await.map_err(|e| io_err(&path, e))
    }
}

#[async_trait]
impl EnvironmentStore for LocalFileStore {
    async fn get(&self, name: &str) -> Result<Option<Environment>, StoreError> {
        validate_name(name)?;
        let dir = self.env_dir(name);
        let dotenv_path = dir.join(DOTENV_FILE);
        if !dotenv_path.exists() {
            return Ok(None);
        }

        debug!(environment = name, "loading environment from {:?}", dir);
        let values = read_dotenv(&dotenv_path)?;

        let config_path = dir.join(CONFIG_FILE);
        let config = match tokio::fs::read_to_string(&config_path).await {
            Ok(contents) => serde_json::from_str::<ConfigTree>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigTree::new(),
            Err(e) => return Err(io_err(&config_path, e)),
        };

        Ok(Some(Environment::from_parts(name, values, config)))
    }

    async fn save(&self, env: &Environment) -> Result<(), StoreError> {
        validate_name(env.name())?;
        let dir = self.env_dir(env.name());
        tokio::fs::create_dir_all(&dir).await.map_err(|e| io_err(&dir, e))?;

        let dotenv_path = dir.join(DOTENV_FILE);
        tokio::fs::write(&dotenv_path, render_dotenv(env.values()))
            .await
            .map_err(|e| io_err(&dotenv_path, e))?;

        let config_path = dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(env.config())?;
        tokio::fs::write(&config_path, contents)
            .await
            .map_err(|e| io_err(&config_path, e))?;

        debug!(environment = env.name(), "saved environment");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.root, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&self.root, e))? {
            let path = entry.path();
            if path.join(DOTENV_FILE).is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let dir = self.env_dir(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&dir, e)),
        }

        let mut root = self.read_root_config().await?;
        if root.default_environment.as_deref() == Some(name) {
            root.default_environment = None;
            self.write_root_config(&root).await?;
        }
        Ok(())
    }

    async fn default_environment(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read_root_config().await?.default_environment)
    }

    async fn set_default(&self, name: &str) -> Result<(), StoreError> {
        if self.get(name).await?.is_none() {
            return Err(StoreError::EnvironmentNotFound(name.to_string()));
        }
        let mut root = self.read_root_config().await?;
        root.version = 1;
        root.default_environment = Some(name.to_string());
        self.write_root_config(&root).await
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.display().to_string(), source }
}

fn read_dotenv(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
    let iter = dotenv::from_path_iter(path).map_err(|e| StoreError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut values = BTreeMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        values.insert(key, value);
    }
    Ok(values)
}

/// Render values as sorted `KEY="value"` lines.
fn render_dotenv(values: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in values {
        out.push_str(key);
        out.push_str("=\"");
        for c in value.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '$' => out.push_str("\\$"),
                '\n' => out.push_str("\\n"),
                other => out.push(other),
            }
        }
        out.push_str("\"\n");
    }
    out
}
