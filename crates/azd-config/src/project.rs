use std::path::PathBuf;

use azd_domain::{ConfigTree, Options};

/// A loaded project file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub name: String,
    /// Directory containing the project file.
    pub path: PathBuf,
    pub infra: Options,
    pub platform: Option<PlatformConfig>,
}

/// The optional `platform:` section, e.g. a DevCenter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformConfig {
    pub kind: String,
    pub config: ConfigTree,
}
