mod raw;
mod loader;
pub mod error;
pub mod project;

pub use loader::{find_project_dir, load_project, load_user_config, user_config_dir, PROJECT_FILE_NAMES};
pub use error::ConfigError;
pub use project::{PlatformConfig, ProjectConfig};
