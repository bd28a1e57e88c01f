//! Provisioning through Azure Deployment Environments.
//!
//! Selected with `platform.type: devcenter` in the project file. The dev
//! center runs the deployment from a catalog definition; this crate picks the
//! dev center, project, environment type and definition, creates the
//! environment and maps the resulting ARM deployment back into azd outputs.

pub mod config;
pub mod error;
pub mod manager;
pub mod prompter;
pub mod provider;

#[cfg(test)]
mod fakes;

pub use config::{Config, PLATFORM_KIND};
pub use error::DevCenterError;
pub use manager::DevCenterManager;
pub use prompter::{DevCenterPrompter, KnownParameters};
pub use provider::{DevCenterProvider, DevCenterSettings};
