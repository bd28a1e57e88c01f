//! Well-known environment value names and config paths shared across crates.

pub const AZURE_ENV_NAME: &str = "AZURE_ENV_NAME";
pub const AZURE_LOCATION: &str = "AZURE_LOCATION";
pub const AZURE_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const AZURE_RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP";
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";

/// Disables background progress polling when set to a truthy value.
pub const PROVISION_PROGRESS_DISABLE: &str = "AZD_DEBUG_PROVISION_PROGRESS_DISABLE";

/// Config section holding prompted ARM/Bicep parameter values.
pub const INFRA_PARAMETERS_PATH: &str = "infra.parameters";

/// Tag applied to resource groups and deployments owned by an environment.
pub const ENV_NAME_TAG: &str = "azd-env-name";
