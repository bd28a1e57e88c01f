pub mod arm;
pub mod console;
pub mod envsubst;
pub mod error;
pub mod manager;
pub mod parameters;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod terraform;
pub mod test_provider;

pub use arm::{progress_disabled, ArmProvider, ArmSettings, DeploymentProgress};
pub use console::{Console, ConsoleEvent, ConsoleOptions, ScriptedConsole};
pub use error::{ProvisionError, ResultExt};
pub use manager::Manager;
pub use prompt::{ensure_subscription_and_location, AccountPrompter, Prompter};
pub use provider::{
    DeployPreviewResult, DeployResult, DeploymentPlan, DeploymentPreview, DestroyResult, PlanDetails, PreviewChange,
    Provider, ProviderContext, ProvisionTask, StateResult,
};
pub use registry::ProviderRegistry;
pub use terraform::{TerraformProvider, TerraformSettings};
pub use test_provider::TestProvider;
