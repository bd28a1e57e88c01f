use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "azd",
    about = "Provision and tear down the Azure infrastructure of an application project",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Run as if azd was started in this directory.
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Environment to operate on. Defaults to the project's default environment.
    #[arg(short = 'e', long = "environment", env = "AZURE_ENV_NAME", global = true)]
    pub environment: Option<String>,

    /// Never prompt. Confirmations take their default answer.
    #[arg(long, global = true)]
    pub no_prompt: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision the project's Azure resources.
    Provision {
        /// Show the predicted changes instead of deploying.
        #[arg(long)]
        preview: bool,
    },

    /// Show the changes a provision would make.
    Preview,

    /// Delete the project's Azure resources.
    Down {
        /// Skip the delete confirmation.
        #[arg(long)]
        force: bool,

        /// Permanently delete soft-deleted resources without asking.
        #[arg(long)]
        purge: bool,
    },

    /// Refresh the environment from the deployed infrastructure and print its outputs.
    Show,

    /// Manage environments.
    Env {
        #[command(subcommand)]
        command: EnvCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum EnvCommand {
    /// List the project's environments.
    List,

    /// Create an environment and make it the default.
    New {
        /// Letters, digits, '-' and '_'.
        name: String,
    },

    /// Make an existing environment the default.
    Select { name: String },

    /// Print the environment's values as KEY="value" lines.
    GetValues,

    /// Set one environment value.
    Set { key: String, value: String },
}
