mod cli;
mod commands;
mod console;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, EnvCommand};
use tracing_subscriber::EnvFilter;

/// Version and commit of this build, sent to Azure as the user agent.
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("AZD_BUILD_COMMIT").unwrap_or("dev"),
        }
    }

    pub fn user_agent(&self) -> String {
        format!("azd/{} ({})", self.version, self.commit)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) if cli.global.debug => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("warn"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let build = BuildInfo::current();
    let global = &cli.global;

    match cli.command {
        Command::Provision { preview } => commands::provision(global, &build, preview).await,
        Command::Preview => commands::preview(global, &build).await,
        Command::Down { force, purge } => commands::down(global, &build, force, purge).await,
        Command::Show => commands::show(global, &build).await,
        Command::Env { command } => match command {
            EnvCommand::List => commands::env_list(global).await,
            EnvCommand::New { name } => commands::env_new(global, &name).await,
            EnvCommand::Select { name } => commands::env_select(global, &name).await,
            EnvCommand::GetValues => commands::env_get_values(global).await,
            EnvCommand::Set { key, value } => commands::env_set(global, &key, &value).await,
        },
    }
}
