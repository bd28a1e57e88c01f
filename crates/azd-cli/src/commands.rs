use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use azd_azure::{default_credential, ArmClient, DevCenterRestClient};
use azd_config::{find_project_dir, load_project, load_user_config, user_config_dir, ProjectConfig};
use azd_devcenter::{DevCenterManager, DevCenterProvider, PLATFORM_KIND};
use azd_domain::{ConfigTree, DestroyOptions, ProviderKind};
use azd_provisioning::{
    AccountPrompter, ArmProvider, Console, ConsoleOptions, Manager,
    ProviderContext, ProviderRegistry, TerraformProvider, TestProvider,
};
use azd_store::{Environment, EnvironmentStore, LocalFileStore};
use tracing::debug;

use crate::cli::GlobalArgs;
use crate::console::TerminalConsole;
use crate::output;
use crate::BuildInfo;

const NEW_ENVIRONMENT_PROMPT: &str = "Enter a new environment name:";

// ── Provision ─────────────────────────────────────────────────────────────────

pub async fn provision(global: &GlobalArgs, build: &BuildInfo, preview_only: bool) -> Result<()> {
    if preview_only {
        return preview(global, build).await;
    }

    let session = Session::open(global, build).await?;
    session.manager.provision().await?;
    Ok(())
}

// ── Preview ───────────────────────────────────────────────────────────────────

pub async fn preview(global: &GlobalArgs, build: &BuildInfo) -> Result<()> {
    let session = Session::open(global, build).await?;
    let result = session.manager.preview().await?;
    print!("{}", output::render_preview(&result.preview));
    Ok(())
}

// ── Down ──────────────────────────────────────────────────────────────────────

pub async fn down(global: &GlobalArgs, build: &BuildInfo, force: bool, purge: bool) -> Result<()> {
    let session = Session::open(global, build).await?;
    session
        .manager
        .destroy(DestroyOptions::new(force, purge))
        .await
        .context("deleting Azure resources")?;
    Ok(())
}

// ── Show ──────────────────────────────────────────────────────────────────────

pub async fn show(global: &GlobalArgs, build: &BuildInfo) -> Result<()> {
    let session = Session::open(global, build).await?;
    let state = session.manager.state().await?.state;
    session.manager.update_environment(&state.outputs).await?;

    println!("Environment: {}", session.context.env_name().await);
    print!("{}", output::render_outputs(&state.outputs));
    Ok(())
}

// ── Env ───────────────────────────────────────────────────────────────────────

pub async fn env_list(global: &GlobalArgs) -> Result<()> {
    let (_, store) = open_store(global)?;
    let mut names = store.list().await.context("listing environments")?;
    names.sort();
    let default = store.default_environment().await?;
    print!("{}", output::render_env_list(&names, default.as_deref()));
    Ok(())
}

pub async fn env_new(global: &GlobalArgs, name: &str) -> Result<()> {
    let (_, store) = open_store(global)?;
    store
        .create(name)
        .await
        .with_context(|| format!("creating environment '{name}'"))?;
    store.set_default(name).await?;
    println!("New environment '{name}' created and set as default");
    Ok(())
}

pub async fn env_select(global: &GlobalArgs, name: &str) -> Result<()> {
    let (_, store) = open_store(global)?;
    if store.get(name).await?.is_none() {
        bail!("environment '{name}' does not exist");
    }
    store.set_default(name).await?;
    Ok(())
}

pub async fn env_get_values(global: &GlobalArgs) -> Result<()> {
    let (_, store) = open_store(global)?;
    let console = TerminalConsole::new(global.no_prompt);
    let env = select_environment(global, &store, &console).await?;
    print!("{}", output::render_env_values(env.values()));
    Ok(())
}

pub async fn env_set(global: &GlobalArgs, key: &str, value: &str) -> Result<()> {
    let (_, store) = open_store(global)?;
    let console = TerminalConsole::new(global.no_prompt);
    let mut env = select_environment(global, &store, &console).await?;
    env.dotenv_set(key, value);
    store.save(&env).await.context("saving environment")?;
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Everything one provisioning command needs, with the provider initialized.
struct Session {
    context: ProviderContext,
    manager: Manager,
}

impl Session {
    async fn open(global: &GlobalArgs, build: &BuildInfo) -> Result<Self> {
        let (project, store) = open_store(global)?;
        let console = Arc::new(TerminalConsole::new(global.no_prompt));
        let env = select_environment(global, &store, console.as_ref()).await?;
        debug!(environment = env.name(), project = %project.name, "opened environment");

        let user_config = match user_config_dir() {
            Some(dir) => load_user_config(&dir).context("loading user config")?,
            None => ConfigTree::new(),
        };

        let tenant_id = Some(env.tenant_id()).filter(|t| !t.is_empty());
        let credential = default_credential(tenant_id);
        let arm = Arc::new(ArmClient::new(credential.clone(), build.user_agent()));
        let devcenter = Arc::new(DevCenterManager::new(
            Arc::new(DevCenterRestClient::new(credential, build.user_agent())),
            arm.clone(),
        ));

        let console: Arc<dyn Console> = console;
        let context = ProviderContext::new(
            env.into_shared(),
            Arc::new(store),
            console.clone(),
            Arc::new(AccountPrompter::new(console, arm.clone())),
        );

        let mut options = project.infra.clone();
        let platform_config = match &project.platform {
            Some(platform) if platform.kind.eq_ignore_ascii_case(PLATFORM_KIND) => {
                options.provider = Some(ProviderKind::DevCenter);
                platform.config.clone()
            }
            _ => ConfigTree::new(),
        };

        let mut registry = ProviderRegistry::new();
        for arm_kind in [ProviderKind::Bicep, ProviderKind::Arm] {
            let (ctx, arm) = (context.clone(), arm.clone());
            registry.register(arm_kind, move || {
                Box::new(ArmProvider::new(arm_kind, ctx.clone(), arm.clone(), arm.clone()))
            });
        }
        let ctx = context.clone();
        registry.register(ProviderKind::Terraform, move || Box::new(TerraformProvider::new(ctx.clone())));
        let ctx = context.clone();
        registry.register(ProviderKind::Test, move || Box::new(TestProvider::new(ctx.clone())));
        let ctx = context.clone();
        registry.register(ProviderKind::DevCenter, move || {
            Box::new(DevCenterProvider::new(
                ctx.clone(),
                devcenter.clone(),
                platform_config.clone(),
                user_config.clone(),
            ))
        });

        let mut manager = Manager::new(Arc::new(registry), context.clone(), arm, &project.path, options);
        manager.initialize().await?;
        Ok(Self { context, manager })
    }
}

fn open_store(global: &GlobalArgs) -> Result<(ProjectConfig, LocalFileStore)> {
    let start = match &global.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("reading current directory")?,
    };
    let dir: PathBuf = find_project_dir(&start)?;
    let project = load_project(&dir).with_context(|| format!("loading project in {}", dir.display()))?;
    let store = LocalFileStore::for_project(&project.path);
    Ok((project, store))
}

/// The environment named by `-e`/`AZURE_ENV_NAME`, else the default one.
/// A named environment that does not exist yet is created; with no name and
/// no default the user is asked for one.
async fn select_environment(global: &GlobalArgs, store: &LocalFileStore, console: &dyn Console) -> Result<Environment> {
    let default = store.default_environment().await?;
    let name = match (&global.environment, &default) {
        (Some(name), _) => name.clone(),
        (None, Some(name)) => name.clone(),
        (None, None) => console
            .prompt(ConsoleOptions::new(NEW_ENVIRONMENT_PROMPT).with_help(
                "A unique name for the environment, used to name its Azure resources",
            ))
            .await
            .context("no environment selected; run 'azd env new <name>' or pass --environment")?,
    };

    let env = match store.get(&name).await? {
        Some(env) => env,
        None => {
            let env = store
                .create(&name)
                .await
                .with_context(|| format!("creating environment '{name}'"))?;
            console.message(&format!("New environment '{name}' created"));
            env
        }
    };
    if default.is_none() {
        store.set_default(&name).await?;
    }
    Ok(env)
}
