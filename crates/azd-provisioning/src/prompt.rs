use std::sync::Arc;

use async_trait::async_trait;
use azd_azure::AccountService;
use azd_store::{EnvironmentStore, SharedEnvironment};
use tracing::debug;

use crate::console::{Console, ConsoleOptions};
use crate::error::{ProvisionError, ResultExt};

pub const SUBSCRIPTION_PROMPT: &str = "Select an Azure Subscription to use:";
pub const LOCATION_PROMPT: &str = "Select an Azure location to use:";

/// Asks the user to pick Azure coordinates.
#[async_trait]
pub trait Prompter: Send + Sync + 'static {
    async fn prompt_subscription(&self, message: &str) -> Result<String, ProvisionError>;

    async fn prompt_location(&self, subscription_id: &str, message: &str) -> Result<String, ProvisionError>;
}

/// [`Prompter`] that lists choices from the account service and asks through the console.
pub struct AccountPrompter {
    console: Arc<dyn Console>,
    accounts: Arc<dyn AccountService>,
}

impl AccountPrompter {
    pub fn new(console: Arc<dyn Console>, accounts: Arc<dyn AccountService>) -> Self {
        Self { console, accounts }
    }
}

#[async_trait]
impl Prompter for AccountPrompter {
    async fn prompt_subscription(&self, message: &str) -> Result<String, ProvisionError> {
        let mut subscriptions = self
            .accounts
            .subscriptions()
            .await
            .context("listing subscriptions")?;
        if subscriptions.is_empty() {
            return Err(ProvisionError::NotSupported(
                "no Azure subscriptions found for the signed-in account".into(),
            ));
        }
        subscriptions.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));

        let options = subscriptions
            .iter()
            .map(|s| format!("{} ({})", s.display_name, s.subscription_id))
            .collect();
        let index = self
            .console
            .select(ConsoleOptions::new(message).with_options(options))
            .await?;
        Ok(subscriptions[index].subscription_id.clone())
    }

    async fn prompt_location(&self, subscription_id: &str, message: &str) -> Result<String, ProvisionError> {
        let locations = self
            .accounts
            .locations(subscription_id)
            .await
            .context("listing locations")?;
        if locations.is_empty() {
            return Err(ProvisionError::NotSupported(format!(
                "no locations available for subscription {}",
                subscription_id
            )));
        }

        let options = locations
            .iter()
            .map(|l| format!("{} ({})", l.regional_display_name, l.name))
            .collect();
        let index = self
            .console
            .select(ConsoleOptions::new(message).with_options(options))
            .await?;
        Ok(locations[index].name.clone())
    }
}

/// Prompt for whichever of subscription and location the environment lacks,
/// saving after each answer. A fully configured environment is left alone.
pub async fn ensure_subscription_and_location(
    env: &SharedEnvironment,
    store: &dyn EnvironmentStore,
    prompter: &dyn Prompter,
) -> Result<(), ProvisionError> {
    let mut subscription_id = env.read().await.subscription_id();
    if subscription_id.is_empty() {
        subscription_id = prompter.prompt_subscription(SUBSCRIPTION_PROMPT).await?;
        let mut env = env.write().await;
        env.set_subscription_id(subscription_id.clone());
        store.save(&env).await.context("saving environment")?;
    }

    if env.read().await.location().is_empty() {
        let location = prompter.prompt_location(&subscription_id, LOCATION_PROMPT).await?;
        let mut env = env.write().await;
        env.set_location(location);
        store.save(&env).await.context("saving environment")?;
    }

    debug!(subscription_id = %subscription_id, "subscription and location configured");
    Ok(())
}
