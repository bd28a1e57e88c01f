use std::collections::BTreeMap;
use std::sync::Arc;

use azd_async::{TaskContext, TaskError};
use azd_azure::{resource_types, AzureResource, ResourceService};
use azd_domain::keys::ENV_NAME_TAG;
use azd_domain::{DestroyOptions, Progress};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::console::{Console, ConsoleOptions};
use crate::error::{ProvisionError, ResultExt};

type GroupedResources = BTreeMap<String, Vec<AzureResource>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PurgeKind {
    KeyVault,
    AppConfiguration,
    ApiManagement,
}

impl PurgeKind {
    /// Plural used in the purge prompt.
    fn plural(self) -> &'static str {
        match self {
            PurgeKind::KeyVault => "Key Vaults",
            PurgeKind::AppConfiguration => "App Configurations",
            PurgeKind::ApiManagement => "API Managements",
        }
    }

    /// Singular used in per-item progress and messages.
    fn label(self) -> &'static str {
        match self {
            PurgeKind::KeyVault => "key vault",
            PurgeKind::AppConfiguration => "app configuration",
            PurgeKind::ApiManagement => "api management service",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PurgeCandidate {
    name: String,
    location: String,
}

#[derive(Debug)]
struct PurgeGroup {
    kind: PurgeKind,
    candidates: Vec<PurgeCandidate>,
}

/// Deletes the resource groups of one environment and purges the
/// soft-deleted resources they leave behind.
///
/// Group deletion is committed before the purge question is asked; declining
/// the purge leaves the groups deleted and the soft-deleted resources
/// recoverable.
pub(crate) struct ResourceGroupDestroyer<'a> {
    pub ctx: &'a TaskContext<Progress>,
    pub console: &'a dyn Console,
    pub resources: Arc<dyn ResourceService>,
    pub subscription_id: String,
    pub env_name: String,
    pub options: DestroyOptions,
}

impl ResourceGroupDestroyer<'_> {
    /// Returns every resource that lived in the deleted groups.
    pub async fn run(&self) -> Result<Vec<AzureResource>, ProvisionError> {
        self.progress("Fetching resource groups");
        let groups = self
            .resources
            .list_resource_groups(&self.subscription_id, ENV_NAME_TAG, &self.env_name)
            .await
            .context("getting resource groups")?;

        self.progress("Fetching resources");
        let grouped = self.list_all_resources(groups).await.context("getting resources to delete")?;
        let all: Vec<AzureResource> = grouped.values().flatten().cloned().collect();
        debug!(groups = grouped.len(), resources = all.len(), "resources to delete");

        self.progress("Getting Key Vaults to purge");
        let key_vaults = self.key_vaults_to_purge(&grouped).await.context("getting key vaults to purge")?;

        self.progress("Getting App Configurations to purge");
        let app_configs = self
            .app_configurations_to_purge(&grouped)
            .await
            .context("getting app configurations to purge")?;

        self.progress("Getting API Management Services to purge");
        let apims = self
            .api_managements_to_purge(&grouped)
            .await
            .context("getting API managements to purge")?;

        self.delete_resource_groups(&grouped, all.len())
            .await
            .context("destroying resource groups")?;

        let groups = vec![
            PurgeGroup { kind: PurgeKind::KeyVault, candidates: key_vaults },
            PurgeGroup { kind: PurgeKind::AppConfiguration, candidates: app_configs },
            PurgeGroup { kind: PurgeKind::ApiManagement, candidates: apims },
        ];
        self.purge(&groups).await.context("purging resources")?;

        Ok(all)
    }

    fn progress(&self, message: impl Into<String>) {
        self.ctx.set_progress(Progress::new(message));
    }

    /// One listing call per group, run concurrently.
    async fn list_all_resources(&self, groups: Vec<String>) -> Result<GroupedResources, ProvisionError> {
        let mut set = JoinSet::new();
        for group in groups {
            let resources = self.resources.clone();
            let subscription_id = self.subscription_id.clone();
            set.spawn(async move {
                let listed = resources.list_resource_group_resources(&subscription_id, &group).await;
                (group, listed)
            });
        }

        let mut grouped = GroupedResources::new();
        while let Some(joined) = set.join_next().await {
            let (group, listed) = joined.map_err(|e| TaskError::Panicked(e.to_string()))?;
            grouped.insert(group, listed?);
        }
        Ok(grouped)
    }

    fn resources_of_type<'g>(
        grouped: &'g GroupedResources,
        resource_type: &'g str,
    ) -> impl Iterator<Item = (&'g String, &'g AzureResource)> + 'g {
        grouped.iter().flat_map(move |(group, resources)| {
            resources
                .iter()
                .filter(move |r| r.resource_type.eq_ignore_ascii_case(resource_type))
                .map(move |r| (group, r))
        })
    }

    async fn key_vaults_to_purge(&self, grouped: &GroupedResources) -> Result<Vec<PurgeCandidate>, ProvisionError> {
        let mut candidates = Vec::new();
        for (group, resource) in Self::resources_of_type(grouped, resource_types::KEY_VAULT) {
            let vault = self
                .resources
                .get_key_vault(&self.subscription_id, group, &resource.name)
                .await
                .with_context(|| format!("listing key vault {} properties", resource.name))?;
            if vault.enable_soft_delete && !vault.enable_purge_protection {
                candidates.push(PurgeCandidate { name: vault.name, location: vault.location });
            } else {
                debug!(vault = %vault.name, "key vault cannot be purged, skipping");
            }
        }
        Ok(candidates)
    }

    async fn app_configurations_to_purge(
        &self,
        grouped: &GroupedResources,
    ) -> Result<Vec<PurgeCandidate>, ProvisionError> {
        let mut candidates = Vec::new();
        for (group, resource) in Self::resources_of_type(grouped, resource_types::APP_CONFIGURATION) {
            let store = self
                .resources
                .get_app_configuration(&self.subscription_id, group, &resource.name)
                .await
                .with_context(|| format!("listing app configuration {} properties", resource.name))?;
            if store.enable_soft_delete && !store.enable_purge_protection {
                candidates.push(PurgeCandidate { name: store.name, location: store.location });
            }
        }
        Ok(candidates)
    }

    async fn api_managements_to_purge(
        &self,
        grouped: &GroupedResources,
    ) -> Result<Vec<PurgeCandidate>, ProvisionError> {
        let mut candidates = Vec::new();
        for (group, resource) in Self::resources_of_type(grouped, resource_types::API_MANAGEMENT) {
            // Every API Management service is soft-deleted; there is no flag to check.
            let apim = self
                .resources
                .get_api_management(&self.subscription_id, group, &resource.name)
                .await
                .with_context(|| format!("listing api management service {} properties", resource.name))?;
            candidates.push(PurgeCandidate { name: apim.name, location: apim.location });
        }
        Ok(candidates)
    }

    async fn delete_resource_groups(
        &self,
        grouped: &GroupedResources,
        resource_count: usize,
    ) -> Result<(), ProvisionError> {
        if !self.options.force() && resource_count > 0 {
            self.ctx
                .interact(|| async {
                    let confirmed = self
                        .console
                        .confirm(
                            ConsoleOptions::new(format!(
                                "This will delete {} resources, are you sure you want to continue?",
                                resource_count
                            ))
                            .with_default(false),
                        )
                        .await
                        .context("prompting for delete confirmation")?;
                    if confirmed {
                        Ok(())
                    } else {
                        Err(ProvisionError::Declined("user denied delete confirmation".into()))
                    }
                })
                .await?;
        }

        for group in grouped.keys() {
            self.progress(format!("Deleting resource group {}", group));
            self.resources
                .delete_resource_group(&self.subscription_id, group)
                .await?;
            info!(resource_group = %group, "deleted resource group");
            self.console.message(&format!("Deleted resource group {}", group));
        }
        Ok(())
    }

    async fn purge(&self, groups: &[PurgeGroup]) -> Result<(), ProvisionError> {
        let pending: Vec<&PurgeGroup> = groups.iter().filter(|g| !g.candidates.is_empty()).collect();
        if pending.is_empty() {
            return Ok(());
        }

        if !self.options.purge() {
            let types = pending.iter().map(|g| g.kind.plural()).collect::<Vec<_>>().join("/");
            let mut warning = String::from("\n\nThis operation will delete:");
            for group in &pending {
                warning.push_str(&format!("\n    {} {}", group.candidates.len(), group.kind.plural()));
            }
            warning.push_str(&format!(
                "\nThese {} have soft delete enabled allowing them to be recovered for a period of time after \
                 deletion. During this period, their names may not be reused.\nYou can use argument --purge to \
                 skip this confirmation.\n",
                types
            ));
            self.console.message(&warning);

            self.ctx
                .interact(|| async {
                    let confirmed = self
                        .console
                        .confirm(
                            ConsoleOptions::new(format!(
                                "Would you like to permanently delete these {} instead, allowing their names to be reused?",
                                types
                            ))
                            .with_default(false),
                        )
                        .await
                        .with_context(|| format!("prompting for {} confirmation", types))?;
                    if confirmed {
                        Ok(())
                    } else {
                        Err(ProvisionError::Declined(format!("user denied {} confirmation", types)))
                    }
                })
                .await?;
        }

        for group in pending {
            self.purge_group(group)
                .await
                .with_context(|| format!("failed to purge {}", group.kind.plural()))?;
        }
        Ok(())
    }

    /// Stops at the first failure; later candidates are left alone.
    async fn purge_group(&self, group: &PurgeGroup) -> Result<(), ProvisionError> {
        let label = group.kind.label();
        for candidate in &group.candidates {
            self.progress(format!("Purging {} {}", label, candidate.name));
            let purged = match group.kind {
                PurgeKind::KeyVault => {
                    self.resources
                        .purge_key_vault(&self.subscription_id, &candidate.name, &candidate.location)
                        .await
                }
                PurgeKind::AppConfiguration => {
                    self.resources
                        .purge_app_configuration(&self.subscription_id, &candidate.name, &candidate.location)
                        .await
                }
                PurgeKind::ApiManagement => {
                    self.resources
                        .purge_api_management(&self.subscription_id, &candidate.name, &candidate.location)
                        .await
                }
            };
            purged.with_context(|| format!("purging {} {}", label, candidate.name))?;
            self.console.message(&format!("Purged {} {}", label, candidate.name));
        }
        Ok(())
    }
}
