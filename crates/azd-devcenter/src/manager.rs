use std::collections::HashMap;
use std::sync::Arc;

use azd_azure::{
    DeploymentExtended, DeploymentService, DeploymentTarget, DevCenter, DevCenterClient, DevCenterEnvironment,
    Project, ResourceGroupId, Scope,
};
use azd_domain::keys::{AZURE_RESOURCE_GROUP, AZURE_SUBSCRIPTION_ID};
use azd_domain::{OutputParameter, ParameterType};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{DevCenterError, ResultExt};

// Tags ADE puts on the ARM deployments it runs for an environment.
pub const TAG_DEV_CENTER_NAME: &str = "AdeDevCenterName";
pub const TAG_PROJECT_NAME: &str = "AdeProjectName";
pub const TAG_ENVIRONMENT_TYPE: &str = "AdeEnvironmentTypeName";
pub const TAG_ENVIRONMENT_NAME: &str = "AdeEnvironmentName";

/// Extra condition a deployment must meet to be picked.
pub type DeploymentFilter<'a> = &'a (dyn Fn(&DeploymentExtended) -> bool + Send + Sync);

/// Queries across dev centers and the ARM deployments behind ADE environments.
pub struct DevCenterManager {
    client: Arc<dyn DevCenterClient>,
    deployments: Arc<dyn DeploymentService>,
}

impl DevCenterManager {
    pub fn new(client: Arc<dyn DevCenterClient>, deployments: Arc<dyn DeploymentService>) -> Self {
        Self { client, deployments }
    }

    pub fn client(&self) -> &Arc<dyn DevCenterClient> {
        &self.client
    }

    /// Projects in which the caller may create environments.
    ///
    /// Dev centers are listed concurrently, then each dev center's projects,
    /// then each project's permissions. Failing to list a dev center's
    /// projects does not stop the others; every such failure is returned
    /// together once all lookups are done. A failed permission check counts
    /// as no access.
    pub async fn writable_projects(&self) -> Result<Vec<Project>, DevCenterError> {
        let dev_centers = self.client.dev_centers().await.context("failed getting dev centers")?;

        let (project_tx, mut project_rx) = mpsc::unbounded_channel::<Project>();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<DevCenterError>();

        for dev_center in dev_centers {
            let client = self.client.clone();
            let project_tx = project_tx.clone();
            let error_tx = error_tx.clone();
            tokio::spawn(async move {
                let projects = match client.projects(&dev_center).await {
                    Ok(projects) => projects,
                    Err(e) => {
                        let _ = error_tx.send(DevCenterError::from(e).context(format!(
                            "failed listing projects of dev center '{}'",
                            dev_center.name
                        )));
                        return;
                    }
                };

                for project in projects {
                    let client = client.clone();
                    let project_tx = project_tx.clone();
                    tokio::spawn(async move {
                        match client.has_write_access(&project).await {
                            Ok(true) => {
                                let _ = project_tx.send(project);
                            }
                            Ok(false) => debug!(project = %project.name, "no write access"),
                            Err(e) => warn!(project = %project.name, error = %e, "permission check failed"),
                        }
                    });
                }
            });
        }
        // Each channel closes once the last spawned lookup drops its sender.
        drop(project_tx);
        drop(error_tx);

        let collect_projects = async {
            let mut projects = Vec::new();
            while let Some(project) = project_rx.recv().await {
                projects.push(project);
            }
            projects
        };
        let collect_errors = async {
            let mut errors = Vec::new();
            while let Some(err) = error_rx.recv().await {
                errors.push(err);
            }
            errors
        };
        let (projects, errors) = tokio::join!(collect_projects, collect_errors);

        if !errors.is_empty() {
            return Err(DevCenterError::Aggregate(errors));
        }
        Ok(projects)
    }

    /// [`writable_projects`](Self::writable_projects) narrowed by dev center
    /// and by project.
    pub async fn writable_projects_with_filter(
        &self,
        dev_center_filter: impl Fn(&DevCenter) -> bool,
        project_filter: impl Fn(&Project) -> bool,
    ) -> Result<Vec<Project>, DevCenterError> {
        Ok(self
            .writable_projects()
            .await?
            .into_iter()
            .filter(|p| dev_center_filter(&p.dev_center) && project_filter(p))
            .collect())
    }

    /// The resource-group scope of the latest deployment for `env`.
    pub async fn deployment_scope(
        &self,
        config: &Config,
        env: &DevCenterEnvironment,
        filter: Option<DeploymentFilter<'_>>,
    ) -> Result<Scope, DevCenterError> {
        let group = ResourceGroupId::parse(&env.resource_group_id).context("failed parsing resource group id")?;
        let latest = self
            .latest_arm_deployment(config, env, filter)
            .await
            .context("failed getting latest deployment")?;
        Ok(Scope::resource_group(self.deployments.clone(), group.subscription_id, group.name, latest.name))
    }

    /// The newest ARM deployment in the environment's resource group that
    /// belongs to `env` and passes `filter`.
    ///
    /// Deployments tagged with the environment's dev center, project, type
    /// and name are preferred. Untagged deployments named after today's UTC
    /// date are considered only when no tagged one qualifies.
    pub async fn latest_arm_deployment(
        &self,
        config: &Config,
        env: &DevCenterEnvironment,
        filter: Option<DeploymentFilter<'_>>,
    ) -> Result<DeploymentExtended, DevCenterError> {
        let group = ResourceGroupId::parse(&env.resource_group_id).context("failed parsing resource group id")?;
        let target = DeploymentTarget::ResourceGroup {
            subscription_id: group.subscription_id,
            resource_group: group.name,
        };
        let mut deployments = self.deployments.list(&target).await.context("failed listing deployments")?;
        // Newest first; deployments without a timestamp sort last.
        deployments.sort_by(|a, b| b.properties.timestamp.cmp(&a.properties.timestamp));

        let accepted = |d: &DeploymentExtended| filter.map_or(true, |f| f(d));
        let today = format!("{}-", Utc::now().format("%Y-%m-%d"));

        deployments
            .iter()
            .find(|d| is_tagged_for(d, config, env) && accepted(d))
            .or_else(|| {
                deployments
                    .iter()
                    .find(|d| !is_tagged_for(d, config, env) && d.name.starts_with(&today) && accepted(d))
            })
            .cloned()
            .ok_or_else(|| DevCenterError::NotFound("failed to find latest deployment".into()))
    }

    /// Outputs of the environment's latest successful deployment, with
    /// `AZURE_SUBSCRIPTION_ID` and `AZURE_RESOURCE_GROUP` filled in from the
    /// resource group when the template does not output them.
    pub async fn outputs(
        &self,
        config: &Config,
        env: &DevCenterEnvironment,
    ) -> Result<HashMap<String, OutputParameter>, DevCenterError> {
        let group = ResourceGroupId::parse(&env.resource_group_id).context("failed parsing resource group id")?;
        let succeeded = |d: &DeploymentExtended| d.properties.provisioning_state == "Succeeded";
        let latest = self
            .latest_arm_deployment(config, env, Some(&succeeded))
            .await
            .context("failed getting latest deployment")?;

        let mut outputs = HashMap::new();
        for (key, output) in latest.outputs() {
            let param_type = ParameterType::from_arm_type(&output.output_type)?;
            outputs.insert(key.to_uppercase(), OutputParameter::new(param_type, output.value));
        }

        outputs
            .entry(AZURE_SUBSCRIPTION_ID.to_string())
            .or_insert_with(|| OutputParameter::new(ParameterType::String, Value::String(group.subscription_id)));
        outputs
            .entry(AZURE_RESOURCE_GROUP.to_string())
            .or_insert_with(|| OutputParameter::new(ParameterType::String, Value::String(group.name)));
        Ok(outputs)
    }
}

fn is_tagged_for(deployment: &DeploymentExtended, config: &Config, env: &DevCenterEnvironment) -> bool {
    deployment.tag(TAG_DEV_CENTER_NAME) == Some(config.name.as_str())
        && deployment.tag(TAG_PROJECT_NAME) == Some(config.project.as_str())
        && deployment.tag(TAG_ENVIRONMENT_TYPE) == Some(config.environment_type.as_str())
        && deployment.tag(TAG_ENVIRONMENT_NAME) == Some(env.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{deployment, FakeDevCenter, ListedDeployments, RESOURCE_GROUP_ID};
    use azd_azure::AzureError;
    use chrono::Duration;
    use serde_json::json;

    fn config() -> Config {
        Config {
            name: "dc1".into(),
            project: "p1".into(),
            environment_type: "Dev".into(),
            environment_definition: "web".into(),
            catalog: "cat".into(),
            user: "me".into(),
        }
    }

    fn environment() -> DevCenterEnvironment {
        DevCenterEnvironment {
            name: "dev".into(),
            resource_group_id: RESOURCE_GROUP_ID.into(),
            ..Default::default()
        }
    }

    fn tags(env_name: &str) -> HashMap<String, String> {
        HashMap::from([
            (TAG_DEV_CENTER_NAME.to_string(), "dc1".to_string()),
            (TAG_PROJECT_NAME.to_string(), "p1".to_string()),
            (TAG_ENVIRONMENT_TYPE.to_string(), "Dev".to_string()),
            (TAG_ENVIRONMENT_NAME.to_string(), env_name.to_string()),
        ])
    }

    fn manager(client: FakeDevCenter, deployments: Vec<DeploymentExtended>) -> DevCenterManager {
        DevCenterManager::new(Arc::new(client), Arc::new(ListedDeployments::new(deployments)))
    }

    #[tokio::test]
    async fn writable_projects_skip_projects_without_access() {
        let client = FakeDevCenter::new()
            .with_project("dc1", "p1", true)
            .with_project("dc1", "p2", false)
            .with_project("dc2", "p3", true)
            .with_project("dc2", "p4", false);
        let manager = manager(client, Vec::new());

        let mut names: Vec<String> = manager.writable_projects().await.unwrap().into_iter().map(|p| p.name).collect();
        names.sort();
        assert_eq!(names, vec!["p1", "p3"]);
    }

    #[tokio::test]
    async fn failed_permission_check_does_not_hide_other_projects() {
        let client = FakeDevCenter::new()
            .with_project("dc1", "p1", true)
            .with_project("dc1", "p2", true)
            .failing_permission_check("p2");
        let manager = manager(client, Vec::new());

        let projects = manager.writable_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "p1");
    }

    #[tokio::test]
    async fn project_listing_failures_are_aggregated() {
        let client = FakeDevCenter::new()
            .with_project("dc1", "p1", true)
            .with_project("dc2", "p2", true)
            .with_project("dc3", "p3", true)
            .failing_projects("dc1")
            .failing_projects("dc3");
        let manager = manager(client, Vec::new());

        match manager.writable_projects().await {
            Err(DevCenterError::Aggregate(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().all(|e| matches!(e.root(), DevCenterError::Azure(AzureError::Http(_)))));
            }
            other => panic!("expected aggregate error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn filters_narrow_writable_projects() {
        let client = FakeDevCenter::new()
            .with_project("dc1", "p1", true)
            .with_project("dc1", "p2", true)
            .with_project("dc2", "p3", true);
        let manager = manager(client, Vec::new());

        let projects = manager
            .writable_projects_with_filter(|dc| dc.name == "dc1", |p| p.name != "p2")
            .await
            .unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "p1");
    }

    #[tokio::test]
    async fn tagged_deployment_is_preferred_over_newer_dated_one() {
        let now = Utc::now();
        let dated = format!("{}-1234", now.format("%Y-%m-%d"));
        let deployments = vec![
            deployment(&dated, "Running", now, HashMap::new()),
            deployment("ade-run", "Succeeded", now - Duration::minutes(10), tags("dev")),
            deployment("other-env", "Succeeded", now - Duration::minutes(5), tags("prod")),
        ];
        let manager = manager(FakeDevCenter::new(), deployments);

        let latest = manager.latest_arm_deployment(&config(), &environment(), None).await.unwrap();
        assert_eq!(latest.name, "ade-run");
    }

    #[tokio::test]
    async fn dated_deployment_is_the_fallback() {
        let now = Utc::now();
        let dated = format!("{}-1234", now.format("%Y-%m-%d"));
        let started = now - Duration::minutes(1);
        let deployments = vec![
            deployment("2001-01-01-old", "Running", now, HashMap::new()),
            deployment(&dated, "Running", now, HashMap::new()),
            deployment("other-env", "Running", now, tags("prod")),
        ];
        let manager = manager(FakeDevCenter::new(), deployments);

        let running_since = |d: &DeploymentExtended| {
            d.properties.provisioning_state == "Running" && d.properties.timestamp.is_some_and(|t| t > started)
        };
        let latest = manager
            .latest_arm_deployment(&config(), &environment(), Some(&running_since))
            .await
            .unwrap();
        assert_eq!(latest.name, dated);

        let none = |_: &DeploymentExtended| false;
        let err = manager
            .latest_arm_deployment(&config(), &environment(), Some(&none))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to find latest deployment");
    }

    #[tokio::test]
    async fn outputs_come_from_latest_successful_deployment() {
        let now = Utc::now();
        let mut succeeded = deployment("ade-ok", "Succeeded", now - Duration::minutes(10), tags("dev"));
        succeeded.properties.outputs = Some(HashMap::from([
            ("webUri".to_string(), azd_azure::DeploymentOutput { output_type: "String".into(), value: json!("https://web") }),
            ("azurE_RESOURCE_GROUP".to_string(), azd_azure::DeploymentOutput { output_type: "String".into(), value: json!("rg-custom") }),
        ]));
        let failed = deployment("ade-failed", "Failed", now, tags("dev"));
        let manager = manager(FakeDevCenter::new(), vec![failed, succeeded]);

        let outputs = manager.outputs(&config(), &environment()).await.unwrap();
        assert_eq!(outputs["WEBURI"].value, json!("https://web"));
        assert_eq!(outputs[AZURE_RESOURCE_GROUP].value, json!("rg-custom"));
        assert_eq!(outputs[AZURE_SUBSCRIPTION_ID].value, json!("sub-1"));
        assert_eq!(outputs.len(), 3);
    }

    #[tokio::test]
    async fn unparseable_resource_group_is_an_error() {
        let manager = manager(FakeDevCenter::new(), Vec::new());
        let env = DevCenterEnvironment { name: "dev".into(), resource_group_id: "nope".into(), ..Default::default() };
        let err = manager.outputs(&config(), &env).await.unwrap_err();
        assert!(err.to_string().starts_with("failed parsing resource group id"), "{}", err);
    }
}
