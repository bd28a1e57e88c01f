use std::collections::HashSet;
use std::time::Duration;

use azd_async::TaskContext;
use azd_azure::{resource_types, AzureError, Scope};
use azd_domain::Progress;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reports resources of a running deployment as they finish.
///
/// Runs until `cancel` fires. Listing failures are logged and the next tick
/// tries again; they never fail the deployment.
pub struct DeploymentProgress {
    scope: Scope,
    ctx: TaskContext<Progress>,
    reported: HashSet<String>,
}

impl DeploymentProgress {
    pub fn new(scope: Scope, ctx: TaskContext<Progress>) -> Self {
        Self { scope, ctx, reported: HashSet::new() }
    }

    pub async fn run(mut self, cancel: CancellationToken, initial_delay: Duration, interval: Duration) {
        let mut delay = initial_delay;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("deployment progress reporting stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if let Err(e) = self.report().await {
                warn!(error = %e, "error while reporting progress");
            }
            delay = interval;
        }
    }

    async fn report(&mut self) -> Result<(), AzureError> {
        let mut operations = self.scope.operations().await?;
        operations.sort_by_key(|op| op.properties.timestamp);

        for op in operations {
            let props = op.properties;
            if !props.provisioning_operation.eq_ignore_ascii_case("Create")
                || !props.provisioning_state.eq_ignore_ascii_case("Succeeded")
            {
                continue;
            }
            let Some(target) = props.target_resource else { continue };
            let Some(display) = resource_types::display_name(&target.resource_type) else { continue };
            if !self.reported.insert(target.id.clone()) {
                continue;
            }
            self.ctx.set_progress(Progress::new(format!(
                "Creating/Updating {}: {}",
                display, target.resource_name
            )));
        }
        Ok(())
    }
}

/// Whether the background reporter is switched off for this process.
pub fn progress_disabled() -> bool {
    std::env::var(azd_domain::keys::PROVISION_PROGRESS_DISABLE)
        .ok()
        .and_then(|v| azd_domain::parse_bool(&v))
        .unwrap_or(false)
}
