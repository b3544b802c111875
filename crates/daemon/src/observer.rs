//! Background wait for triggered builds.

use std::sync::Arc;
use std::time::Duration;

use signoff_core::model::{BuildId, BuildState, ContributionKey, Visa};
use uuid::Uuid;

use crate::collab::{ServerHandle, VisaHistoryStore};
use crate::observation::ObservationRegistry;
use crate::visa::notify_jira;

/// Visa status when every observed build was cancelled on the CI server.
pub const BUILDS_CANCELLED: &str = "JIRA wasn't commented - builds were cancelled.";

/// One registered observation handed to [`run`].
pub(crate) struct Observation {
    pub id: Uuid,
    pub key: ContributionKey,
    pub request_id: String,
    pub server: ServerHandle,
    /// Build type the visa is issued for.
    pub build_type: String,
    pub ticket: String,
    pub build_ids: Vec<BuildId>,
}

enum Progress {
    Waiting,
    AllCancelled,
    Finished,
}

/// Polls the observed builds until they finish, then comments the ticket.
///
/// Stops without commenting once the observation is no longer the active one
/// for its key.
pub(crate) async fn run(
    observations: Arc<ObservationRegistry>,
    history: Arc<dyn VisaHistoryStore>,
    poll_interval: Duration,
    obs: Observation,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if !observations.is_active(&obs.key, obs.id) {
            tracing::info!(key = %obs.key, "observation stopped");
            if let Err(e) = history.complete(&obs.request_id, None).await {
                tracing::debug!(request = %obs.request_id, error = %e, "visa request not closed");
            }
            return;
        }

        let visa = match poll(&obs).await {
            Ok(Progress::Waiting) => continue,
            Ok(Progress::AllCancelled) => Visa::failed(BUILDS_CANCELLED),
            Ok(Progress::Finished) => {
                if !observations.is_active(&obs.key, obs.id) {
                    continue;
                }
                notify_jira(&obs.server, &obs.build_type, &obs.key.branch, &obs.ticket).await
            }
            Err(e) => {
                tracing::warn!(key = %obs.key, error = %e, "build poll failed");
                continue;
            }
        };

        if let Err(e) = history.complete(&obs.request_id, Some(visa.clone())).await {
            tracing::error!(request = %obs.request_id, error = %e, "visa not recorded");
        }
        observations.end(&obs.key, obs.id, &visa);
        return;
    }
}

async fn poll(obs: &Observation) -> anyhow::Result<Progress> {
    let mut cancelled = 0;
    for &id in &obs.build_ids {
        match obs.server.ci.build_detail(id).await?.state {
            BuildState::Cancelled => cancelled += 1,
            BuildState::Finished => {}
            BuildState::Queued | BuildState::Running => return Ok(Progress::Waiting),
        }
    }
    if cancelled > 0 && cancelled == obs.build_ids.len() {
        Ok(Progress::AllCancelled)
    } else {
        Ok(Progress::Finished)
    }
}
