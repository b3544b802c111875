use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use signoff_core::api::{
    CancelResponse, ContributionToCheck, CurrentVisaStatus, SimpleResult, TriggerRequest,
    VisaCommentRequest, VisaStatus,
};
use signoff_core::format_timestamp;
use signoff_core::model::{
    BuildState, ContributionCheckStatus, Credentials, MuteInfo, Ticket, VisaRequest,
};

use crate::aggregate::BuildStatusAggregator;
use crate::catalog::ContributionCatalog;
use crate::collab::{ServerHandle, ServerRegistry, VisaHistoryStore};
use crate::observation::ObservationRegistry;
use crate::resolver::BranchResolver;
use crate::visa::VisaIssuer;

pub const FINISHED_STATUS: &str = "finished";
pub const RUNNING_STATUS: &str = "running";
pub const CANCELLED_STATUS: &str = "cancelled";
pub const WAITING_RESULTS_STATUS: &str = "waiting results";

/// Operations exposed to the HTTP layer.
pub struct SignOffService {
    registry: Arc<dyn ServerRegistry>,
    observations: Arc<ObservationRegistry>,
    history: Arc<dyn VisaHistoryStore>,
    visas: VisaIssuer,
}

impl SignOffService {
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        history: Arc<dyn VisaHistoryStore>,
        poll_interval: Duration,
    ) -> Self {
        let observations = Arc::new(ObservationRegistry::new());
        let visas = VisaIssuer::new(
            Arc::clone(&registry),
            Arc::clone(&observations),
            Arc::clone(&history),
            poll_interval,
        );
        Self {
            registry,
            observations,
            history,
            visas,
        }
    }

    pub fn observations(&self) -> &ObservationRegistry {
        &self.observations
    }

    /// Visa history of a server with the current state of each request's builds.
    pub async fn list_visa_statuses(
        &self,
        server_id: &str,
        creds: &Credentials,
    ) -> anyhow::Result<Vec<VisaStatus>> {
        let srv = self.registry.lookup(server_id, creds)?;
        let requests = self.history.all().await.context("list visa requests")?;

        let mut build_type_names: HashMap<String, String> = HashMap::new();
        let mut out = Vec::new();

        for req in requests.iter().filter(|r| r.server_id == server_id) {
            if !build_type_names.contains_key(&req.build_type_id) {
                let name = match srv.ci.build_type(&req.build_type_id).await {
                    Ok(Some(bt)) => bt.name,
                    Ok(None) => req.build_type_id.clone(),
                    Err(e) => {
                        tracing::warn!(build_type = %req.build_type_id, error = %e, "build type lookup failed");
                        req.build_type_id.clone()
                    }
                };
                build_type_names.insert(req.build_type_id.clone(), name);
            }

            let mut status = VisaStatus {
                date: format_timestamp(req.requested_at_ms),
                branch_name: req.branch.clone(),
                user_name: req.user_name.clone(),
                ticket: req.ticket.clone(),
                build_type_id: req.build_type_id.clone(),
                build_type_name: build_type_names
                    .get(&req.build_type_id)
                    .cloned()
                    .unwrap_or_default(),
                ..Default::default()
            };

            let state = match (builds_status(&srv, req).await, &req.result) {
                (FINISHED_STATUS, Some(visa)) if visa.is_success() => {
                    status.comment_url = visa
                        .comment
                        .as_ref()
                        .map(|c| srv.tracker.comment_url(&req.ticket, &c.id));
                    status.blockers = visa.blockers;
                    FINISHED_STATUS
                }
                (FINISHED_STATUS, _) if req.observing => WAITING_RESULTS_STATUS,
                (FINISHED_STATUS, _) => CANCELLED_STATUS,
                (RUNNING_STATUS, _) if req.observing => RUNNING_STATUS,
                (RUNNING_STATUS, _) => CANCELLED_STATUS,
                (other, _) => other,
            };
            status.status = state.to_string();

            if req.observing {
                status.cancel_url = cancel_url(server_id, &req.branch);
            }
            out.push(status);
        }

        Ok(out)
    }

    /// Mutes of a CI project, annotated with the status of the ticket they link.
    pub async fn list_mutes(
        &self,
        server_id: &str,
        project_id: &str,
        creds: &Credentials,
    ) -> anyhow::Result<Vec<MuteInfo>> {
        let srv = self.registry.lookup(server_id, creds)?;
        let mut mutes = srv.ci.mutes(project_id).await.context("list mutes")?;
        let tickets = srv.tracker.tickets().await.context("list tickets")?;
        let browse_url = srv.tracker.ticket_url("");

        for mute in &mut mutes {
            mute.ticket_status = muted_ticket_status(&mute.assignment.text, &browse_url, &tickets);
            mute.assignment.mute_date = Some(format_timestamp(mute.assignment.timestamp_ms));
        }
        Ok(mutes)
    }

    pub async fn trigger_and_observe(
        &self,
        creds: &Credentials,
        req: &TriggerRequest,
    ) -> anyhow::Result<SimpleResult> {
        self.visas.trigger_and_observe(creds, req).await
    }

    pub async fn notify_jira_and_record(
        &self,
        creds: &Credentials,
        req: &VisaCommentRequest,
    ) -> anyhow::Result<SimpleResult> {
        self.visas.notify_jira_and_record(creds, req).await
    }

    pub fn cancel_observation(&self, server_id: &str, branch: &str) -> CancelResponse {
        self.visas.cancel(server_id, branch)
    }

    pub async fn current_visa_status(
        &self,
        server_id: &str,
        creds: &Credentials,
        build_type: &str,
        branch: &str,
    ) -> anyhow::Result<CurrentVisaStatus> {
        self.visas
            .current_visa_status(creds, server_id, build_type, branch)
            .await
    }

    pub async fn list_contributions(
        &self,
        server_id: &str,
        creds: &Credentials,
    ) -> anyhow::Result<Vec<ContributionToCheck>> {
        let srv = self.registry.lookup(server_id, creds)?;
        ContributionCatalog::new(&srv).list().await
    }

    /// CI state of a contribution for every applicable build type.
    pub async fn contribution_statuses(
        &self,
        server_id: &str,
        creds: &Credentials,
        contribution_id: i64,
    ) -> anyhow::Result<Vec<ContributionCheckStatus>> {
        let srv = self.registry.lookup(server_id, creds)?;
        let resolver = BranchResolver::new(srv.source.as_ref());
        let aggregator =
            BuildStatusAggregator::new(&srv.server_id, srv.ci.as_ref(), &self.observations);

        let mut out: Vec<ContributionCheckStatus> = Vec::new();
        for bt in applicable_build_types(&srv).await? {
            let lookup = resolver
                .find_builds(srv.ci.as_ref(), &bt, contribution_id)
                .await?;
            let status = aggregator
                .classify(&bt, &lookup.builds, &lookup.default_branch)
                .await?;
            if !out.contains(&status) {
                out.push(status);
            }
        }
        Ok(out)
    }
}

/// Build types a contribution is checked against: the composite build types of
/// the default build type's project, or the default build type alone when the
/// CI server does not know it.
pub async fn applicable_build_types(srv: &ServerHandle) -> anyhow::Result<Vec<String>> {
    let Some(default_bt) = srv.settings.default_build_type.as_deref() else {
        return Ok(Vec::new());
    };
    match srv.ci.build_type(default_bt).await? {
        Some(bt) => srv.ci.composite_build_types(&bt.project_id).await,
        None => Ok(vec![default_bt.to_string()]),
    }
}

/// `cancelled` if any build was cancelled, `finished` if all finished, else
/// `running`. Builds that cannot be looked up are skipped.
async fn builds_status(srv: &ServerHandle, req: &VisaRequest) -> &'static str {
    let mut all_finished = true;
    for &id in &req.build_ids {
        match srv.ci.build_detail(id).await {
            Ok(b) => match b.state {
                BuildState::Cancelled => return CANCELLED_STATUS,
                BuildState::Finished => {}
                BuildState::Queued | BuildState::Running => all_finished = false,
            },
            Err(e) => tracing::warn!(build = id, error = %e, "build lookup failed"),
        }
    }
    if all_finished {
        FINISHED_STATUS
    } else {
        RUNNING_STATUS
    }
}

fn cancel_url(server_id: &str, branch: &str) -> Option<String> {
    let mut url = reqwest::Url::parse("http://localhost/v1/visa/cancel").ok()?;
    url.query_pairs_mut()
        .append_pair("server_id", server_id)
        .append_pair("branch", branch);
    Some(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

/// Status of the ticket whose browse link appears in a mute's text.
fn muted_ticket_status(text: &str, browse_url: &str, tickets: &[Ticket]) -> Option<String> {
    if text.is_empty() || browse_url.is_empty() {
        return None;
    }
    let pos = text.find(browse_url)?;
    let key: String = text[pos + browse_url.len()..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    tickets
        .iter()
        .find(|t| t.key == key)
        .map(|t| t.status.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(key: &str, status: &str) -> Ticket {
        Ticket {
            key: key.into(),
            status: status.into(),
            summary: String::new(),
        }
    }

    #[test]
    fn mute_text_links_ticket() {
        let tickets = vec![ticket("IGNITE-1", "Open"), ticket("IGNITE-12", "Resolved")];
        let browse = "https://issues.apache.org/jira/browse/";
        assert_eq!(
            muted_ticket_status(
                "flaky, see https://issues.apache.org/jira/browse/IGNITE-12 for details",
                browse,
                &tickets
            )
            .as_deref(),
            Some("Resolved")
        );
        assert_eq!(muted_ticket_status("no link", browse, &tickets), None);
        assert_eq!(muted_ticket_status("", browse, &tickets), None);
    }

    #[test]
    fn cancel_url_encodes_branch() {
        assert_eq!(
            cancel_url("apache", "pull/6224/head").as_deref(),
            Some("/v1/visa/cancel?server_id=apache&branch=pull%2F6224%2Fhead")
        );
    }
}
