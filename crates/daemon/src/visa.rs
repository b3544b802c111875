//! Sign-off workflow: trigger builds, observe them, comment the ticket.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use signoff_core::api::{
    CancelResponse, CurrentVisaStatus, SimpleResult, TriggerRequest, VisaCommentRequest,
};
use signoff_core::comment::{blocker_count, render_visa_comment};
use signoff_core::model::{BuildId, ContributionKey, Credentials, Visa, VisaRequest};
use signoff_core::ticket::TicketPattern;
use signoff_core::{new_ulid, now_ms};

use crate::aggregate::build_web_url;
use crate::collab::{ServerHandle, ServerRegistry, VisaHistoryStore};
use crate::observation::ObservationRegistry;
use crate::observer::{self, Observation};
use crate::resolver::BranchResolver;

/// Visa status when the build to analyse does not exist.
pub const NO_FINISHED_BUILDS: &str = "JIRA wasn't commented - no finished builds to analyze.";

/// Trigger outcome when observation was asked for but no suite was queued.
pub const NO_SUITES_TRIGGERED: &str =
    "No suites were triggered. JIRA ticket will not be notified.";

/// Lower bound of the observer's poll period; a zero period cannot tick.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Issues visas and owns the observation lifecycle.
#[derive(Clone)]
pub struct VisaIssuer {
    registry: Arc<dyn ServerRegistry>,
    observations: Arc<ObservationRegistry>,
    history: Arc<dyn VisaHistoryStore>,
    poll_interval: Duration,
}

impl VisaIssuer {
    /// `poll_interval` is clamped to [`MIN_POLL_INTERVAL`].
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        observations: Arc<ObservationRegistry>,
        history: Arc<dyn VisaHistoryStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            observations,
            history,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Triggers every requested suite and, when asked, starts observing them.
    ///
    /// Returns immediately; the wait and the ticket comment happen on a
    /// background task.
    pub async fn trigger_and_observe(
        &self,
        creds: &Credentials,
        req: &TriggerRequest,
    ) -> anyhow::Result<SimpleResult> {
        let srv = self.registry.lookup(&req.server_id, creds)?;
        let mut msg = String::new();

        if let Some(pr_num) = req.pr_num.as_deref().filter(|s| !s.trim().is_empty()) {
            match pr_num.trim().parse::<i64>() {
                Ok(n) => match srv.source.pull_request(n).await {
                    Ok(Some(pr)) => {
                        if let Some(sha) = pr.last_commit_sha_short() {
                            msg.push_str(&format!("Actual commit: {sha}. "));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(pr = n, error = %e, "pull request lookup failed"),
                },
                Err(e) => tracing::error!(pr_num = %pr_num, error = %e, "bad pull request number"),
            }
        }

        let mut build_ids = Vec::new();
        for suite in req.suite_id_list() {
            let id = srv
                .ci
                .trigger(&suite, &req.branch, req.top)
                .await
                .with_context(|| format!("trigger {suite} on {}", req.branch))?;
            tracing::info!(server = %srv.server_id, suite = %suite, branch = %req.branch, build = id, "build triggered");
            build_ids.push(id);
        }

        if req.observe {
            if build_ids.is_empty() {
                tracing::info!(branch = %req.branch, "nothing triggered, observation skipped");
                msg.push_str(NO_SUITES_TRIGGERED);
            } else {
                msg.push_str(&self.observe(&srv, creds, req, build_ids).await?);
            }
        }

        Ok(SimpleResult::new(msg))
    }

    async fn observe(
        &self,
        srv: &ServerHandle,
        creds: &Credentials,
        req: &TriggerRequest,
        build_ids: Vec<BuildId>,
    ) -> anyhow::Result<String> {
        let pattern = TicketPattern::new(&srv.tracker.config().project_code);
        let ticket = match BranchResolver::new(srv.source.as_ref())
            .resolve_ticket(&pattern, req.ticket_id.as_deref(), &req.branch)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::info!(branch = %req.branch, error = %e, "ticket not resolved");
                return Ok(format!(
                    "JIRA ticket will not be notified after the tests are completed - \
                     exception happened when server tried to get ticket ID from Pull Request [errMsg={e}]"
                ));
            }
        };

        let key = ContributionKey::new(srv.server_id.clone(), req.branch.clone());
        let Some(observation_id) = self.observations.begin(&key) else {
            return Ok(format!(
                "Builds of branch {} are already being observed. \
                 JIRA ticket {ticket} will not be notified for this trigger.",
                req.branch
            ));
        };

        let request = VisaRequest {
            request_id: new_ulid().to_string(),
            server_id: srv.server_id.clone(),
            branch: req.branch.clone(),
            user_name: creds.user_name.clone(),
            ticket: ticket.clone(),
            build_type_id: req.parent_suite_id.clone(),
            requested_at_ms: now_ms(),
            build_ids: build_ids.clone(),
            observing: true,
            result: None,
        };
        let request_id = request.request_id.clone();
        if let Err(e) = self.history.append(request).await {
            self.observations.rollback(&key, observation_id);
            return Err(anyhow::Error::from(e).context("record visa request"));
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(e) => {
                self.observations.rollback(&key, observation_id);
                if let Err(err) = self.history.complete(&request_id, None).await {
                    tracing::warn!(request = %request_id, error = %err, "rollback of visa request failed");
                }
                return Err(anyhow::anyhow!("observer could not be started: {e}"));
            }
        };
        runtime.spawn(observer::run(
            Arc::clone(&self.observations),
            Arc::clone(&self.history),
            self.poll_interval,
            Observation {
                id: observation_id,
                key,
                request_id,
                server: srv.clone(),
                build_type: req.parent_suite_id.clone(),
                ticket: ticket.clone(),
                build_ids,
            },
        ));

        Ok(format!(
            "JIRA ticket {ticket} will be notified after the tests are completed."
        ))
    }

    /// Comments a ticket with the last finished build and records the visa.
    pub async fn notify_jira_and_record(
        &self,
        creds: &Credentials,
        req: &VisaCommentRequest,
    ) -> anyhow::Result<SimpleResult> {
        let srv = self.registry.lookup(&req.server_id, creds)?;
        let pattern = TicketPattern::new(&srv.tracker.config().project_code);
        let ticket = match BranchResolver::new(srv.source.as_ref())
            .resolve_ticket(&pattern, req.ticket_id.as_deref(), &req.branch)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::info!(branch = %req.branch, error = %e, "ticket not resolved");
                return Ok(SimpleResult::new(format!("JIRA wasn't commented. {e}")));
            }
        };

        let key = ContributionKey::new(srv.server_id.clone(), req.branch.clone());
        if self
            .history
            .last(&key)
            .await
            .context("last visa request")?
            .is_some_and(|r| r.observing)
        {
            return Ok(SimpleResult::new(
                "JIRA wasn't commented. \"Re-run possible blockers & Comment JIRA\" was triggered \
                 for current branch. Wait for the end or cancel existing observing.",
            ));
        }

        let visa = notify_jira(&srv, &req.suite_id, &req.branch, &ticket).await;
        self.history
            .append(VisaRequest {
                request_id: new_ulid().to_string(),
                server_id: srv.server_id.clone(),
                branch: req.branch.clone(),
                user_name: creds.user_name.clone(),
                ticket,
                build_type_id: req.suite_id.clone(),
                requested_at_ms: now_ms(),
                build_ids: Vec::new(),
                observing: false,
                result: Some(visa.clone()),
            })
            .await
            .context("record visa")?;

        Ok(SimpleResult::new(visa.status))
    }

    /// Blockers of the most recent finished build.
    pub async fn current_visa_status(
        &self,
        creds: &Credentials,
        server_id: &str,
        build_type: &str,
        branch: &str,
    ) -> anyhow::Result<CurrentVisaStatus> {
        let srv = self.registry.lookup(server_id, creds)?;
        let ids = srv.ci.last_finished(build_type, branch, 1).await?;
        let Some(&build_id) = ids.first() else {
            return Ok(CurrentVisaStatus::default());
        };
        let blockers = srv
            .ci
            .blocker_suites(build_id)
            .await?
            .map(|suites| blocker_count(&suites))
            .unwrap_or(0);
        Ok(CurrentVisaStatus { blockers })
    }

    /// Flags the observation of a branch as cancelled.
    pub fn cancel(&self, server_id: &str, branch: &str) -> CancelResponse {
        let key = ContributionKey::new(server_id, branch);
        let cancelled = self.observations.cancel(&key);
        if cancelled {
            tracing::info!(key = %key, "observation cancelled");
        }
        CancelResponse { cancelled }
    }
}

/// Comments `ticket` with the possible blockers of the last finished build of
/// (`build_type`, `branch`).
///
/// Every failure is reported through the returned visa.
pub async fn notify_jira(srv: &ServerHandle, build_type: &str, branch: &str, ticket: &str) -> Visa {
    let build_id = match srv.ci.last_finished(build_type, branch, 1).await {
        Ok(ids) => match ids.first() {
            Some(&id) => id,
            None => return Visa::failed(NO_FINISHED_BUILDS),
        },
        Err(e) => return commenting_failed(None, &e),
    };

    match comment_build(srv, build_type, build_id, ticket).await {
        Ok(visa) => visa,
        Err(e) => commenting_failed(Some(build_id), &e),
    }
}

async fn comment_build(
    srv: &ServerHandle,
    build_type: &str,
    build_id: BuildId,
    ticket: &str,
) -> anyhow::Result<Visa> {
    let build = srv.ci.build_detail(build_id).await?;
    let web_url = build_web_url(srv.ci.host(), build.id, &build.build_type_id);

    let Some(suites) = srv.ci.blocker_suites(build_id).await? else {
        return Ok(Visa::failed(NO_FINISHED_BUILDS));
    };

    let suite_name = match srv.ci.build_type(build_type).await {
        Ok(Some(bt)) => bt.name,
        Ok(None) => build_type.to_string(),
        Err(e) => {
            tracing::warn!(build_type = %build_type, error = %e, "build type lookup failed");
            build_type.to_string()
        }
    };

    let text = render_visa_comment(&suites, &web_url, &suite_name);
    let blockers = blocker_count(&suites);
    let comment = srv.tracker.post_comment(ticket, &text).await?;
    tracing::info!(ticket = %ticket, build = build_id, blockers, "JIRA commented");

    Ok(Visa::commented(comment, blockers))
}

fn commenting_failed(build_id: Option<BuildId>, e: &anyhow::Error) -> Visa {
    let build = build_id.map_or_else(|| "unknown".to_string(), |id| id.to_string());
    let msg = format!("Exception happened during commenting JIRA ticket [build={build}, errMsg={e}]");
    tracing::error!("{msg}");
    Visa::failed(format!("JIRA wasn't commented - {msg}"))
}
