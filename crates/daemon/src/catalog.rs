use std::collections::HashSet;

use anyhow::Context;
use signoff_core::api::ContributionToCheck;
use signoff_core::branch::pr_less_id;
use signoff_core::model::{Contribution, PrLessContribution, PullRequestContribution, Ticket};
use signoff_core::ticket::TicketPattern;

use crate::collab::ServerHandle;
use crate::resolver::BranchResolver;

/// Enumerates contributions of one server worth checking.
pub struct ContributionCatalog<'a> {
    server: &'a ServerHandle,
}

impl<'a> ContributionCatalog<'a> {
    pub fn new(server: &'a ServerHandle) -> Self {
        Self { server }
    }

    /// Open pull requests followed by active tickets without a pull request.
    ///
    /// Pull requests, tickets and branches are each fetched once per call.
    pub async fn list(&self) -> anyhow::Result<Vec<ContributionToCheck>> {
        let srv = self.server;
        let prs = srv
            .source
            .pull_requests()
            .await
            .context("list pull requests")?;
        let tickets = srv.tracker.tickets().await.context("list tickets")?;
        let branches: HashSet<String> = srv
            .source
            .branches()
            .await
            .context("list branches")?
            .into_iter()
            .collect();

        let pattern = TicketPattern::new(&srv.tracker.config().project_code);
        let resolver = BranchResolver::new(srv.source.as_ref());
        let default_bt = srv.settings.default_build_type.as_deref();

        let mut out = Vec::with_capacity(prs.len());
        let mut tickets_with_pr = HashSet::new();

        for pr in &prs {
            let ticket = pattern.ticket_for_pull_request(&tickets, pr);
            if let Some(t) = ticket {
                tickets_with_pr.insert(t.key.clone());
            }

            let tc_branch_name = match default_bt {
                Some(bt) => match resolver.find_builds(srv.ci.as_ref(), bt, pr.number).await {
                    Ok(lookup) => lookup.builds.first().map(|b| b.branch_name.clone()),
                    Err(e) => {
                        tracing::warn!(server = %srv.server_id, pr = pr.number, error = %e, "build lookup failed");
                        None
                    }
                },
                None => None,
            };

            out.push(ContributionToCheck {
                contribution: Contribution::PullRequest(PullRequestContribution::from(pr)),
                jira_issue_id: ticket.map(|t| t.key.clone()),
                jira_status_name: ticket.map(|t| t.status.clone()),
                jira_issue_url: ticket
                    .filter(|_| !srv.tracker.config().url.is_empty())
                    .map(|t| srv.tracker.ticket_url(&t.key)),
                tc_branch_name,
            });
        }

        for ticket in tickets
            .iter()
            .filter(|t| t.is_active_contribution() && !tickets_with_pr.contains(&t.key))
        {
            if let Some(c) = self.pr_less(ticket, &pattern, &branches, default_bt).await {
                out.push(c);
            }
        }

        Ok(out)
    }

    async fn pr_less(
        &self,
        ticket: &Ticket,
        pattern: &TicketPattern,
        branches: &HashSet<String>,
        default_bt: Option<&str>,
    ) -> Option<ContributionToCheck> {
        let srv = self.server;
        let prefix = &srv.source.config().branch_prefix;
        let branch = pattern.pr_less_branch(ticket, prefix)?;

        if !branches.contains(&branch) && !self.has_builds(default_bt, &branch).await {
            return None;
        }

        let pr_number = match pr_less_id(&branch, prefix) {
            Some(Ok(id)) => Some(id),
            Some(Err(e)) => {
                tracing::error!(branch = %branch, error = %e, "PR-less contribution has invalid branch name");
                None
            }
            None => None,
        };

        Some(ContributionToCheck {
            contribution: Contribution::PrLess(PrLessContribution {
                pr_number,
                ticket_key: ticket.key.clone(),
                ticket_status: ticket.status.clone(),
                pr_title: ticket.summary.clone(),
            }),
            jira_issue_id: Some(ticket.key.clone()),
            jira_status_name: Some(ticket.status.clone()),
            jira_issue_url: Some(srv.tracker.ticket_url(&ticket.key)),
            tc_branch_name: Some(branch),
        })
    }

    async fn has_builds(&self, build_type: Option<&str>, branch: &str) -> bool {
        let Some(bt) = build_type else {
            return false;
        };
        match self.server.ci.list_builds(bt, branch).await {
            Ok(builds) => !builds.is_empty(),
            Err(e) => {
                tracing::warn!(branch = %branch, error = %e, "build history lookup failed");
                false
            }
        }
    }
}
