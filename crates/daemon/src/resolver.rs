//! Mapping of contribution ids to CI branches and tickets.

use signoff_core::branch::{
    pr_head_branch, pr_less_branch, pr_merge_branch, pr_number_from_branch,
};
use signoff_core::model::BuildReference;
use signoff_core::ticket::TicketPattern;

use crate::collab::{CiServer, SourceHost};

/// Ticket could not be determined for a branch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TicketNotFound(pub String);

/// Builds found for a contribution together with the candidate reported when
/// none exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildLookup {
    pub default_branch: String,
    /// Builds of the first candidate branch that has any, newest first.
    pub builds: Vec<BuildReference>,
}

/// Resolves CI branches for contributions of one source host.
pub struct BranchResolver<'a> {
    source: &'a dyn SourceHost,
}

impl<'a> BranchResolver<'a> {
    pub fn new(source: &'a dyn SourceHost) -> Self {
        Self { source }
    }

    /// Default CI branch of a contribution.
    ///
    /// PR-less ids map straight to `<prefix><-id>` without contacting the source
    /// host.
    pub async fn default_branch(&self, contribution_id: i64) -> String {
        let cfg = self.source.config();
        if let Some(branch) = pr_less_branch(&cfg.branch_prefix, contribution_id) {
            return branch;
        }
        if cfg.prefer_head_branches {
            if let Some(head) = self.head_ref(contribution_id).await {
                return head;
            }
        }
        pr_head_branch(contribution_id)
    }

    /// Head branch of a pull request. Lookup failures count as unknown.
    pub async fn head_ref(&self, pr_number: i64) -> Option<String> {
        match self.source.pull_request(pr_number).await {
            Ok(pr) => pr.and_then(|pr| pr.head.map(|h| h.ref_name)),
            Err(e) => {
                tracing::warn!(pr = pr_number, error = %e, "pull request lookup failed");
                None
            }
        }
    }

    /// Builds of `build_type` for a contribution, probing candidate branches in
    /// order and stopping at the first one with any build history.
    pub async fn find_builds(
        &self,
        ci: &dyn CiServer,
        build_type: &str,
        contribution_id: i64,
    ) -> anyhow::Result<BuildLookup> {
        let default_branch = self.default_branch(contribution_id).await;
        let builds = ci.list_builds(build_type, &default_branch).await?;
        if !builds.is_empty() || contribution_id < 0 {
            return Ok(BuildLookup {
                default_branch,
                builds,
            });
        }

        let builds = ci
            .list_builds(build_type, &pr_merge_branch(contribution_id))
            .await?;
        if !builds.is_empty() {
            return Ok(BuildLookup {
                default_branch,
                builds,
            });
        }

        // With head preference on, the head ref was the default candidate already.
        let last_resort = if self.source.config().prefer_head_branches {
            Some(pr_head_branch(contribution_id))
        } else {
            self.head_ref(contribution_id).await
        };
        let builds = match last_resort {
            Some(branch) => ci.list_builds(build_type, &branch).await?,
            None => Vec::new(),
        };
        Ok(BuildLookup {
            default_branch,
            builds,
        })
    }

    /// Ticket to notify for a branch.
    ///
    /// An explicit hint wins. Otherwise pull request branches resolve through the
    /// pull request, prefixed branches through their suffix, and any other branch
    /// through a key embedded in its name.
    pub async fn resolve_ticket(
        &self,
        pattern: &TicketPattern,
        hint: Option<&str>,
        branch: &str,
    ) -> Result<String, TicketNotFound> {
        if let Some(ticket) = hint.and_then(|h| pattern.normalize_hint(h)) {
            return Ok(ticket);
        }

        if let Some(pr_number) = pr_number_from_branch(branch) {
            let pr = self
                .source
                .pull_request(pr_number)
                .await
                .map_err(|e| TicketNotFound(format!("pull request lookup failed [pr={pr_number}, errMsg={e}]")))?
                .ok_or_else(|| TicketNotFound(format!("pull request not found [pr={pr_number}]")))?;
            return pattern
                .find_in(&pr.title)
                .or_else(|| pr.head_ref().and_then(|r| pattern.find_in(r)))
                .ok_or_else(|| {
                    TicketNotFound(format!(
                        "no {} ticket in pull request title or head branch [pr={pr_number}, title={}]",
                        pattern.code(),
                        pr.title
                    ))
                });
        }

        let prefix = &self.source.config().branch_prefix;
        if let Some(suffix) = branch.strip_prefix(prefix.as_str()).filter(|_| !prefix.is_empty()) {
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                return Ok(format!("{}-{suffix}", pattern.code()));
            }
        }

        pattern.find_in(branch).ok_or_else(|| {
            TicketNotFound(format!(
                "can't derive {} ticket from branch [branch={branch}]",
                pattern.code()
            ))
        })
    }
}
