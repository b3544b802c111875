//! Request and response bodies of the daemon's HTTP API.

use serde::{Deserialize, Serialize};

use crate::model::Contribution;

/// Trigger builds for a branch and optionally observe them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Server the branch lives on.
    pub server_id: String,
    /// CI branch to build.
    pub branch: String,
    /// Build type the visa is issued for once the builds finish.
    pub parent_suite_id: String,
    /// Comma separated build types to trigger.
    pub suite_ids: String,
    /// Queue at the top of the CI queue.
    #[serde(default)]
    pub top: bool,
    /// Wait for the builds and comment the ticket.
    #[serde(default)]
    pub observe: bool,
    /// Ticket key or number; derived from the branch when absent.
    #[serde(default)]
    pub ticket_id: Option<String>,
    /// Pull request number used for the actual-commit hint.
    #[serde(default)]
    pub pr_num: Option<String>,
}

impl TriggerRequest {
    /// Non-empty suite ids, trimmed.
    pub fn suite_id_list(&self) -> Vec<String> {
        self.suite_ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Plain text outcome of an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimpleResult {
    /// Human readable message.
    pub result: String,
}

impl SimpleResult {
    /// Wraps a message.
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
        }
    }
}

/// Comment a ticket with the results of the last finished build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisaCommentRequest {
    /// Server the branch lives on.
    pub server_id: String,
    /// CI branch whose last finished build is analysed.
    pub branch: String,
    /// Build type to analyse.
    pub suite_id: String,
    /// Ticket key or number; derived from the branch when absent.
    #[serde(default)]
    pub ticket_id: Option<String>,
}

/// Cancel the observation of a branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    /// Server the branch lives on.
    pub server_id: String,
    /// Observed CI branch.
    pub branch: String,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelResponse {
    /// False when nothing was being observed.
    pub cancelled: bool,
}

/// One row of the visa history listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisaStatus {
    /// Request time, `yyyy-MM-dd HH:mm:ss` UTC.
    pub date: String,
    /// CI branch.
    pub branch_name: String,
    /// User who asked for the visa.
    pub user_name: String,
    /// Ticket the visa is posted to.
    pub ticket: String,
    /// Build type the visa is issued for.
    pub build_type_id: String,
    /// Display name of `build_type_id`.
    pub build_type_name: String,
    /// `finished`, `running`, `waiting results` or `cancelled`.
    pub status: String,
    /// Link to the posted tracker comment.
    #[serde(default)]
    pub comment_url: Option<String>,
    /// Blockers reported in the comment.
    pub blockers: u32,
    /// Present while the request is being observed.
    #[serde(default)]
    pub cancel_url: Option<String>,
}

/// Blockers of the most recent finished build.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentVisaStatus {
    /// Zero when no finished build could be analysed.
    pub blockers: u32,
}

/// Contribution with ticket and CI branch details attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributionToCheck {
    /// Pull request or PR-less details.
    #[serde(flatten)]
    pub contribution: Contribution,
    /// Matching ticket key.
    #[serde(default)]
    pub jira_issue_id: Option<String>,
    /// Status of the matching ticket.
    #[serde(default)]
    pub jira_status_name: Option<String>,
    /// Browse link of the matching ticket.
    #[serde(default)]
    pub jira_issue_url: Option<String>,
    /// First CI branch with builds of the default build type.
    #[serde(default)]
    pub tc_branch_name: Option<String>,
}

/// Query of endpoints scoped to one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerQuery {
    /// Server id.
    pub server_id: String,
}

/// Query of the mutes listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutesQuery {
    /// Server id.
    pub server_id: String,
    /// CI project whose mutes are listed.
    pub project_id: String,
}

/// Query of the contribution status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionStatusQuery {
    /// Server id.
    pub server_id: String,
    /// Positive pull request number or negative PR-less id.
    pub pr_id: i64,
}

/// Query of the current visa endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentVisaQuery {
    /// Server id.
    pub server_id: String,
    /// Build type to analyse.
    pub suite_id: String,
    /// CI branch.
    pub branch: String,
}
