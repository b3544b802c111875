//! Domain types shared by the daemon and the control client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// CI build identifier.
pub type BuildId = i64;

/// Identity of a unit of work being observed: a branch on one server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContributionKey {
    /// Server id the branch lives on.
    pub server_id: String,
    /// CI branch name.
    pub branch: String,
}

impl ContributionKey {
    /// Builds a key from its parts.
    pub fn new(server_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for ContributionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server_id, self.branch)
    }
}

/// Lifecycle state of a CI build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    /// Waiting in the CI queue.
    Queued,
    /// Executing on an agent.
    Running,
    /// Completed, whatever the result.
    Finished,
    /// Removed before it could finish.
    Cancelled,
}

/// Reference to a build as listed by the CI server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildReference {
    /// Build id.
    pub id: BuildId,
    /// Build type the build belongs to.
    pub build_type_id: String,
    /// CI branch the build ran on.
    pub branch_name: String,
    /// Current lifecycle state.
    pub state: BuildState,
}

impl BuildReference {
    /// Finished or cancelled: no more progress will happen.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, BuildState::Finished | BuildState::Cancelled)
    }

    /// Removed before finishing.
    pub fn is_cancelled(&self) -> bool {
        self.state == BuildState::Cancelled
    }

    /// Still waiting in the queue.
    pub fn is_queued(&self) -> bool {
        self.state == BuildState::Queued
    }

    /// Executing right now.
    pub fn is_running(&self) -> bool {
        self.state == BuildState::Running
    }
}

/// Full build detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildDetail {
    /// Build id.
    pub id: BuildId,
    /// Build type the build belongs to.
    pub build_type_id: String,
    /// CI branch the build ran on.
    pub branch_name: String,
    /// Current lifecycle state.
    pub state: BuildState,
    /// Status text reported by the CI server, e.g. `SUCCESS` or `FAILURE`.
    #[serde(default)]
    pub status: Option<String>,
    /// Commit ids of the build, newest first.
    #[serde(default)]
    pub revisions: Vec<String>,
}

impl BuildDetail {
    /// Latest commit associated with the build.
    pub fn latest_commit(&self) -> Option<&str> {
        self.revisions.first().map(String::as_str)
    }
}

/// Build configuration metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildType {
    /// Build type id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owning CI project.
    pub project_id: String,
}

/// Git reference of a pull request head.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitRef {
    /// Branch name.
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Commit id.
    pub sha: String,
}

/// Source-host account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceUser {
    /// Account name.
    pub login: String,
    /// Avatar image link.
    #[serde(default)]
    pub avatar_url: String,
}

/// Open pull request as reported by the source host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequest {
    /// Pull request number.
    pub number: i64,
    /// Title, usually starting with a ticket key.
    pub title: String,
    /// Browser link.
    #[serde(default)]
    pub html_url: String,
    /// Last update time as reported by the host.
    #[serde(default)]
    pub updated_at: String,
    /// Head branch and commit.
    #[serde(default)]
    pub head: Option<GitRef>,
    /// Author.
    #[serde(default)]
    pub user: Option<SourceUser>,
}

impl PullRequest {
    /// Short (7 char) id of the head commit, when the head is known.
    pub fn last_commit_sha_short(&self) -> Option<String> {
        self.head
            .as_ref()
            .and_then(|h| crate::branch::short_commit(&h.sha))
    }

    /// Head branch name.
    pub fn head_ref(&self) -> Option<&str> {
        self.head.as_ref().map(|h| h.ref_name.as_str())
    }
}

/// Issue-tracker ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    /// Key such as `IGNITE-10930`.
    pub key: String,
    /// Workflow status name.
    pub status: String,
    /// One-line title.
    #[serde(default)]
    pub summary: String,
}

/// Ticket status marking a contribution that waits for review.
pub const PATCH_AVAILABLE: &str = "Patch Available";

impl Ticket {
    /// Whether the ticket currently represents a contribution under review.
    pub fn is_active_contribution(&self) -> bool {
        self.status == PATCH_AVAILABLE
    }
}

/// Reference to a posted tracker comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerComment {
    /// Comment id assigned by the tracker.
    pub id: String,
}

/// Historical failure summary of a test on the base branch.
///
/// Either a percentage is known, or only raw counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FailureSummary {
    /// Failure percentage, already formatted (e.g. `25` or `2.5`).
    #[serde(default)]
    pub failure_rate: Option<String>,
    /// Failed runs.
    #[serde(default)]
    pub failures: Option<u32>,
    /// Total runs.
    #[serde(default)]
    pub runs: Option<u32>,
}

/// One failing test inside a suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestFailure {
    /// Full test name, used when suite/test parts are unknown.
    pub name: String,
    /// Suite part of the name.
    #[serde(default)]
    pub suite_name: Option<String>,
    /// Test part of the name.
    #[serde(default)]
    pub test_name: Option<String>,
    /// Recent history on the base branch, if any.
    #[serde(default)]
    pub recent: Option<FailureSummary>,
}

/// Failure snapshot of one suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuiteStatus {
    /// Suite display name.
    pub name: String,
    /// Number of failed tests reported by the CI server.
    pub failed_tests: u32,
    /// Suite-level problem text (e.g. `Exit code`), if any.
    #[serde(default)]
    pub result: Option<String>,
    /// Link to the suite's build.
    #[serde(default)]
    pub web_to_build: String,
    /// Individually listed failing tests.
    #[serde(default)]
    pub test_failures: Vec<TestFailure>,
}

/// Terminal outcome of one sign-off attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Visa {
    /// Human readable outcome.
    pub status: String,
    /// Tracker comment, present only when the comment was posted.
    #[serde(default)]
    pub comment: Option<TrackerComment>,
    /// Blockers reported in the comment.
    pub blockers: u32,
}

/// Status text of a successfully posted visa.
pub const TRACKER_COMMENTED: &str = "JIRA commented.";

impl Visa {
    /// Failure outcome with no comment and no blockers.
    pub fn failed(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            comment: None,
            blockers: 0,
        }
    }

    /// Successful outcome carrying the tracker's comment reference.
    pub fn commented(comment: TrackerComment, blockers: u32) -> Self {
        Self {
            status: TRACKER_COMMENTED.to_string(),
            comment: Some(comment),
            blockers,
        }
    }

    /// The comment was posted.
    pub fn is_success(&self) -> bool {
        self.comment.is_some()
    }
}

/// One requested sign-off, as recorded in the visa history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisaRequest {
    /// Unique id of the request.
    pub request_id: String,
    /// Server the branch lives on.
    pub server_id: String,
    /// CI branch.
    pub branch: String,
    /// User who asked for the visa.
    pub user_name: String,
    /// Ticket the visa is posted to.
    pub ticket: String,
    /// Build type the visa is issued for.
    pub build_type_id: String,
    /// Request time, milliseconds since the epoch.
    pub requested_at_ms: i64,
    /// Builds triggered for this request (empty for manual comments).
    #[serde(default)]
    pub build_ids: Vec<BuildId>,
    /// Builds are still being waited for.
    pub observing: bool,
    /// Outcome, once known.
    #[serde(default)]
    pub result: Option<Visa>,
}

impl VisaRequest {
    /// Contribution the request was made for.
    pub fn key(&self) -> ContributionKey {
        ContributionKey::new(self.server_id.clone(), self.branch.clone())
    }
}

/// Phase of an observation in the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObservationPhase {
    /// Builds are still running.
    Observing,
    /// All builds are done and the ticket was handled.
    Finished,
    /// Every build was cancelled, or the observation was cancelled.
    Cancelled,
}

impl ObservationPhase {
    /// No further polling will happen.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Observing)
    }
}

impl fmt::Display for ObservationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Observing => "observing",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per (contribution, build type) CI state. Recomputed on every query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributionCheckStatus {
    /// Build type the status was computed for.
    pub suite_id: String,
    /// Branch the builds were looked up on.
    pub resolved_branch: String,
    /// A finished build exists.
    pub suite_is_finished: bool,
    /// The finished build was cancelled.
    pub suite_cancelled: bool,
    /// Branch of the finished build.
    #[serde(default)]
    pub branch_with_finished_suite: Option<String>,
    /// 7 lower-case hex chars of the finished build's latest commit.
    #[serde(default)]
    pub finished_suite_commit: Option<String>,
    /// Builds waiting in the queue.
    pub queued_builds: usize,
    /// Builds executing now.
    pub running_builds: usize,
    /// Links to the queued and running builds.
    #[serde(default)]
    pub web_links_queued_suites: Vec<String>,
    /// Phase of the branch's observation, if any.
    #[serde(default)]
    pub observations_status: Option<ObservationPhase>,
}

/// Contribution backed by a pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequestContribution {
    /// Pull request number.
    pub pr_number: i64,
    /// Pull request title.
    pub pr_title: String,
    /// Browser link.
    pub pr_html_url: String,
    /// Short id of the head commit.
    pub pr_head_commit: String,
    /// Last update time.
    pub pr_time_update: String,
    /// Author login.
    pub pr_author: String,
    /// Author avatar link.
    pub pr_author_avatar_url: String,
}

impl From<&PullRequest> for PullRequestContribution {
    fn from(pr: &PullRequest) -> Self {
        let (author, avatar) = pr
            .user
            .as_ref()
            .map(|u| (u.login.clone(), u.avatar_url.clone()))
            .unwrap_or_default();
        Self {
            pr_number: pr.number,
            pr_title: pr.title.clone(),
            pr_html_url: pr.html_url.clone(),
            pr_head_commit: pr.last_commit_sha_short().unwrap_or_default(),
            pr_time_update: pr.updated_at.clone(),
            pr_author: author,
            pr_author_avatar_url: avatar,
        }
    }
}

/// Ticket-driven contribution with no pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrLessContribution {
    /// Negative branch-suffix id; absent when the suffix is not numeric.
    #[serde(default)]
    pub pr_number: Option<i64>,
    /// Ticket the branch is named after.
    pub ticket_key: String,
    /// Ticket workflow status.
    pub ticket_status: String,
    /// Ticket summary.
    pub pr_title: String,
}

/// A pull request or a ticket-driven branch being tracked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Contribution {
    /// Open pull request.
    PullRequest(PullRequestContribution),
    /// Ticket branch without a pull request.
    PrLess(PrLessContribution),
}

impl Contribution {
    /// Numeric contribution id: positive for pull requests, negative for PR-less.
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::PullRequest(pr) => Some(pr.pr_number),
            Self::PrLess(c) => c.pr_number,
        }
    }
}

/// Mute assignment details.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MuteAssignment {
    /// Free text entered when muting; usually contains a ticket link.
    #[serde(default)]
    pub text: String,
    /// User who muted the test.
    #[serde(default)]
    pub muted_by: String,
    /// Mute time, milliseconds since the epoch.
    pub timestamp_ms: i64,
    /// Formatted `timestamp_ms`, filled in when listed.
    #[serde(default)]
    pub mute_date: Option<String>,
}

/// Muted test on the CI server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MuteInfo {
    /// Mute id.
    pub id: i64,
    /// Muted test.
    pub test_name: String,
    /// Who muted it and why.
    pub assignment: MuteAssignment,
    /// Status of the ticket referenced by the mute text.
    #[serde(default)]
    pub ticket_status: Option<String>,
}

/// Caller identity passed through to collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Caller's user name.
    pub user_name: String,
    /// Secret, never serialized.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl Credentials {
    /// Identity without a token.
    pub fn user(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            token: None,
        }
    }
}
