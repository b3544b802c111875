//! Contracts of the external systems the service talks to, and the per-server
//! registry that hands them out.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use signoff_core::model::{
    BuildDetail, BuildId, BuildReference, BuildType, ContributionKey, Credentials, MuteInfo,
    PullRequest, SuiteStatus, Ticket, TrackerComment, Visa, VisaRequest,
};

/// Continuous-integration server.
#[async_trait]
pub trait CiServer: Send + Sync {
    /// Base web URL, ending with `/`.
    fn host(&self) -> &str;

    async fn trigger(
        &self,
        build_type: &str,
        branch: &str,
        queue_at_top: bool,
    ) -> anyhow::Result<BuildId>;

    /// All known builds of a build type on a branch, newest first.
    async fn list_builds(&self, build_type: &str, branch: &str)
        -> anyhow::Result<Vec<BuildReference>>;

    async fn build_detail(&self, id: BuildId) -> anyhow::Result<BuildDetail>;

    /// Ids of the most recent finished builds, newest first.
    async fn last_finished(
        &self,
        build_type: &str,
        branch: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<BuildId>>;

    async fn build_type(&self, id: &str) -> anyhow::Result<Option<BuildType>>;

    /// Composite build types of a project, in server order.
    async fn composite_build_types(&self, project_id: &str) -> anyhow::Result<Vec<String>>;

    /// Failing suites of a finished build worth reporting as possible blockers.
    ///
    /// `None` when the build cannot be analysed.
    async fn blocker_suites(&self, build_id: BuildId) -> anyhow::Result<Option<Vec<SuiteStatus>>>;

    async fn mutes(&self, project_id: &str) -> anyhow::Result<Vec<MuteInfo>>;
}

/// Branch naming settings of a source host.
#[derive(Debug, Clone, Default)]
pub struct SourceHostConfig {
    /// Prefix of ticket-driven branches, e.g. `ignite-`.
    pub branch_prefix: String,
    /// Look up the pull request head ref before falling back to `pull/<n>/head`.
    pub prefer_head_branches: bool,
}

/// Source code host with pull requests.
#[async_trait]
pub trait SourceHost: Send + Sync {
    fn config(&self) -> &SourceHostConfig;

    async fn pull_requests(&self) -> anyhow::Result<Vec<PullRequest>>;

    async fn pull_request(&self, number: i64) -> anyhow::Result<Option<PullRequest>>;

    async fn branches(&self) -> anyhow::Result<Vec<String>>;
}

/// Tracker location and project.
#[derive(Debug, Clone, Default)]
pub struct IssueTrackerConfig {
    /// Base URL, ending with `/`.
    pub url: String,
    /// Ticket key prefix, e.g. `IGNITE`.
    pub project_code: String,
}

/// Issue tracker holding the tickets visas are posted to.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    fn config(&self) -> &IssueTrackerConfig;

    async fn tickets(&self) -> anyhow::Result<Vec<Ticket>>;

    async fn post_comment(&self, ticket: &str, text: &str) -> anyhow::Result<TrackerComment>;

    /// Browse URL of a ticket; an empty key yields the browse prefix.
    fn ticket_url(&self, key: &str) -> String {
        format!("{}browse/{key}", self.config().url)
    }

    fn comment_url(&self, key: &str, comment_id: &str) -> String {
        format!(
            "{}?focusedCommentId={comment_id}&page=com.atlassian.jira.plugin.system.issuetabpanels%3Acomment-tabpanel#comment-{comment_id}",
            self.ticket_url(key)
        )
    }
}

/// Failure of a visa history operation.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("visa request not found: {0}")]
    NotFound(String),
    #[error("visa request already completed: {0}")]
    AlreadyCompleted(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Append-mostly log of visa requests.
#[async_trait]
pub trait VisaHistoryStore: Send + Sync {
    async fn append(&self, request: VisaRequest) -> Result<(), HistoryError>;

    /// Most recent request for a contribution.
    async fn last(&self, key: &ContributionKey) -> Result<Option<VisaRequest>, HistoryError>;

    /// All requests in append order.
    async fn all(&self) -> Result<Vec<VisaRequest>, HistoryError>;

    /// Ends observation of a request and stores its result. Allowed once.
    async fn complete(&self, request_id: &str, result: Option<Visa>) -> Result<(), HistoryError>;
}

/// Per-server settings that are not owned by any collaborator.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Build type tracked on the default branch, checked for contributions.
    pub default_build_type: Option<String>,
}

/// Collaborators of one server id.
#[derive(Clone)]
pub struct ServerHandle {
    /// Server id the handle was looked up by.
    pub server_id: String,
    /// CI server.
    pub ci: Arc<dyn CiServer>,
    /// Source host.
    pub source: Arc<dyn SourceHost>,
    /// Issue tracker.
    pub tracker: Arc<dyn IssueTracker>,
    /// Remaining per-server settings.
    pub settings: ServerSettings,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("server_id", &self.server_id)
            .field("host", &self.ci.host())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Failure of a server lookup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown server: {0}")]
    UnknownServer(String),
}

/// Lookup of collaborators by server id.
pub trait ServerRegistry: Send + Sync {
    fn lookup(&self, server_id: &str, creds: &Credentials) -> Result<ServerHandle, RegistryError>;
}

/// Registry over a fixed set of servers built at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticRegistry {
    servers: HashMap<String, ServerHandle>,
}

impl StaticRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a server, replacing any previous one with the same id.
    pub fn with_server(mut self, handle: ServerHandle) -> Self {
        self.servers.insert(handle.server_id.clone(), handle);
        self
    }

    /// Registered server ids, sorted.
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl ServerRegistry for StaticRegistry {
    fn lookup(&self, server_id: &str, _creds: &Credentials) -> Result<ServerHandle, RegistryError> {
        self.servers
            .get(server_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownServer(server_id.to_string()))
    }
}
