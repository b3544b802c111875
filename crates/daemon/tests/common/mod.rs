//! In-process collaborators for the daemon integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use signoff_core::model::{
    BuildDetail, BuildId, BuildReference, BuildState, BuildType, GitRef, MuteInfo, PullRequest,
    SuiteStatus, Ticket, TrackerComment,
};
use signoff_daemon::collab::{
    CiServer, IssueTracker, IssueTrackerConfig, ServerHandle, ServerSettings, SourceHost,
    SourceHostConfig, StaticRegistry,
};

pub const SERVER: &str = "apache";
pub const HOST: &str = "https://ci.example.org/";
pub const RUN_ALL: &str = "RunAll";

#[derive(Default)]
pub struct FakeCi {
    next_id: AtomicI64,
    /// Builds by (build type, branch), newest first.
    pub builds: Mutex<HashMap<(String, String), Vec<BuildReference>>>,
    pub details: Mutex<HashMap<BuildId, BuildDetail>>,
    pub suites: Mutex<HashMap<BuildId, Vec<SuiteStatus>>>,
    pub build_types: Mutex<HashMap<String, BuildType>>,
    pub composites: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
}

impl FakeCi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Default::default()
        }
    }

    /// Records a build both in the branch listing and as a detail.
    pub fn add_build(&self, build_type: &str, branch: &str, state: BuildState, commit: &str) -> BuildId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let reference = BuildReference {
            id,
            build_type_id: build_type.into(),
            branch_name: branch.into(),
            state,
        };
        self.builds
            .lock()
            .unwrap()
            .entry((build_type.into(), branch.into()))
            .or_default()
            .insert(0, reference);
        self.details.lock().unwrap().insert(
            id,
            BuildDetail {
                id,
                build_type_id: build_type.into(),
                branch_name: branch.into(),
                state,
                status: None,
                revisions: if commit.is_empty() { vec![] } else { vec![commit.into()] },
            },
        );
        id
    }

    pub fn set_state(&self, id: BuildId, state: BuildState) {
        if let Some(d) = self.details.lock().unwrap().get_mut(&id) {
            d.state = state;
        }
        for refs in self.builds.lock().unwrap().values_mut() {
            for r in refs.iter_mut().filter(|r| r.id == id) {
                r.state = state;
            }
        }
    }

    pub fn set_suites(&self, id: BuildId, suites: Vec<SuiteStatus>) {
        self.suites.lock().unwrap().insert(id, suites);
    }
}

#[async_trait]
impl CiServer for FakeCi {
    fn host(&self) -> &str {
        HOST
    }

    async fn trigger(&self, build_type: &str, branch: &str, _queue_at_top: bool) -> anyhow::Result<BuildId> {
        Ok(self.add_build(build_type, branch, BuildState::Queued, ""))
    }

    async fn list_builds(&self, build_type: &str, branch: &str) -> anyhow::Result<Vec<BuildReference>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .builds
            .lock()
            .unwrap()
            .get(&(build_type.to_string(), branch.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn build_detail(&self, id: BuildId) -> anyhow::Result<BuildDetail> {
        self.details
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no build {id}"))
    }

    async fn last_finished(&self, build_type: &str, branch: &str, limit: usize) -> anyhow::Result<Vec<BuildId>> {
        let mut ids: Vec<BuildId> = self
            .details
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.build_type_id == build_type && d.branch_name == branch)
            .filter(|d| d.state == BuildState::Finished)
            .map(|d| d.id)
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(limit);
        Ok(ids)
    }

    async fn build_type(&self, id: &str) -> anyhow::Result<Option<BuildType>> {
        Ok(self.build_types.lock().unwrap().get(id).cloned())
    }

    async fn composite_build_types(&self, _project_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.composites.lock().unwrap().clone())
    }

    async fn blocker_suites(&self, build_id: BuildId) -> anyhow::Result<Option<Vec<SuiteStatus>>> {
        Ok(Some(
            self.suites
                .lock()
                .unwrap()
                .get(&build_id)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn mutes(&self, _project_id: &str) -> anyhow::Result<Vec<MuteInfo>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub config: SourceHostConfig,
    pub prs: Vec<PullRequest>,
    pub branches: Vec<String>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(prefix: &str) -> Self {
        Self {
            config: SourceHostConfig {
                branch_prefix: prefix.into(),
                prefer_head_branches: false,
            },
            ..Default::default()
        }
    }

    pub fn with_pr(mut self, number: i64, title: &str, head_ref: &str) -> Self {
        self.prs.push(pull_request(number, title, head_ref));
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branches.push(branch.into());
        self
    }

    /// Resolve pull requests to their head branch before the merge branch.
    pub fn prefer_head(mut self) -> Self {
        self.config.prefer_head_branches = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceHost for FakeSource {
    fn config(&self) -> &SourceHostConfig {
        &self.config
    }

    async fn pull_requests(&self) -> anyhow::Result<Vec<PullRequest>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.prs.clone())
    }

    async fn pull_request(&self, number: i64) -> anyhow::Result<Option<PullRequest>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.prs.iter().find(|p| p.number == number).cloned())
    }

    async fn branches(&self) -> anyhow::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.branches.clone())
    }
}

pub struct FakeTracker {
    pub config: IssueTrackerConfig,
    pub tickets: Vec<Ticket>,
    pub posted: Mutex<Vec<(String, String)>>,
    /// Rejects every comment when set.
    pub fail: AtomicBool,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self {
            config: IssueTrackerConfig {
                url: "https://issues.example.org/jira/".into(),
                project_code: "IGNITE".into(),
            },
            tickets: Vec::new(),
            posted: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn with_ticket(mut self, key: &str, status: &str, summary: &str) -> Self {
        self.tickets.push(Ticket {
            key: key.into(),
            status: status.into(),
            summary: summary.into(),
        });
        self
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn posted(&self) -> Vec<(String, String)> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    fn config(&self) -> &IssueTrackerConfig {
        &self.config
    }

    async fn tickets(&self) -> anyhow::Result<Vec<Ticket>> {
        Ok(self.tickets.clone())
    }

    async fn post_comment(&self, ticket: &str, text: &str) -> anyhow::Result<TrackerComment> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("tracker unavailable");
        }
        let mut posted = self.posted.lock().unwrap();
        posted.push((ticket.into(), text.into()));
        Ok(TrackerComment {
            id: (100 + posted.len()).to_string(),
        })
    }
}

pub fn pull_request(number: i64, title: &str, head_ref: &str) -> PullRequest {
    PullRequest {
        number,
        title: title.into(),
        html_url: format!("https://github.com/apache/ignite/pull/{number}"),
        updated_at: "2019-01-15T12:00:00Z".into(),
        head: Some(GitRef {
            ref_name: head_ref.into(),
            sha: "A1B2C3D4E5F60718".into(),
        }),
        user: None,
    }
}

pub struct Fixture {
    pub ci: Arc<FakeCi>,
    pub source: Arc<FakeSource>,
    pub tracker: Arc<FakeTracker>,
}

impl Fixture {
    pub fn new(ci: FakeCi, source: FakeSource, tracker: FakeTracker) -> Self {
        Self {
            ci: Arc::new(ci),
            source: Arc::new(source),
            tracker: Arc::new(tracker),
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_id: SERVER.into(),
            ci: self.ci.clone(),
            source: self.source.clone(),
            tracker: self.tracker.clone(),
            settings: ServerSettings {
                default_build_type: Some(RUN_ALL.into()),
            },
        }
    }

    pub fn registry(&self) -> StaticRegistry {
        StaticRegistry::new().with_server(self.handle())
    }
}
