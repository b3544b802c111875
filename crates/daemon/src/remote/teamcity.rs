use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use signoff_core::model::{
    BuildDetail, BuildId, BuildReference, BuildState, BuildType, FailureSummary, MuteAssignment,
    MuteInfo, SuiteStatus, TestFailure,
};

use super::{fetch, fetch_optional, with_auth};
use crate::aggregate::build_web_url;
use crate::collab::CiServer;
use crate::config::with_trailing_slash;

const BUILD_FIELDS: &str = "id,buildTypeId,branchName,state,status,statusText,webUrl,canceledInfo,buildType(name),revisions(revision(version))";
/// Runs on the default branch considered for a test's failure rate.
const HISTORY_RUNS: usize = 50;

/// TeamCity REST client.
pub struct TeamcityServer {
    client: Client,
    host: String,
    base: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TcBuild {
    id: BuildId,
    #[serde(default)]
    build_type_id: String,
    #[serde(default)]
    branch_name: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_text: Option<String>,
    #[serde(default)]
    web_url: Option<String>,
    #[serde(default)]
    canceled_info: Option<serde_json::Value>,
    #[serde(default)]
    build_type: Option<TcBuildTypeName>,
    #[serde(default)]
    revisions: Option<TcRevisions>,
}

#[derive(Debug, Deserialize)]
struct TcBuildTypeName {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct TcRevisions {
    #[serde(default)]
    revision: Vec<TcRevision>,
}

#[derive(Debug, Deserialize)]
struct TcRevision {
    version: String,
}

#[derive(Debug, Default, Deserialize)]
struct TcBuilds {
    #[serde(default)]
    build: Vec<TcBuild>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TcBuildType {
    id: String,
    name: String,
    project_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TcBuildTypes {
    #[serde(default)]
    build_type: Vec<TcBuildType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TcTestOccurrences {
    #[serde(default)]
    test_occurrence: Vec<TcTestOccurrence>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TcTestOccurrence {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    new_failure: Option<bool>,
    #[serde(default)]
    test: Option<TcTestRef>,
}

#[derive(Debug, Deserialize)]
struct TcTestRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct TcMutes {
    #[serde(default)]
    mute: Vec<TcMute>,
}

#[derive(Debug, Deserialize)]
struct TcMute {
    id: i64,
    #[serde(default)]
    assignment: Option<TcAssignment>,
    #[serde(default)]
    target: Option<TcMuteTarget>,
}

#[derive(Debug, Deserialize)]
struct TcAssignment {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    user: Option<TcUser>,
}

#[derive(Debug, Deserialize)]
struct TcUser {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct TcMuteTarget {
    #[serde(default)]
    tests: Option<TcTests>,
}

#[derive(Debug, Deserialize)]
struct TcTests {
    #[serde(default)]
    test: Vec<TcTestName>,
}

#[derive(Debug, Deserialize)]
struct TcTestName {
    name: String,
}

impl TcBuild {
    fn build_state(&self) -> BuildState {
        if self.canceled_info.is_some() {
            return BuildState::Cancelled;
        }
        match self.state.as_str() {
            "queued" => BuildState::Queued,
            "running" => BuildState::Running,
            _ => BuildState::Finished,
        }
    }

    fn reference(&self) -> BuildReference {
        BuildReference {
            id: self.id,
            build_type_id: self.build_type_id.clone(),
            branch_name: self.branch_name.clone().unwrap_or_default(),
            state: self.build_state(),
        }
    }
}

impl TeamcityServer {
    pub fn new(client: Client, url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let host = with_trailing_slash(url);
        let base = Url::parse(&host).with_context(|| format!("bad teamcity url {url}"))?;
        Ok(Self {
            client,
            host,
            base,
            token,
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<Url> {
        let mut url = self.base.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<RequestBuilder> {
        let url = self.url(path, query)?;
        Ok(with_auth(
            self.client.get(url).header("Accept", "application/json"),
            self.token.as_deref(),
        ))
    }

    async fn builds(&self, locator: &str, fields: &str) -> anyhow::Result<Vec<TcBuild>> {
        let res: TcBuilds = fetch(self.get(
            "app/rest/builds",
            &[("locator", locator), ("fields", fields)],
        )?)
        .await
        .with_context(|| format!("builds [{locator}]"))?;
        Ok(res.build)
    }

    async fn failed_tests(&self, build_id: BuildId) -> anyhow::Result<Vec<TcTestOccurrence>> {
        let locator = format!("build:(id:{build_id}),status:FAILURE,muted:false,ignored:false,count:10000");
        let res: TcTestOccurrences = fetch(self.get(
            "app/rest/testOccurrences",
            &[
                ("locator", locator.as_str()),
                ("fields", "testOccurrence(name,status,newFailure,test(id))"),
            ],
        )?)
        .await
        .with_context(|| format!("failed tests of build {build_id}"))?;
        Ok(res.test_occurrence)
    }

    /// Failure counts of a test on the default branch.
    async fn recent_history(&self, test_id: &str) -> Option<FailureSummary> {
        let locator = format!("test:(id:{test_id}),branch:(default:true),count:{HISTORY_RUNS}");
        let req = match self.get(
            "app/rest/testOccurrences",
            &[("locator", locator.as_str()), ("fields", "testOccurrence(status)")],
        ) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(test = %test_id, error = %e, "bad test history url");
                return None;
            }
        };
        match fetch::<TcTestOccurrences>(req).await {
            Ok(res) => failure_summary(&res.test_occurrence),
            Err(e) => {
                tracing::warn!(test = %test_id, error = %e, "test history lookup failed");
                None
            }
        }
    }

    async fn suite_status(&self, build: &TcBuild) -> anyhow::Result<Option<SuiteStatus>> {
        let failed = self.failed_tests(build.id).await?;
        let new_failures: Vec<&TcTestOccurrence> = failed
            .iter()
            .filter(|t| t.new_failure.unwrap_or(false))
            .collect();
        if !failed.is_empty() && new_failures.is_empty() {
            return Ok(None);
        }

        let mut test_failures = Vec::with_capacity(new_failures.len());
        for occ in new_failures {
            let (suite_name, test_name) = match occ.name.split_once(": ") {
                Some((s, t)) => (Some(s.to_string()), Some(t.to_string())),
                None => (None, None),
            };
            let recent = match &occ.test {
                Some(t) => self.recent_history(&t.id).await,
                None => None,
            };
            test_failures.push(TestFailure {
                name: occ.name.clone(),
                suite_name,
                test_name,
                recent,
            });
        }

        let name = build
            .build_type
            .as_ref()
            .map(|t| t.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| build.build_type_id.clone());
        Ok(Some(SuiteStatus {
            name,
            failed_tests: u32::try_from(failed.len()).unwrap_or(u32::MAX),
            result: if failed.is_empty() {
                build.status_text.clone()
            } else {
                None
            },
            web_to_build: build
                .web_url
                .clone()
                .unwrap_or_else(|| build_web_url(&self.host, build.id, &build.build_type_id)),
            test_failures,
        }))
    }
}

fn failure_summary(runs: &[TcTestOccurrence]) -> Option<FailureSummary> {
    if runs.is_empty() {
        return None;
    }
    let total = u32::try_from(runs.len()).unwrap_or(u32::MAX);
    let failures = u32::try_from(
        runs.iter()
            .filter(|r| r.status.as_deref() == Some("FAILURE"))
            .count(),
    )
    .unwrap_or(u32::MAX);
    Some(FailureSummary {
        failure_rate: Some(format_rate(failures, total)),
        failures: Some(failures),
        runs: Some(total),
    })
}

/// Percentage with at most one decimal, `25` rather than `25.0`.
fn format_rate(failures: u32, runs: u32) -> String {
    let pct = f64::from(failures) * 100.0 / f64::from(runs);
    let s = format!("{pct:.1}");
    s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
}

/// TeamCity timestamps look like `20190115T123045+0300`.
fn parse_timestamp_ms(ts: &str) -> Option<i64> {
    chrono::DateTime::parse_from_str(ts, "%Y%m%dT%H%M%S%z")
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[async_trait]
impl CiServer for TeamcityServer {
    fn host(&self) -> &str {
        &self.host
    }

    async fn trigger(&self, build_type: &str, branch: &str, queue_at_top: bool) -> anyhow::Result<BuildId> {
        let body = serde_json::json!({
            "branchName": branch,
            "buildType": { "id": build_type },
            "triggeringOptions": { "queueAtTop": queue_at_top },
        });
        let req = with_auth(
            self.client
                .post(self.url("app/rest/buildQueue", &[])?)
                .header("Accept", "application/json")
                .json(&body),
            self.token.as_deref(),
        );
        let queued: TcBuild = fetch(req)
            .await
            .with_context(|| format!("queue {build_type} on {branch}"))?;
        Ok(queued.id)
    }

    async fn list_builds(&self, build_type: &str, branch: &str) -> anyhow::Result<Vec<BuildReference>> {
        let locator = format!("buildType:(id:{build_type}),branch:(name:{branch}),defaultFilter:false,state:any");
        let builds = self
            .builds(&locator, "build(id,buildTypeId,branchName,state,canceledInfo)")
            .await?;
        Ok(builds.iter().map(TcBuild::reference).collect())
    }

    async fn build_detail(&self, id: BuildId) -> anyhow::Result<BuildDetail> {
        let b: TcBuild = fetch(self.get(&format!("app/rest/builds/id:{id}"), &[("fields", BUILD_FIELDS)])?)
            .await
            .with_context(|| format!("build {id}"))?;
        Ok(BuildDetail {
            id: b.id,
            build_type_id: b.build_type_id.clone(),
            branch_name: b.branch_name.clone().unwrap_or_default(),
            state: b.build_state(),
            status: b.status.clone(),
            revisions: b
                .revisions
                .map(|r| r.revision.into_iter().map(|r| r.version).collect())
                .unwrap_or_default(),
        })
    }

    async fn last_finished(&self, build_type: &str, branch: &str, limit: usize) -> anyhow::Result<Vec<BuildId>> {
        let locator = format!("buildType:(id:{build_type}),branch:(name:{branch}),state:finished,canceled:false,count:{limit}");
        let builds = self.builds(&locator, "build(id)").await?;
        Ok(builds.into_iter().map(|b| b.id).collect())
    }

    async fn build_type(&self, id: &str) -> anyhow::Result<Option<BuildType>> {
        let bt: Option<TcBuildType> = fetch_optional(self.get(
            &format!("app/rest/buildTypes/id:{id}"),
            &[("fields", "id,name,projectId")],
        )?)
        .await
        .with_context(|| format!("build type {id}"))?;
        Ok(bt.map(|t| BuildType {
            id: t.id,
            name: t.name,
            project_id: t.project_id,
        }))
    }

    async fn composite_build_types(&self, project_id: &str) -> anyhow::Result<Vec<String>> {
        let locator = format!("affectedProject:(id:{project_id}),type:composite");
        let res: TcBuildTypes = fetch(self.get(
            "app/rest/buildTypes",
            &[("locator", locator.as_str()), ("fields", "buildType(id,name,projectId)")],
        )?)
        .await
        .with_context(|| format!("composite build types of {project_id}"))?;
        Ok(res.build_type.into_iter().map(|t| t.id).collect())
    }

    async fn blocker_suites(&self, build_id: BuildId) -> anyhow::Result<Option<Vec<SuiteStatus>>> {
        let Some(root) = fetch_optional::<TcBuild>(self.get(
            &format!("app/rest/builds/id:{build_id}"),
            &[("fields", BUILD_FIELDS)],
        )?)
        .await?
        else {
            return Ok(None);
        };
        if root.build_state() != BuildState::Finished {
            return Ok(None);
        }

        let locator = format!(
            "snapshotDependency:(to:(id:{build_id}),includeInitial:true),defaultFilter:false,status:FAILURE"
        );
        let failed = self
            .builds(&locator, "build(id,buildTypeId,branchName,state,statusText,webUrl,buildType(name))")
            .await?;
        let has_deps = failed.iter().any(|b| b.id != build_id);

        let mut suites = Vec::new();
        for build in failed.iter().filter(|b| !(has_deps && b.id == build_id)) {
            if let Some(s) = self.suite_status(build).await? {
                suites.push(s);
            }
        }
        Ok(Some(suites))
    }

    async fn mutes(&self, project_id: &str) -> anyhow::Result<Vec<MuteInfo>> {
        let locator = format!("project:(id:{project_id})");
        let res: TcMutes = fetch(self.get(
            "app/rest/mutes",
            &[
                ("locator", locator.as_str()),
                ("fields", "mute(id,assignment(text,timestamp,user(username)),target(tests(test(name))))"),
            ],
        )?)
        .await
        .with_context(|| format!("mutes of {project_id}"))?;

        let mut out = Vec::new();
        for m in res.mute {
            let assignment = m
                .assignment
                .map(|a| MuteAssignment {
                    text: a.text.unwrap_or_default(),
                    muted_by: a.user.map(|u| u.username).unwrap_or_default(),
                    timestamp_ms: a.timestamp.as_deref().and_then(parse_timestamp_ms).unwrap_or(0),
                    mute_date: None,
                })
                .unwrap_or_default();
            let tests = m
                .target
                .and_then(|t| t.tests)
                .map(|t| t.test)
                .unwrap_or_default();
            for t in tests {
                out.push(MuteInfo {
                    id: m.id,
                    test_name: t.name,
                    assignment: assignment.clone(),
                    ticket_status: None,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_builds_win_over_state() {
        let b: TcBuild = serde_json::from_str(
            r#"{"id":1,"buildTypeId":"RunAll","branchName":"pull/1/head","state":"finished","canceledInfo":{"text":"x"}}"#,
        )
        .unwrap();
        assert_eq!(b.build_state(), BuildState::Cancelled);
        let b: TcBuild = serde_json::from_str(r#"{"id":2,"state":"queued"}"#).unwrap();
        assert_eq!(b.reference().state, BuildState::Queued);
        assert_eq!(b.reference().branch_name, "");
    }

    #[test]
    fn failure_rates() {
        assert_eq!(format_rate(10, 40), "25");
        assert_eq!(format_rate(1, 3), "33.3");
        let runs: Vec<TcTestOccurrence> = serde_json::from_str(
            r#"[{"status":"FAILURE"},{"status":"SUCCESS"},{"status":"SUCCESS"},{"status":"SUCCESS"}]"#,
        )
        .unwrap();
        let s = failure_summary(&runs).unwrap();
        assert_eq!(s.failure_rate.as_deref(), Some("25"));
        assert_eq!((s.failures, s.runs), (Some(1), Some(4)));
        assert!(failure_summary(&[]).is_none());
    }

    #[test]
    fn parses_mute_timestamps() {
        assert_eq!(parse_timestamp_ms("20190115T153045+0300"), Some(1_547_555_445_000));
        assert_eq!(parse_timestamp_ms("yesterday"), None);
    }
}
