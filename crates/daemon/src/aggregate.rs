use anyhow::Context;
use signoff_core::branch::short_commit;
use signoff_core::model::{BuildId, BuildReference, ContributionCheckStatus, ContributionKey};

use crate::collab::CiServer;
use crate::observation::ObservationRegistry;

/// Link to a queued or running build on the CI server.
pub fn queued_build_link(host: &str, id: BuildId) -> String {
    format!("{host}viewQueued.html?itemId={id}")
}

/// Link to a build's results page.
pub fn build_web_url(host: &str, id: BuildId, build_type_id: &str) -> String {
    format!("{host}viewLog.html?buildId={id}&buildTypeId={build_type_id}")
}

/// Summarises the builds of one build type on one contribution.
pub struct BuildStatusAggregator<'a> {
    server_id: &'a str,
    ci: &'a dyn CiServer,
    observations: &'a ObservationRegistry,
}

impl<'a> BuildStatusAggregator<'a> {
    pub fn new(
        server_id: &'a str,
        ci: &'a dyn CiServer,
        observations: &'a ObservationRegistry,
    ) -> Self {
        Self {
            server_id,
            ci,
            observations,
        }
    }

    /// Classifies `builds` (CI order, newest first).
    ///
    /// `default_branch` is reported as the resolved branch when the list is empty.
    pub async fn classify(
        &self,
        suite_id: &str,
        builds: &[BuildReference],
        default_branch: &str,
    ) -> anyhow::Result<ContributionCheckStatus> {
        let mut status = ContributionCheckStatus {
            suite_id: suite_id.to_string(),
            ..Default::default()
        };

        if let Some(finished) = builds.iter().find(|b| b.is_finished()) {
            status.suite_is_finished = !finished.is_cancelled();
            status.suite_cancelled = finished.is_cancelled();
            status.branch_with_finished_suite = Some(finished.branch_name.clone());

            let detail = self
                .ci
                .build_detail(finished.id)
                .await
                .with_context(|| format!("build detail {}", finished.id))?;
            status.finished_suite_commit = detail.latest_commit().and_then(short_commit);
        }

        status.resolved_branch = match (&status.branch_with_finished_suite, builds.first()) {
            (Some(branch), _) => branch.clone(),
            (None, Some(first)) => first.branch_name.clone(),
            (None, None) => default_branch.to_string(),
        };

        let live: Vec<&BuildReference> = builds.iter().filter(|b| !b.is_cancelled()).collect();
        let queued: Vec<&BuildReference> = live.iter().copied().filter(|b| b.is_queued()).collect();
        let running: Vec<&BuildReference> =
            live.iter().copied().filter(|b| b.is_running()).collect();

        status.queued_builds = queued.len();
        status.running_builds = running.len();
        status.web_links_queued_suites = queued
            .iter()
            .chain(running.iter())
            .map(|b| queued_build_link(self.ci.host(), b.id))
            .collect();

        status.observations_status = self.observations.status(&ContributionKey::new(
            self.server_id,
            status.resolved_branch.clone(),
        ));

        Ok(status)
    }
}
