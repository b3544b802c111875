//! REST adapters for the CI server, source host and issue tracker.

mod github;
mod jira;
mod teamcity;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;

pub use github::GithubSource;
pub use jira::JiraTracker;
pub use teamcity::TeamcityServer;

use crate::collab::{ServerHandle, ServerSettings, StaticRegistry};
use crate::config::{token_from_env, ServersFile};

const USER_AGENT: &str = concat!("signoff-daemon/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("build http client")
}

pub(crate) fn with_auth(req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
    match token {
        Some(t) => req.bearer_auth(t),
        None => req,
    }
}

/// Sends a request and decodes a JSON body; `None` on 404.
pub(crate) async fn fetch_optional<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> anyhow::Result<Option<T>> {
    let resp = req.send().await?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    Ok(Some(resp.error_for_status()?.json().await?))
}

pub(crate) async fn fetch<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> anyhow::Result<T> {
    Ok(req.send().await?.error_for_status()?.json().await?)
}

/// Builds the registry of REST-backed servers described by the servers file.
pub fn build_registry(file: &ServersFile) -> anyhow::Result<StaticRegistry> {
    let client = http_client()?;
    let mut registry = StaticRegistry::new();
    for srv in &file.servers {
        let ci = TeamcityServer::new(
            client.clone(),
            &srv.teamcity.url,
            token_from_env(srv.teamcity.token_env.as_deref()),
        )
        .with_context(|| format!("server {}: teamcity", srv.id))?;
        let source = GithubSource::new(
            client.clone(),
            &srv.github,
            token_from_env(srv.github.token_env.as_deref()),
        )
        .with_context(|| format!("server {}: github", srv.id))?;
        let tracker = JiraTracker::new(
            client.clone(),
            &srv.jira,
            token_from_env(srv.jira.token_env.as_deref()),
        )
        .with_context(|| format!("server {}: jira", srv.id))?;

        tracing::info!(server = %srv.id, host = %srv.teamcity.url, "server registered");
        registry = registry.with_server(ServerHandle {
            server_id: srv.id.clone(),
            ci: Arc::new(ci),
            source: Arc::new(source),
            tracker: Arc::new(tracker),
            settings: ServerSettings {
                default_build_type: srv.default_build_type.clone(),
            },
        });
    }
    Ok(registry)
}
