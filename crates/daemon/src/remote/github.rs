use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use signoff_core::model::PullRequest;

use super::{fetch, fetch_optional};
use crate::collab::{SourceHost, SourceHostConfig};
use crate::config::{with_trailing_slash, GithubConfig};

const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 20;

/// GitHub repository REST client.
pub struct GithubSource {
    client: Client,
    base: Url,
    token: Option<String>,
    config: SourceHostConfig,
}

#[derive(Debug, Deserialize)]
struct GhBranch {
    name: String,
}

impl GithubSource {
    pub fn new(client: Client, cfg: &GithubConfig, token: Option<String>) -> anyhow::Result<Self> {
        let base = Url::parse(&with_trailing_slash(&cfg.api_url))
            .with_context(|| format!("bad github api url {}", cfg.api_url))?;
        Ok(Self {
            client,
            base,
            token,
            config: SourceHostConfig {
                branch_prefix: cfg.branch_prefix.clone(),
                prefer_head_branches: cfg.prefer_head_branches,
            },
        })
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<RequestBuilder> {
        let mut url = self.base.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        let req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        Ok(match &self.token {
            Some(t) => req.header("Authorization", format!("token {t}")),
            None => req,
        })
    }

    async fn paged<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> anyhow::Result<Vec<T>> {
        let per_page = PER_PAGE.to_string();
        let mut out = Vec::new();
        for page in 1..=MAX_PAGES {
            let page = page.to_string();
            let mut q = query.to_vec();
            q.push(("per_page", per_page.as_str()));
            q.push(("page", page.as_str()));
            let items: Vec<T> = fetch(self.get(path, &q)?)
                .await
                .with_context(|| format!("{path} page {page}"))?;
            let last = items.len() < PER_PAGE;
            out.extend(items);
            if last {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceHost for GithubSource {
    fn config(&self) -> &SourceHostConfig {
        &self.config
    }

    async fn pull_requests(&self) -> anyhow::Result<Vec<PullRequest>> {
        self.paged("pulls", &[("state", "open")]).await
    }

    async fn pull_request(&self, number: i64) -> anyhow::Result<Option<PullRequest>> {
        fetch_optional(self.get(&format!("pulls/{number}"), &[])?)
            .await
            .with_context(|| format!("pull request {number}"))
    }

    async fn branches(&self) -> anyhow::Result<Vec<String>> {
        let branches: Vec<GhBranch> = self.paged("branches", &[]).await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }
}
