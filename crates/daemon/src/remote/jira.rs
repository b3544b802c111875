use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use signoff_core::model::{Ticket, TrackerComment};

use super::{fetch, with_auth};
use crate::collab::{IssueTracker, IssueTrackerConfig};
use crate::config::{with_trailing_slash, JiraConfig};

const PAGE_SIZE: usize = 100;
const MAX_TICKETS: usize = 2000;

/// JIRA REST client.
pub struct JiraTracker {
    client: Client,
    base: Url,
    token: Option<String>,
    config: IssueTrackerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    key: String,
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: Option<String>,
    status: IssueStatus,
}

#[derive(Debug, Deserialize)]
struct IssueStatus {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: String,
}

impl From<Issue> for Ticket {
    fn from(issue: Issue) -> Self {
        Ticket {
            key: issue.key,
            status: issue.fields.status.name,
            summary: issue.fields.summary.unwrap_or_default(),
        }
    }
}

impl JiraTracker {
    pub fn new(client: Client, cfg: &JiraConfig, token: Option<String>) -> anyhow::Result<Self> {
        let url = with_trailing_slash(&cfg.url);
        let base = Url::parse(&url).with_context(|| format!("bad jira url {}", cfg.url))?;
        Ok(Self {
            client,
            base,
            token,
            config: IssueTrackerConfig {
                url,
                project_code: cfg.project_code.to_ascii_uppercase(),
            },
        })
    }
}

#[async_trait]
impl IssueTracker for JiraTracker {
    fn config(&self) -> &IssueTrackerConfig {
        &self.config
    }

    async fn tickets(&self) -> anyhow::Result<Vec<Ticket>> {
        let jql = format!("project = {} ORDER BY updated DESC", self.config.project_code);
        let page_size = PAGE_SIZE.to_string();
        let mut out = Vec::new();

        while out.len() < MAX_TICKETS {
            let start_at = out.len().to_string();
            let mut url = self.base.join("rest/api/2/search")?;
            url.query_pairs_mut()
                .append_pair("jql", &jql)
                .append_pair("fields", "summary,status")
                .append_pair("startAt", &start_at)
                .append_pair("maxResults", &page_size);
            let page: SearchResult = fetch(with_auth(self.client.get(url), self.token.as_deref()))
                .await
                .with_context(|| format!("search tickets from {start_at}"))?;

            let fetched = page.issues.len();
            out.extend(page.issues.into_iter().map(Ticket::from));
            if fetched == 0 || out.len() >= page.total {
                break;
            }
        }
        Ok(out)
    }

    async fn post_comment(&self, ticket: &str, text: &str) -> anyhow::Result<TrackerComment> {
        let url = self.base.join(&format!("rest/api/2/issue/{ticket}/comment"))?;
        let req = with_auth(
            self.client.post(url).json(&serde_json::json!({ "body": text })),
            self.token.as_deref(),
        );
        let res: CommentResponse = fetch(req)
            .await
            .with_context(|| format!("comment {ticket}"))?;
        Ok(TrackerComment { id: res.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_result_maps_to_tickets() {
        let page: SearchResult = serde_json::from_str(
            r#"{"startAt":0,"maxResults":100,"total":1,"issues":[
                {"key":"IGNITE-10930","fields":{"summary":"Cache fix","status":{"name":"Patch Available"}}}
            ]}"#,
        )
        .unwrap();
        let tickets: Vec<Ticket> = page.issues.into_iter().map(Ticket::from).collect();
        assert_eq!(tickets[0].key, "IGNITE-10930");
        assert!(tickets[0].is_active_contribution());
    }

    #[test]
    fn ticket_and_comment_urls() {
        let tracker = JiraTracker::new(
            Client::new(),
            &JiraConfig {
                url: "https://issues.apache.org/jira".into(),
                project_code: "ignite".into(),
                token_env: None,
            },
            None,
        )
        .unwrap();
        assert_eq!(tracker.config().project_code, "IGNITE");
        assert_eq!(
            tracker.ticket_url("IGNITE-1"),
            "https://issues.apache.org/jira/browse/IGNITE-1"
        );
        assert!(tracker
            .comment_url("IGNITE-1", "42")
            .starts_with("https://issues.apache.org/jira/browse/IGNITE-1?focusedCommentId=42&"));
    }
}
