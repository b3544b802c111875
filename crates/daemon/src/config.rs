use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Where visa history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HistoryBackend {
    Memory,
    Surreal,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    pub servers_file: PathBuf,
    pub history: HistoryBackend,
    pub db_dir: PathBuf,
    pub poll_interval: Duration,
}

/// Servers file, one `[[servers]]` table per server id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServersFile {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    /// Build type tracked on the default branch.
    #[serde(default)]
    pub default_build_type: Option<String>,
    pub teamcity: TeamcityConfig,
    pub github: GithubConfig,
    pub jira: JiraConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamcityConfig {
    /// Web URL, e.g. `https://ci.ignite.apache.org/`.
    pub url: String,
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Repository API URL, e.g. `https://api.github.com/repos/apache/ignite/`.
    pub api_url: String,
    #[serde(default)]
    pub branch_prefix: String,
    #[serde(default)]
    pub prefer_head_branches: bool,
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JiraConfig {
    pub url: String,
    pub project_code: String,
    #[serde(default)]
    pub token_env: Option<String>,
}

impl ServersFile {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::parse(&s).with_context(|| format!("parse {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let file: ServersFile = toml::from_str(s)?;
        let mut seen = std::collections::HashSet::new();
        for srv in &file.servers {
            anyhow::ensure!(seen.insert(srv.id.as_str()), "duplicate server id {}", srv.id);
        }
        Ok(file)
    }
}

/// Reads a token from the environment variable named in the servers file.
///
/// Unset or empty variables yield `None`.
pub fn token_from_env(var: Option<&str>) -> Option<String> {
    let var = var?;
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => {
            tracing::warn!(var = %var, "token variable not set");
            None
        }
    }
}

/// Appends `/` when missing; URLs in the file are used as prefixes.
pub fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[servers]]
id = "apache"
default_build_type = "IgniteTests24Java8_RunAll"

[servers.teamcity]
url = "https://ci.ignite.apache.org"
token_env = "SIGNOFF_TC_TOKEN"

[servers.github]
api_url = "https://api.github.com/repos/apache/ignite/"
branch_prefix = "ignite-"

[servers.jira]
url = "https://issues.apache.org/jira/"
project_code = "IGNITE"
"#;

    #[test]
    fn parses_servers_file() {
        let file = ServersFile::parse(SAMPLE).unwrap();
        assert_eq!(file.servers.len(), 1);
        let srv = &file.servers[0];
        assert_eq!(srv.id, "apache");
        assert_eq!(srv.default_build_type.as_deref(), Some("IgniteTests24Java8_RunAll"));
        assert_eq!(srv.github.branch_prefix, "ignite-");
        assert!(!srv.github.prefer_head_branches);
        assert_eq!(srv.jira.project_code, "IGNITE");
        assert!(srv.jira.token_env.is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let twice = format!("{SAMPLE}\n{SAMPLE}");
        assert!(ServersFile::parse(&twice).is_err());
    }

    #[test]
    fn trailing_slash() {
        assert_eq!(with_trailing_slash("http://ci"), "http://ci/");
        assert_eq!(with_trailing_slash("http://ci/"), "http://ci/");
    }
}
