use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use signoff_core::api::{
    CancelRequest, CancelResponse, ContributionToCheck, CurrentVisaStatus, SimpleResult,
    TriggerRequest, VisaCommentRequest, VisaStatus,
};
use signoff_core::model::{ContributionCheckStatus, MuteInfo};

const USER_HEADER: &str = "x-signoff-user";

#[derive(Parser, Debug)]
#[command(name = "signoff-ctl")]
struct Args {
    /// Daemon base URL.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    daemon: String,
    /// User name sent with every request.
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Visa history with build states.
    Visas {
        #[arg(long)]
        server: String,
    },
    Mutes {
        #[arg(long)]
        server: String,
        #[arg(long)]
        project: String,
    },
    /// Trigger suites on a branch, optionally observing them.
    Trigger {
        #[arg(long)]
        server: String,
        #[arg(long)]
        branch: String,
        /// Build type the visa is issued for.
        #[arg(long)]
        parent_suite: String,
        /// Comma separated build types; defaults to the parent suite.
        #[arg(long)]
        suites: Option<String>,
        #[arg(long)]
        top: bool,
        #[arg(long)]
        observe: bool,
        #[arg(long)]
        ticket: Option<String>,
        #[arg(long)]
        pr: Option<String>,
    },
    /// Comment the ticket with the last finished build of a suite.
    Comment {
        #[arg(long)]
        server: String,
        #[arg(long)]
        branch: String,
        #[arg(long)]
        suite: String,
        #[arg(long)]
        ticket: Option<String>,
    },
    Cancel {
        #[arg(long)]
        server: String,
        #[arg(long)]
        branch: String,
    },
    /// Blocker count of the last finished build.
    Current {
        #[arg(long)]
        server: String,
        #[arg(long)]
        suite: String,
        #[arg(long)]
        branch: String,
    },
    Contributions {
        #[arg(long)]
        server: String,
    },
    /// CI state of one contribution; negative ids are PR-less branches.
    Status {
        #[arg(long)]
        server: String,
        #[arg(long, allow_hyphen_values = true)]
        id: i64,
    },
}

struct Daemon {
    client: reqwest::Client,
    base: String,
    user: Option<String>,
}

impl Daemon {
    fn url(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&format!("{}{}", self.base.trim_end_matches('/'), path))
            .with_context(|| format!("bad daemon url {}", self.base))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    fn with_user(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.user {
            Some(u) => req.header(USER_HEADER, u),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<T> {
        let req = self.with_user(self.client.get(self.url(path, query)?));
        let resp = req
            .send()
            .await
            .with_context(|| format!("GET {path}"))?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> anyhow::Result<T> {
        let req = self.with_user(self.client.post(self.url(path, &[])?).json(body));
        let resp = req
            .send()
            .await
            .with_context(|| format!("POST {path}"))?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let daemon = Daemon {
        client: reqwest::Client::new(),
        base: args.daemon,
        user: args.user,
    };

    match args.cmd {
        Cmd::Visas { server } => {
            let resp: Vec<VisaStatus> = daemon.get("/v1/visas", &[("server_id", server)]).await?;
            print(&resp)?;
        }
        Cmd::Mutes { server, project } => {
            let resp: Vec<MuteInfo> = daemon
                .get(
                    "/v1/mutes",
                    &[("server_id", server), ("project_id", project)],
                )
                .await?;
            print(&resp)?;
        }
        Cmd::Trigger {
            server,
            branch,
            parent_suite,
            suites,
            top,
            observe,
            ticket,
            pr,
        } => {
            let req = TriggerRequest {
                server_id: server,
                branch,
                suite_ids: suites.unwrap_or_else(|| parent_suite.clone()),
                parent_suite_id: parent_suite,
                top,
                observe,
                ticket_id: ticket,
                pr_num: pr,
            };
            let resp: SimpleResult = daemon.post("/v1/visa/trigger", &req).await?;
            println!("{}", resp.result);
        }
        Cmd::Comment {
            server,
            branch,
            suite,
            ticket,
        } => {
            let req = VisaCommentRequest {
                server_id: server,
                branch,
                suite_id: suite,
                ticket_id: ticket,
            };
            let resp: SimpleResult = daemon.post("/v1/visa/comment", &req).await?;
            println!("{}", resp.result);
        }
        Cmd::Cancel { server, branch } => {
            let req = CancelRequest {
                server_id: server,
                branch,
            };
            let resp: CancelResponse = daemon.post("/v1/visa/cancel", &req).await?;
            print(&resp)?;
        }
        Cmd::Current {
            server,
            suite,
            branch,
        } => {
            let resp: CurrentVisaStatus = daemon
                .get(
                    "/v1/visa/current",
                    &[("server_id", server), ("suite_id", suite), ("branch", branch)],
                )
                .await?;
            print(&resp)?;
        }
        Cmd::Contributions { server } => {
            let resp: Vec<ContributionToCheck> = daemon
                .get("/v1/contributions", &[("server_id", server)])
                .await?;
            print(&resp)?;
        }
        Cmd::Status { server, id } => {
            let resp: Vec<ContributionCheckStatus> = daemon
                .get(
                    "/v1/contributions/status",
                    &[("server_id", server), ("pr_id", id.to_string())],
                )
                .await?;
            print(&resp)?;
        }
    }

    Ok(())
}
