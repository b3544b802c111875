//! HTTP surface served on an ephemeral port.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeCi, FakeSource, FakeTracker, Fixture, SERVER};
use signoff_core::api::{CancelRequest, CancelResponse, CurrentVisaStatus};
use signoff_daemon::history::InMemoryVisaHistory;
use signoff_daemon::http;
use signoff_daemon::service::SignOffService;

async fn serve() -> String {
    let fx = Fixture::new(FakeCi::new(), FakeSource::new("ignite-"), FakeTracker::new());
    let svc = Arc::new(SignOffService::new(
        Arc::new(fx.registry()),
        Arc::new(InMemoryVisaHistory::new()),
        Duration::from_secs(3600),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, http::router(svc)).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_and_current_visa() {
    let base = serve().await;
    let client = reqwest::Client::new();

    let body = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");

    let current: CurrentVisaStatus = client
        .get(format!(
            "{base}/v1/visa/current?server_id={SERVER}&suite_id=RunAll&branch=ignite-1"
        ))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current.blockers, 0);
}

#[tokio::test]
async fn unknown_server_is_not_found() {
    let base = serve().await;
    let resp = reqwest::Client::new()
        .get(format!("{base}/v1/contributions?server_id=missing"))
        .header(http::USER_HEADER, "dev")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unknown server: missing");
}

#[tokio::test]
async fn cancel_without_observation() {
    let base = serve().await;
    let resp: CancelResponse = reqwest::Client::new()
        .post(format!("{base}/v1/visa/cancel"))
        .json(&CancelRequest {
            server_id: SERVER.into(),
            branch: "pull/1/head".into(),
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!resp.cancelled);
}
