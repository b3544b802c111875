use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use signoff_core::api::{
    CancelRequest, CancelResponse, ContributionStatusQuery, ContributionToCheck,
    CurrentVisaQuery, CurrentVisaStatus, MutesQuery, ServerQuery, SimpleResult, TriggerRequest,
    VisaCommentRequest, VisaStatus,
};
use signoff_core::model::{ContributionCheckStatus, Credentials, MuteInfo};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::collab::RegistryError;
use crate::service::SignOffService;

/// Header carrying the calling user's name.
pub const USER_HEADER: &str = "x-signoff-user";

#[derive(Clone)]
pub struct AppState {
    svc: Arc<SignOffService>,
}

pub fn router(svc: Arc<SignOffService>) -> Router {
    let state = AppState { svc };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/visas", get(visas))
        .route("/v1/mutes", get(mutes))
        .route("/v1/visa/trigger", post(trigger))
        .route("/v1/visa/comment", post(comment))
        .route("/v1/visa/cancel", get(cancel_query).post(cancel))
        .route("/v1/visa/current", get(current))
        .route("/v1/contributions", get(contributions))
        .route("/v1/contributions/status", get(contribution_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn credentials(headers: &HeaderMap) -> Credentials {
    let user = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous");
    Credentials::user(user)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn visas(
    State(st): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ServerQuery>,
) -> Result<Json<Vec<VisaStatus>>, AppError> {
    let res = st
        .svc
        .list_visa_statuses(&q.server_id, &credentials(&headers))
        .await?;
    Ok(Json(res))
}

async fn mutes(
    State(st): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<MutesQuery>,
) -> Result<Json<Vec<MuteInfo>>, AppError> {
    let res = st
        .svc
        .list_mutes(&q.server_id, &q.project_id, &credentials(&headers))
        .await?;
    Ok(Json(res))
}

async fn trigger(
    State(st): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TriggerRequest>,
) -> Result<Json<SimpleResult>, AppError> {
    let res = st
        .svc
        .trigger_and_observe(&credentials(&headers), &req)
        .await?;
    Ok(Json(res))
}

async fn comment(
    State(st): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VisaCommentRequest>,
) -> Result<Json<SimpleResult>, AppError> {
    let res = st
        .svc
        .notify_jira_and_record(&credentials(&headers), &req)
        .await?;
    Ok(Json(res))
}

async fn cancel(
    State(st): State<AppState>,
    Json(req): Json<CancelRequest>,
) -> Json<CancelResponse> {
    Json(st.svc.cancel_observation(&req.server_id, &req.branch))
}

async fn cancel_query(
    State(st): State<AppState>,
    Query(req): Query<CancelRequest>,
) -> Json<CancelResponse> {
    Json(st.svc.cancel_observation(&req.server_id, &req.branch))
}

async fn current(
    State(st): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<CurrentVisaQuery>,
) -> Result<Json<CurrentVisaStatus>, AppError> {
    let res = st
        .svc
        .current_visa_status(&q.server_id, &credentials(&headers), &q.suite_id, &q.branch)
        .await?;
    Ok(Json(res))
}

async fn contributions(
    State(st): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ServerQuery>,
) -> Result<Json<Vec<ContributionToCheck>>, AppError> {
    let res = st
        .svc
        .list_contributions(&q.server_id, &credentials(&headers))
        .await?;
    Ok(Json(res))
}

async fn contribution_status(
    State(st): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ContributionStatusQuery>,
) -> Result<Json<Vec<ContributionCheckStatus>>, AppError> {
    let res = st
        .svc
        .contribution_statuses(&q.server_id, &credentials(&headers), q.pr_id)
        .await?;
    Ok(Json(res))
}

#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(value: E) -> Self {
        Self(value.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<RegistryError>().is_some() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        tracing::error!(error = %self.0, status = %status, "request failed");
        let body = Json(serde_json::json!({
            "error": self.0.to_string()
        }));
        (status, body).into_response()
    }
}
