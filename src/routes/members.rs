//! routes/members.rs
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, Json, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{AppErr, AppResult},
    feedback::{self, FeedbackView},
    members::{self, VerifyOutcome},
    state::{SharedConfig, SharedStore},
    utils::throttle::Throttle,
};

const DEFAULT_WALL: u64 = 9;

#[derive(Deserialize)]
struct EmailInput {
    email: String,
}

#[derive(Serialize)]
struct VerifyJson {
    status:  VerifyOutcome,
    message: &'static str,
}

#[derive(Deserialize)]
struct WallQuery {
    limit: Option<u64>,
}

#[derive(Deserialize)]
struct FeedbackInput {
    email:   String,
    message: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/members/verify", post(verify))
        .route("/feedback",       get(list_feedback).post(post_feedback))
}

async fn gate(
    throttle: &Throttle,
    cfg: &SharedConfig,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> AppResult<()> {
    let who = super::client_key(headers, peer.map(|c| c.0), &cfg.trusted_proxies);
    if throttle.allow(&who).await {
        Ok(())
    } else {
        tracing::warn!(%who, "lookup throttled");
        Err(AppErr::Throttled)
    }
}

/* ---------------- Verify ---------------- */
async fn verify(
    Extension(store):    Extension<SharedStore>,
    Extension(throttle): Extension<Throttle>,
    Extension(cfg):      Extension<SharedConfig>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(p): Json<EmailInput>,
) -> AppResult<Json<VerifyJson>> {
    gate(&throttle, &cfg, &headers, peer).await?;
    let status = members::verify_member(store.as_ref(), &p.email).await;
    Ok(Json(VerifyJson { status, message: status.message() }))
}

/* ---------------- Feedback wall ---------------- */
async fn list_feedback(
    Extension(store): Extension<SharedStore>,
    Query(q): Query<WallQuery>,
) -> Json<Vec<FeedbackView>> {
    let limit = q.limit.unwrap_or(DEFAULT_WALL).clamp(1, 100);
    match feedback::recent_feedback(store.as_ref(), limit).await {
        Ok(wall) => Json(wall),
        Err(e) => {
            tracing::warn!(error = %e, "feedback wall unavailable");
            Json(Vec::new())
        }
    }
}

async fn post_feedback(
    Extension(store):    Extension<SharedStore>,
    Extension(throttle): Extension<Throttle>,
    Extension(cfg):      Extension<SharedConfig>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(p): Json<FeedbackInput>,
) -> AppResult<impl IntoResponse> {
    gate(&throttle, &cfg, &headers, peer).await?;
    feedback::submit_feedback(store.as_ref(), &p.email, &p.message).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Salamat! Your feedback has been posted successfully." })),
    ))
}
