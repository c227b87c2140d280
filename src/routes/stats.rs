//! routes/stats.rs
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Extension, Json},
    http::HeaderMap,
    response::Redirect,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    geo::GeoLookup,
    growth::{self, GrowthReport},
    members,
    state::{GrowthCache, SharedConfig, SharedStore},
};

/// Shown when the registry cannot be counted.
pub const FALLBACK_DISPLAY: &str = "5,000";

#[derive(Serialize)]
struct UserCount {
    count:   Option<u64>,
    display: String,
}

#[derive(Serialize)]
struct GrowthJson {
    #[serde(flatten)]
    report: GrowthReport,
    stale:  bool,
}

pub fn router() -> Router {
    Router::new()
        .route("/stats/users",      get(user_count))
        .route("/analytics/growth", get(growth_series))
        .route("/location",         get(location))
        .route("/download",         get(download_info))
}

/* ---------------- registered users ---------------- */
async fn user_count(Extension(store): Extension<SharedStore>) -> Json<UserCount> {
    match members::count_members(store.as_ref()).await {
        Ok(n) => Json(UserCount { count: Some(n), display: group_thousands(n) }),
        Err(e) => {
            tracing::warn!(error = %e, "user count unavailable");
            Json(UserCount { count: None, display: FALLBACK_DISPLAY.into() })
        }
    }
}

pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/* ---------------- growth chart ---------------- */
async fn growth_series(
    Extension(store): Extension<SharedStore>,
    Extension(cache): Extension<GrowthCache>,
    Extension(cfg):   Extension<SharedConfig>,
) -> Json<GrowthJson> {
    {
        let slot = cache.read().await;
        if let Some(report) = &slot.report {
            return Json(GrowthJson { report: report.clone(), stale: slot.stale });
        }
    }

    // nothing cached yet: fetch inline once
    match growth::refresh(store.as_ref(), &cache, cfg.growth_offset).await {
        Ok(report) => Json(GrowthJson { report, stale: false }),
        Err(_)     => Json(GrowthJson { report: GrowthReport::placeholder(), stale: true }),
    }
}

/* ---------------- footer location ---------------- */
async fn location(
    Extension(geo): Extension<GeoLookup>,
    Extension(cfg): Extension<SharedConfig>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Json<Value> {
    let ip = super::client_ip(&headers, peer.map(|c| c.0), &cfg.trusted_proxies).map(|ip| ip.to_string());
    Json(json!({ "location": geo.locate(ip.as_deref()).await }))
}

/* ---------------- installer ---------------- */
async fn download_info(Extension(cfg): Extension<SharedConfig>) -> Json<Value> {
    Json(json!({ "url": cfg.apk_url, "version": "1.0.0" }))
}

pub async fn download(Extension(cfg): Extension<SharedConfig>) -> Redirect {
    tracing::info!("installer download");
    Redirect::temporary(&cfg.apk_url)
}
