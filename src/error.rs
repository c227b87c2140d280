use axum::{http::StatusCode, response::IntoResponse};
use std::fmt::Display;

pub type AppResult<T> = Result<T, AppErr>;

/// Body browsers get when the backend misbehaves; the detail stays in the log.
pub const UPSTREAM_FAILED: &str = "Something went wrong. Please try again.";

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Bad request: {0}")]
    Bad(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests")]
    Throttled,

    #[error("Config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store answered {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("WS: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let (code, body) = match self {
            AppErr::Bad(msg)      => (StatusCode::BAD_REQUEST, msg),
            AppErr::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppErr::Throttled     => (StatusCode::TOO_MANY_REQUESTS, "slow down".to_string()),
            AppErr::Http(_) | AppErr::Remote { .. } | AppErr::Ws(_) => {
                tracing::warn!(error = %self, "upstream failure");
                (StatusCode::BAD_GATEWAY, UPSTREAM_FAILED.to_string())
            }
            other => {
                tracing::error!(error = %other, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (code, body).into_response()
    }
}

/* ── helpers: wrap any error as Bad / Config ── */
pub fn bad<E: Display>(e: E) -> AppErr { AppErr::Bad(e.to_string()) }

pub fn config<E: Display>(e: E) -> AppErr { AppErr::Config(e.to_string()) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_status() {
        assert_eq!(bad("x").into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppErr::NotFound("x".into()).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(AppErr::Throttled.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn backend_failures_map_to_bad_gateway_without_detail() {
        let resp = AppErr::Remote { status: 503, body: "relation \"profiles\" leaked".into() }.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], UPSTREAM_FAILED.as_bytes());

        let resp = config("SUPABASE_ANON_KEY missing").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("SUPABASE"));
    }
}
