use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_RANGE, Client, RequestBuilder, Response};
use serde_json::Value;

use super::{RemoteStore, Rows, Select};
use crate::{
    config::Config,
    error::{AppErr, AppResult},
};

const TIMEOUT: Duration = Duration::from_secs(10);

/// PostgREST client for the managed backend.
pub struct RestStore {
    http: Client,
    base: String,
    key: String,
}

impl RestStore {
    pub fn new(cfg: &Config) -> AppResult<Self> {
        let http = Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self {
            http,
            base: format!("{}/rest/v1", cfg.supabase_url),
            key: cfg.anon_key.clone(),
        })
    }

    fn auth(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.key).bearer_auth(&self.key)
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn select(&self, q: &Select) -> AppResult<Rows> {
        let url = format!("{}/{}", self.base, q.table);
        let mut req = if q.head { self.http.head(&url) } else { self.http.get(&url) };
        req = self.auth(req).query(&q.params());
        if q.count {
            req = req.header("Prefer", "count=exact");
        }
        if let Some((from, to)) = q.range {
            req = req
                .header("Range-Unit", "items")
                .header("Range", format!("{from}-{to}"));
        }

        let resp = ensure_ok(req.send().await?).await?;
        let count = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        let rows = if q.head { Vec::new() } else { resp.json::<Vec<Value>>().await? };
        tracing::debug!(table = %q.table, rows = rows.len(), ?count, "select");
        Ok(Rows { rows, count })
    }

    async fn insert(&self, table: &str, row: Value) -> AppResult<()> {
        let url = format!("{}/{table}", self.base);
        let req = self
            .auth(self.http.post(&url))
            .header("Prefer", "return=minimal")
            .json(&row);
        ensure_ok(req.send().await?).await?;
        tracing::debug!(%table, "insert");
        Ok(())
    }
}

async fn ensure_ok(resp: Response) -> AppResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AppErr::Remote { status: status.as_u16(), body })
}

/// Total from `Content-Range: 0-24/3573` (or `*/0`). `*` totals yield `None`.
pub fn parse_content_range(raw: &str) -> Option<u64> {
    raw.rsplit_once('/')?.1.trim().parse().ok()
}
