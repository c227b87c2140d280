//! In-memory [`RemoteStore`] for tests.
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{RemoteStore, Rows, Select};
use crate::error::{AppErr, AppResult};

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    failing: AtomicBool,
    pub selects: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables.write().await.entry(table.into()).or_default().extend(rows);
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.read().await.get(table).cloned().unwrap_or_default()
    }

    /// Every call fails with a 503 while set.
    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, AtomicOrdering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(AppErr::Remote { status: 503, body: "unavailable".into() });
        }
        Ok(())
    }
}

fn field_str(row: &Value, col: &str) -> String {
    match &row[col] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, q: &Select) -> AppResult<Rows> {
        self.selects.fetch_add(1, AtomicOrdering::SeqCst);
        self.check()?;

        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(&q.table)
            .map(|t| {
                t.iter()
                    .filter(|r| q.filters.iter().all(|(c, v)| field_str(r, c) == *v))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((col, asc)) = &q.order {
            rows.sort_by(|a, b| {
                let o = field_str(a, col).cmp(&field_str(b, col));
                if *asc { o } else { o.reverse() }
            });
        }

        let count = q.count.then_some(rows.len() as u64);
        if let Some((from, to)) = q.range {
            let end = (to as usize + 1).min(rows.len());
            let start = (from as usize).min(end);
            rows = rows[start..end].to_vec();
        }
        if let Some(n) = q.limit {
            rows.truncate(n as usize);
        }
        if q.head {
            rows.clear();
        }
        Ok(Rows { rows, count })
    }

    async fn insert(&self, table: &str, row: Value) -> AppResult<()> {
        self.check()?;
        self.tables.write().await.entry(table.into()).or_default().push(row);
        Ok(())
    }
}
