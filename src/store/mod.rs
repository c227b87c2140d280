//! Boundary to the managed backend: row reads and inserts.
//!
//! Handlers only ever see [`RemoteStore`]; the REST client is built once in
//! `main` and handed around as a [`SharedStore`].
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AppResult;

pub mod query;
pub mod rest;
#[cfg(test)]
pub mod memory;

pub use query::Select;
pub use rest::RestStore;

pub type SharedStore = Arc<dyn RemoteStore>;

/// Result of a select: raw rows plus the exact count when one was asked for.
#[derive(Debug, Default, Clone)]
pub struct Rows {
    pub rows: Vec<Value>,
    pub count: Option<u64>,
}

impl Rows {
    /// Parse every row into `T`, rejecting the whole batch on the first bad row.
    pub fn parse<T: DeserializeOwned>(self) -> AppResult<Vec<T>> {
        self.rows
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, q: &Select) -> AppResult<Rows>;
    async fn insert(&self, table: &str, row: Value) -> AppResult<()>;
}
