use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::sync::RwLock;

use crate::{config::Config, growth::GrowthReport};

pub use crate::store::SharedStore;

pub type SharedConfig = Arc<Config>;

/* ------------ growth series ------------ */
#[derive(Default)]
pub struct GrowthSlot {
    pub report: Option<GrowthReport>,
    pub stale:  bool,          // latest refresh failed, report is the previous one
}
pub type GrowthCache = Arc<RwLock<GrowthSlot>>;

/* ------------ lookup throttle ------------ */
pub struct Window {
    pub opened: Instant,
    pub hits:   u32,
}
pub type HitMap = Arc<RwLock<HashMap<String, Window>>>;
