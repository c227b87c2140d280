use chrono::FixedOffset;
use tokio::time;

use crate::{growth, state::{GrowthCache, SharedStore}};

/// Re-fetch the growth series every `every`; failures keep the old series.
pub async fn task(store: SharedStore, cache: GrowthCache, tz: FixedOffset, every: time::Duration) {
    let mut tick = time::interval(every);
    tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        let _ = growth::refresh(store.as_ref(), &cache, tz).await;
    }
}
