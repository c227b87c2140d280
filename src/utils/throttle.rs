use std::time::{Duration, Instant};

use crate::state::{HitMap, Window};

/// Fixed-window limiter keyed by client address.
#[derive(Clone)]
pub struct Throttle {
    hits:   HitMap,
    limit:  u32,
    window: Duration,
}

impl Throttle {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { hits: HitMap::default(), limit, window }
    }

    /// Count one hit for `key`; false once the key is over its limit.
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.hits.write().await;
        if map.len() > 4096 {
            map.retain(|_, w| now.duration_since(w.opened) < self.window);
        }

        let w = map.entry(key.to_string()).or_insert(Window { opened: now, hits: 0 });
        if now.duration_since(w.opened) >= self.window {
            *w = Window { opened: now, hits: 0 };
        }
        w.hits += 1;
        w.hits <= self.limit
    }
}
