//! Phoenix v1 JSON frames spoken by the realtime endpoint.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::tracker::Members;
use crate::{error::AppResult, models::PresenceMeta};

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_CLOSE: &str = "phx_close";
pub const PHX_ERROR: &str = "phx_error";
pub const PRESENCE: &str = "presence";
pub const PRESENCE_STATE: &str = "presence_state";
pub const PRESENCE_DIFF: &str = "presence_diff";
pub const HEARTBEAT: &str = "heartbeat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

pub fn topic_for(channel_key: &str) -> String {
    format!("realtime:{channel_key}")
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, reference: String) -> Self {
        Self { topic: topic.into(), event: event.into(), payload, reference: Some(reference) }
    }

    pub fn join(topic: &str, presence_key: &str, access_token: &str, reference: String) -> Self {
        let payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": presence_key },
                "postgres_changes": [],
            },
            "access_token": access_token,
        });
        Self::new(topic, PHX_JOIN, payload, reference)
    }

    pub fn track(topic: &str, meta: &PresenceMeta, reference: String) -> Self {
        let payload = json!({ "type": PRESENCE, "event": "track", "payload": meta });
        Self::new(topic, PRESENCE, payload, reference)
    }

    pub fn untrack(topic: &str, reference: String) -> Self {
        Self::new(topic, PRESENCE, json!({ "type": PRESENCE, "event": "untrack" }), reference)
    }

    pub fn leave(topic: &str, reference: String) -> Self {
        Self::new(topic, PHX_LEAVE, json!({}), reference)
    }

    pub fn heartbeat(reference: String) -> Self {
        Self::new("phoenix", HEARTBEAT, json!({}), reference)
    }

    /// `Some(ok?)` for a reply to `reference`, None for anything else.
    pub fn reply_to(&self, reference: &str) -> Option<bool> {
        if self.event != PHX_REPLY || self.reference.as_deref() != Some(reference) {
            return None;
        }
        Some(self.payload["status"] == "ok")
    }
}

/* ------------ roster ------------ */

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Meta {
    #[serde(default)]
    phx_ref:   Option<String>,
    #[serde(default)]
    online_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default)]
    metas: Vec<Meta>,
}

#[derive(Debug, Default, Deserialize)]
struct Diff {
    #[serde(default)]
    joins:  HashMap<String, Entry>,
    #[serde(default)]
    leaves: HashMap<String, Entry>,
}

/// Channel membership folded from `presence_state` and `presence_diff`.
#[derive(Debug, Default)]
pub struct Roster {
    entries: HashMap<String, Vec<Meta>>,
}

impl Roster {
    pub fn apply_state(&mut self, payload: &Value) -> AppResult<()> {
        let state: HashMap<String, Entry> = serde_json::from_value(payload.clone())?;
        self.entries = state
            .into_iter()
            .filter(|(_, e)| !e.metas.is_empty())
            .map(|(k, e)| (k, e.metas))
            .collect();
        Ok(())
    }

    pub fn apply_diff(&mut self, payload: &Value) -> AppResult<()> {
        let diff: Diff = serde_json::from_value(payload.clone())?;
        for (key, entry) in diff.joins {
            let metas = self.entries.entry(key).or_default();
            for m in entry.metas {
                if !metas.contains(&m) {
                    metas.push(m);
                }
            }
        }
        for (key, entry) in diff.leaves {
            if let Some(metas) = self.entries.get_mut(&key) {
                metas.retain(|m| !entry.metas.iter().any(|l| l.phx_ref == m.phx_ref));
                if metas.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Earliest `online_at` per key; `now` when no meta carries a usable one.
    pub fn members(&self, now: DateTime<Utc>) -> Members {
        self.entries
            .iter()
            .map(|(key, metas)| {
                let joined = metas
                    .iter()
                    .filter_map(|m| m.online_at.as_deref())
                    .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .min()
                    .unwrap_or(now);
                (key.clone(), joined)
            })
            .collect()
    }
}
