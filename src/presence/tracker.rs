//! Local view of who is on the presence channel.
//!
//! The tracker is owned by exactly one session task; every snapshot it sees
//! replaces the member map wholesale.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub type Members = HashMap<String, DateTime<Utc>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    Connecting,
    Active,
    Error,
}

/// session key -> joined at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceSet {
    pub channel_key: String,
    pub members:     Members,
}

impl PresenceSet {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Full membership as delivered by the channel. `seq` is assigned on arrival.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub seq:     u64,
    pub members: Members,
}

/// What a UI should render. `active` is only known while the channel is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceView {
    pub state:  ConnState,
    pub active: Option<usize>,
}

impl PresenceView {
    pub fn connecting() -> Self {
        Self { state: ConnState::Connecting, active: None }
    }
}

pub struct PresenceTracker {
    set:      PresenceSet,
    state:    ConnState,
    last_seq: Option<u64>,
    closed:   bool,
}

impl PresenceTracker {
    pub fn new(channel_key: &str) -> Self {
        Self {
            set: PresenceSet { channel_key: channel_key.into(), members: Members::new() },
            state: ConnState::Connecting,
            last_seq: None,
            closed: false,
        }
    }

    /// Replace membership with `snap`. Returns false when it was dropped:
    /// the tracker is closed, or a snapshot with a later arrival seq already landed.
    pub fn apply_sync(&mut self, snap: Snapshot) -> bool {
        if self.closed || self.last_seq.is_some_and(|s| snap.seq <= s) {
            return false;
        }
        self.last_seq = Some(snap.seq);
        self.set.members = snap.members;
        true
    }

    /// Leaving `Active` forgets the members; they are re-sent after a rejoin.
    pub fn set_state(&mut self, state: ConnState) -> bool {
        if self.closed || self.state == state {
            return false;
        }
        if state != ConnState::Active {
            self.set.members.clear();
        }
        self.state = state;
        true
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.set.members.clear();
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn members(&self) -> &PresenceSet {
        &self.set
    }

    pub fn view(&self) -> PresenceView {
        PresenceView {
            state: self.state,
            active: (self.state == ConnState::Active).then(|| self.set.len()),
        }
    }
}
