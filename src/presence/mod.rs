//! "Active now" counting over the backend's presence channel.
pub mod channel;
pub mod protocol;
pub mod tracker;

pub use channel::{PresenceClient, PresenceHandle};
pub use tracker::{ConnState, PresenceSet, PresenceTracker, PresenceView, Snapshot};
