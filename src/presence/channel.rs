//! One realtime subscription per viewer: join, announce, count, leave.
use std::time::Duration;

use chrono::Utc;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use rand::Rng;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{
    protocol::{self, topic_for, Frame, Roster},
    tracker::{ConnState, PresenceTracker, PresenceView, Snapshot},
};
use crate::{config::Config, error::AppResult, models::PresenceMeta};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = SplitSink<Socket, Message>;

const HEARTBEAT: Duration = Duration::from_secs(25);
const MAX_DELAY: Duration = Duration::from_secs(30);
const LEAVE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum Command {
    Announce(PresenceMeta),
    Leave,
}

#[derive(Clone)]
pub struct PresenceClient {
    url:         String,
    token:       String,
    max_retries: u32,
    base_delay:  Duration,
    heartbeat:   Duration,
}

impl PresenceClient {
    pub fn new(url: &str, token: &str, max_retries: u32) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            max_retries: max_retries.max(1),
            base_delay: Duration::from_millis(500),
            heartbeat: HEARTBEAT,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.realtime_url(), &cfg.anon_key, cfg.presence_max_retries)
    }

    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    /// Heartbeat period; a heartbeat still unanswered at the next tick drops the socket.
    pub fn with_heartbeat(mut self, d: Duration) -> Self {
        self.heartbeat = d;
        self
    }

    /// Open a subscription to `channel_key` and start announcing this session.
    pub fn connect(&self, channel_key: &str) -> PresenceHandle {
        let (view_tx, view_rx) = watch::channel(PresenceView::connecting());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session = Session {
            client: self.clone(),
            topic: topic_for(channel_key),
            key: uuid::Uuid::new_v4().to_string(),
            tracker: PresenceTracker::new(channel_key),
            roster: Roster::default(),
            view_tx,
            cmds: cmd_rx,
            desired: PresenceMeta { online_at: Utc::now() },
            failures: 0,
            seq: 0,
            next_ref: 0,
        };
        let key = session.key.clone();
        tracing::debug!(channel = %channel_key, %key, "presence connect");
        PresenceHandle { key, view: view_rx, cmds: cmd_tx, task: tokio::spawn(session.run()) }
    }
}

/// Live subscription. Dropping it ends the session in the background;
/// [`PresenceHandle::disconnect`] ends it and waits.
pub struct PresenceHandle {
    key:  String,
    view: watch::Receiver<PresenceView>,
    cmds: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl PresenceHandle {
    /// Presence key this session joined under.
    pub fn session_key(&self) -> &str {
        &self.key
    }

    pub fn view(&self) -> PresenceView {
        *self.view.borrow()
    }

    /// Receiver that always holds the newest view; stale ones are overwritten.
    pub fn snapshots(&self) -> watch::Receiver<PresenceView> {
        self.view.clone()
    }

    /// Publish `meta` for this session. Re-announcing the same meta is a no-op.
    pub fn announce(&self, meta: PresenceMeta) {
        let _ = self.cmds.send(Command::Announce(meta));
    }

    /// Untrack, leave the channel and stop. No view is published after this returns.
    pub async fn disconnect(self) {
        let Self { cmds, mut task, key, .. } = self;
        let _ = cmds.send(Command::Leave);
        if time::timeout(LEAVE_GRACE, &mut task).await.is_err() {
            tracing::warn!(%key, "presence session slow to leave, aborting");
            task.abort();
            let _ = task.await;
        }
    }
}

enum Exit {
    Left,
    Dropped(String),
}

struct Session {
    client:   PresenceClient,
    topic:    String,
    key:      String,
    tracker:  PresenceTracker,
    roster:   Roster,
    view_tx:  watch::Sender<PresenceView>,
    cmds:     mpsc::UnboundedReceiver<Command>,
    desired:  PresenceMeta,
    failures: u32,
    seq:      u64,
    next_ref: u64,
}

impl Session {
    async fn run(mut self) {
        loop {
            self.set_state(ConnState::Connecting);

            let connect = tokio_tungstenite::connect_async(self.client.url.clone());
            tokio::pin!(connect);
            let conn = loop {
                tokio::select! {
                    r = &mut connect => break r,
                    cmd = self.cmds.recv() => if !self.absorb(cmd) { return self.close() },
                }
            };

            let reason = match conn {
                Ok((ws, _)) => match self.drive(ws).await {
                    Exit::Left => return self.close(),
                    Exit::Dropped(reason) => reason,
                },
                Err(e) => e.to_string(),
            };

            self.roster.clear();
            self.failures += 1;
            tracing::warn!(key = %self.key, attempt = self.failures, %reason, "presence channel down");
            if self.failures >= self.client.max_retries {
                self.set_state(ConnState::Error);
                tracing::error!(key = %self.key, "presence channel gave up");
                loop {
                    let cmd = self.cmds.recv().await;
                    if !self.absorb(cmd) {
                        return self.close();
                    }
                }
            }

            let sleep = time::sleep(self.backoff());
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = self.cmds.recv() => if !self.absorb(cmd) { return self.close() },
                }
            }
        }
    }

    /// Keep announce requests while not joined; false means leave.
    fn absorb(&mut self, cmd: Option<Command>) -> bool {
        match cmd {
            Some(Command::Announce(meta)) => {
                self.desired = meta;
                true
            }
            Some(Command::Leave) | None => false,
        }
    }

    async fn drive(&mut self, ws: Socket) -> Exit {
        let (mut write, mut read) = ws.split();
        let join_ref = self.reference();
        let join = Frame::join(&self.topic, &self.key, &self.client.token, join_ref.clone());
        if let Err(e) = send(&mut write, &join).await {
            return Exit::Dropped(e.to_string());
        }

        let every = self.client.heartbeat;
        let mut heartbeat = time::interval_at(time::Instant::now() + every, every);
        let mut pending_hb: Option<String> = None;
        let mut tracked: Option<PresenceMeta> = None;

        loop {
            tokio::select! {
                cmd = self.cmds.recv() => match cmd {
                    Some(Command::Announce(meta)) => {
                        self.desired = meta;
                        if tracked.is_some() {
                            if let Err(e) = self.announce(&mut write, &mut tracked).await {
                                return Exit::Dropped(e.to_string());
                            }
                        }
                    }
                    Some(Command::Leave) | None => {
                        self.leave(&mut write, tracked.is_some()).await;
                        return Exit::Left;
                    }
                },
                _ = heartbeat.tick() => {
                    if pending_hb.is_some() {
                        return Exit::Dropped("heartbeat timeout".into());
                    }
                    let reference = self.reference();
                    let hb = Frame::heartbeat(reference.clone());
                    if let Err(e) = send(&mut write, &hb).await {
                        return Exit::Dropped(e.to_string());
                    }
                    pending_hb = Some(reference);
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(t))) => t,
                        Some(Ok(Message::Close(_))) | None => return Exit::Dropped("socket closed".into()),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Exit::Dropped(e.to_string()),
                    };
                    let frame: Frame = match serde_json::from_str(text.as_str()) {
                        Ok(f) => f,
                        Err(e) => {
                            tracing::warn!(error = %e, "unreadable realtime frame");
                            continue;
                        }
                    };
                    if pending_hb.as_deref().is_some_and(|r| frame.reply_to(r).is_some()) {
                        pending_hb = None;
                        continue;
                    }
                    if frame.topic != self.topic {
                        continue;
                    }

                    if let Some(ok) = frame.reply_to(&join_ref) {
                        if !ok {
                            return Exit::Dropped(format!("join refused: {}", frame.payload));
                        }
                        self.failures = 0;
                        self.set_state(ConnState::Active);
                        if let Err(e) = self.announce(&mut write, &mut tracked).await {
                            return Exit::Dropped(e.to_string());
                        }
                        continue;
                    }

                    let applied = match frame.event.as_str() {
                        protocol::PRESENCE_STATE => self.roster.apply_state(&frame.payload),
                        protocol::PRESENCE_DIFF => self.roster.apply_diff(&frame.payload),
                        protocol::PHX_CLOSE | protocol::PHX_ERROR => {
                            return Exit::Dropped(frame.event.clone());
                        }
                        _ => continue,
                    };
                    match applied {
                        Ok(()) => self.sync(),
                        Err(e) => tracing::warn!(error = %e, "bad presence payload"),
                    }
                }
            }
        }
    }

    /// Track `desired` unless it is already what the channel holds for us.
    async fn announce(&mut self, write: &mut Writer, tracked: &mut Option<PresenceMeta>) -> AppResult<()> {
        if tracked.as_ref().is_some_and(|t| t.online_at == self.desired.online_at) {
            return Ok(());
        }
        let reference = self.reference();
        let frame = Frame::track(&self.topic, &self.desired, reference);
        send(write, &frame).await?;
        *tracked = Some(self.desired.clone());
        Ok(())
    }

    async fn leave(&mut self, write: &mut Writer, tracked: bool) {
        if tracked {
            let reference = self.reference();
            let untrack = Frame::untrack(&self.topic, reference);
            let _ = send(write, &untrack).await;
        }
        let reference = self.reference();
        let leave = Frame::leave(&self.topic, reference);
        let _ = send(write, &leave).await;
        let _ = write.close().await;
    }

    fn sync(&mut self) {
        self.seq += 1;
        let snap = Snapshot { seq: self.seq, members: self.roster.members(Utc::now()) };
        if self.tracker.apply_sync(snap) {
            self.publish();
        }
    }

    fn set_state(&mut self, state: ConnState) {
        if self.tracker.set_state(state) {
            self.publish();
        }
    }

    fn publish(&self) {
        let next = self.tracker.view();
        self.view_tx.send_if_modified(|v| {
            let changed = *v != next;
            *v = next;
            changed
        });
    }

    fn close(mut self) {
        self.tracker.close();
        tracing::debug!(key = %self.key, "presence session closed");
    }

    fn reference(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn backoff(&self) -> Duration {
        let exp = self.failures.saturating_sub(1).min(16);
        let delay = self.client.base_delay.saturating_mul(1 << exp).min(MAX_DELAY);
        let jitter = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 4);
        delay + Duration::from_millis(jitter)
    }
}

async fn send(write: &mut Writer, frame: &Frame) -> AppResult<()> {
    let text = serde_json::to_string(frame)?;
    write.send(Message::Text(text.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Map, Value};
    use tokio::{net::TcpListener, sync::oneshot};

    /// Local stand-in for the realtime endpoint. Acks the join and heartbeats (if told to),
    /// answers every track with a `presence_state` holding the caller plus
    /// `others`, forwards pushed frames, and reports what the client sent.
    async fn fake_realtime(
        others: Vec<&'static str>,
        ack_join: bool,
        answer_heartbeats: bool,
    ) -> (String, oneshot::Receiver<Vec<String>>, mpsc::UnboundedSender<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/realtime/v1/websocket", listener.local_addr().unwrap());
        let (seen_tx, seen_rx) = oneshot::channel();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            let Ok((tcp, _)) = listener.accept().await else { return };
            let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else { return };
            let (mut write, mut read) = ws.split();
            let mut seen = Vec::new();
            let mut topic = String::new();

            loop {
                tokio::select! {
                    Some(push) = push_rx.recv() => {
                        let frame = json!({ "topic": topic, "event": push["event"], "payload": push["payload"], "ref": null });
                        write.send(Message::Text(frame.to_string().into())).await.unwrap();
                    }
                    msg = read.next() => {
                        let Some(Ok(Message::Text(text))) = msg else { break };
                        let f: Frame = serde_json::from_str(text.as_str()).unwrap();
                        let label = if f.event == protocol::PRESENCE {
                            f.payload["event"].as_str().unwrap_or_default().to_string()
                        } else {
                            f.event.clone()
                        };
                        seen.push(label.clone());

                        let reply = match label.as_str() {
                            "phx_join" if ack_join => {
                                topic = f.topic.clone();
                                let key = f.payload["config"]["presence"]["key"].as_str().unwrap().to_string();
                                seen.push(format!("key:{}", !key.is_empty()));
                                json!({ "topic": topic, "event": "phx_reply", "payload": { "status": "ok", "response": {} }, "ref": f.reference })
                            }
                            "heartbeat" if answer_heartbeats => {
                                json!({ "topic": "phoenix", "event": "phx_reply", "payload": { "status": "ok", "response": {} }, "ref": f.reference })
                            }
                            "track" => {
                                let me = f.payload["payload"].clone();
                                let mut state = Map::new();
                                state.insert("me".into(), json!({ "metas": [{ "phx_ref": "me", "online_at": me["online_at"] }] }));
                                for o in &others {
                                    state.insert(o.to_string(), json!({ "metas": [{ "phx_ref": o }] }));
                                }
                                json!({ "topic": topic, "event": "presence_state", "payload": state, "ref": null })
                            }
                            _ => continue,
                        };
                        write.send(Message::Text(reply.to_string().into())).await.unwrap();
                    }
                }
            }
            let _ = seen_tx.send(seen);
        });

        (url, seen_rx, push_tx)
    }

    async fn wait_for(
        rx: &mut watch::Receiver<PresenceView>,
        pred: impl Fn(&PresenceView) -> bool,
    ) -> PresenceView {
        time::timeout(Duration::from_secs(5), async {
            loop {
                let v = *rx.borrow_and_update();
                if pred(&v) {
                    return v;
                }
                rx.changed().await.expect("session ended");
            }
        })
        .await
        .expect("timed out waiting for presence view")
    }

    #[tokio::test]
    async fn counts_follow_state_and_diff() {
        let (url, seen, push) = fake_realtime(vec!["other-1", "other-2"], true, true).await;
        let handle = PresenceClient::new(&url, "anon", 3).connect("online-status");
        let mut rx = handle.snapshots();

        let v = wait_for(&mut rx, |v| v.active == Some(3)).await;
        assert_eq!(v.state, ConnState::Active);

        push.send(json!({
            "event": "presence_diff",
            "payload": { "leaves": { "other-1": { "metas": [{ "phx_ref": "other-1" }] } } },
        }))
        .unwrap();
        wait_for(&mut rx, |v| v.active == Some(2)).await;

        handle.disconnect().await;
        assert_eq!(seen.await.unwrap(), vec!["phx_join", "key:true", "track", "untrack", "phx_leave"]);
    }

    #[tokio::test]
    async fn repeated_announce_tracks_once() {
        let (url, seen, _push) = fake_realtime(vec![], true, true).await;
        let handle = PresenceClient::new(&url, "anon", 3).connect("online-status");
        let mut rx = handle.snapshots();
        wait_for(&mut rx, |v| v.active == Some(1)).await;

        let meta = PresenceMeta { online_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() };
        handle.announce(meta.clone());
        handle.announce(meta);
        handle.disconnect().await;

        let seen = seen.await.unwrap();
        assert_eq!(seen.iter().filter(|e| *e == "track").count(), 2);
        assert_eq!(seen.last().map(String::as_str), Some("phx_leave"));
    }

    #[tokio::test]
    async fn disconnect_before_any_sync_is_quiet() {
        let (url, _seen, _push) = fake_realtime(vec![], false, true).await;
        let handle = PresenceClient::new(&url, "anon", 3).connect("online-status");
        let mut rx = handle.snapshots();
        rx.borrow_and_update();

        handle.disconnect().await;

        assert_eq!(rx.borrow().active, None);
        let after = time::timeout(Duration::from_secs(1), rx.changed()).await.unwrap();
        assert!(after.is_err(), "no view may follow a disconnect");
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_error_not_zero() {
        let client = PresenceClient::new("ws://127.0.0.1:9/realtime/v1/websocket", "anon", 2)
            .with_base_delay(Duration::from_millis(10));
        let handle = client.connect("online-status");
        let mut rx = handle.snapshots();

        let v = wait_for(&mut rx, |v| v.state == ConnState::Error).await;
        assert_eq!(v.active, None);
        handle.disconnect().await;
    }

    #[tokio::test]
    async fn answered_heartbeats_keep_the_channel_active() {
        let (url, seen, _push) = fake_realtime(vec!["other-1"], true, true).await;
        let handle = PresenceClient::new(&url, "anon", 1)
            .with_heartbeat(Duration::from_millis(30))
            .connect("online-status");
        let mut rx = handle.snapshots();
        wait_for(&mut rx, |v| v.active == Some(2)).await;

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.view(), PresenceView { state: ConnState::Active, active: Some(2) });

        handle.disconnect().await;
        let seen = seen.await.unwrap();
        assert!(seen.iter().filter(|e| *e == "heartbeat").count() >= 2);
    }

    #[tokio::test]
    async fn silent_peer_drops_the_count() {
        let (url, _seen, _push) = fake_realtime(vec!["other-1"], true, false).await;
        let handle = PresenceClient::new(&url, "anon", 1)
            .with_heartbeat(Duration::from_millis(30))
            .with_base_delay(Duration::from_millis(10))
            .connect("online-status");
        let mut rx = handle.snapshots();
        wait_for(&mut rx, |v| v.active == Some(2)).await;

        let v = wait_for(&mut rx, |v| v.state != ConnState::Active).await;
        assert_eq!(v.active, None);
        handle.disconnect().await;
    }
}
