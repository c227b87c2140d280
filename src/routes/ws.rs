use axum::{
    Router, routing::get, response::IntoResponse,
    extract::{ws::{WebSocketUpgrade, WebSocket, Message}, Extension},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use crate::{presence::{PresenceClient, PresenceView}, state::SharedConfig};

pub fn router() -> Router {
    Router::new().route("/live", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(presence): Extension<PresenceClient>,
    Extension(cfg): Extension<SharedConfig>,
) -> impl IntoResponse {
    let channel = cfg.presence_channel.clone();
    ws.on_upgrade(move |s| viewer_ws(s, presence, channel))
}

/* ---------------- per viewer: one presence subscription ---------------- */
async fn viewer_ws(sock: WebSocket, presence: PresenceClient, channel: String) {
    let handle = presence.connect(&channel);
    let mut views = handle.snapshots();
    let (mut tx, mut rx) = sock.split();

    let first = *views.borrow_and_update();
    if tx.send(Message::Text(view_msg(&first))).await.is_ok() {
        loop {
            tokio::select! {
                changed = views.changed() => {
                    if changed.is_err() { break; }
                    let v = *views.borrow_and_update();
                    if tx.send(Message::Text(view_msg(&v))).await.is_err() { break; }
                }
                incoming = rx.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /* viewer gone: leave the channel */
    handle.disconnect().await;
}

fn view_msg(v: &PresenceView) -> String {
    json!({ "type": "presence", "state": v.state, "active": v.active }).to_string()
}
