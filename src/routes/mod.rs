use std::net::{IpAddr, SocketAddr};

use axum::{http::HeaderMap, routing::get, Router};

pub mod members;
pub mod stats;
pub mod ws;

pub fn router() -> Router {
    Router::new()
        .nest("/api",  stats::router().merge(members::router()))
        .nest("/ws",   ws::router())
        .route("/download", get(stats::download))
}

/// Address of the caller. `X-Forwarded-For` is only read when the socket peer
/// is a trusted proxy; then the rightmost hop that is not itself a proxy wins.
pub fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> Option<IpAddr> {
    let peer = peer.map(|p| p.ip());
    if !peer.is_some_and(|ip| trusted.contains(&ip)) {
        return peer;
    }
    let hops = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()).unwrap_or_default();
    for hop in hops.rsplit(',') {
        match hop.trim().parse::<IpAddr>() {
            Ok(ip) if trusted.contains(&ip) => continue,
            Ok(ip) => return Some(ip),
            Err(_) => break,
        }
    }
    peer
}

/// Public address of the caller; loopback and private ranges give None.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> Option<IpAddr> {
    client_addr(headers, peer, trusted).filter(|ip| match ip {
        IpAddr::V4(v4) => !(v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()),
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    })
}

/// Throttle key for a caller; unknown callers share one bucket.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> String {
    client_addr(headers, peer, trusted)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".into())
}
