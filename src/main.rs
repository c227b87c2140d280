use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{Router, Extension, extract::DefaultBodyLimit};
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use moneyga_site::{
    config::Config,
    geo::GeoLookup,
    presence::PresenceClient,
    routes,
    state::{GrowthCache, SharedStore},
    store::RestStore,
    utils::{refresh, throttle::Throttle},
};

const BODY_LIMIT: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg   = Arc::new(Config::from_env().context("loading configuration")?);
    let store: SharedStore = Arc::new(RestStore::new(&cfg)?);
    let growth = GrowthCache::default();
    let geo   = GeoLookup::new(&cfg.geo_lookup_url, &cfg.default_location)?;
    let throttle = Throttle::new(cfg.lookup_limit, cfg.lookup_window);
    let presence = PresenceClient::from_config(&cfg);

    tokio::spawn(refresh::task(store.clone(), growth.clone(), cfg.growth_offset, cfg.growth_refresh));

    let app = Router::new()
        .merge(routes::router())
        .fallback_service(ServeDir::new("static"))
        .layer(Extension(store))
        .layer(Extension(growth))
        .layer(Extension(geo))
        .layer(Extension(throttle))
        .layer(Extension(presence))
        .layer(Extension(cfg.clone()))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http());

    tracing::info!(addr = %cfg.bind_addr, channel = %cfg.presence_channel, "moneyga-site listening");
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
