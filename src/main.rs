mod auth;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod notifications;
mod permissions;
mod routes;
mod scheduling;

use std::sync::Arc;

use crate::config::{Config, EnvChannelSettings};
use crate::models::AppState;
use crate::notifications::{
    NotificationDispatcher, channels::HttpNotificationGateway, realtime::RealtimeHub,
};
use crate::scheduling::{Stores, booking::SchedulingService};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let stores = Stores::postgres(pool.clone());
    let gateway = Arc::new(HttpNotificationGateway::new(cfg.notification_service_url.clone()));
    let realtime = RealtimeHub::new();
    let dispatcher = Arc::new(NotificationDispatcher::new(
        stores.clone(),
        gateway.clone(),
        gateway,
        realtime.clone(),
        Arc::new(EnvChannelSettings),
        cfg.default_phone_country_code.clone(),
    ));

    let state = AppState {
        db: pool,
        session_ttl_hours: cfg.session_ttl_hours,
        scheduling: Arc::new(SchedulingService::new(stores.clone(), dispatcher)),
        stores,
        realtime,
    };

    // public booking pages are served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(
        notification_service = %cfg.notification_service_url,
        "Listening on http://{}",
        cfg.bind_addr
    );
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
