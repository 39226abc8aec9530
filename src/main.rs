mod catalog;
mod channel;
mod config;
mod db;
mod error;
mod player;
mod state;
mod utils {
    pub mod jwt;
}
mod routes;

use std::sync::Arc;

use axum::{Extension, extract::DefaultBodyLimit};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir};
use tracing_subscriber::EnvFilter;

use crate::{catalog::DirCatalog, channel::Channel, config::Config, state::Category};

const BODY_LIMIT: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg     = Config::from_env()?;
    let pool    = db::connect(&cfg.database_url).await?;
    let catalog = DirCatalog::new(cfg.songs_dir.clone());

    // 啟動三個房間 (idle until someone joins unless autostart)
    let channel = Channel::start(Arc::new(catalog), cfg.fallback);
    if cfg.autostart {
        for c in Category::ALL {
            channel.player(c).start();
        }
    }

    let app = routes::router()
        .nest_service("/songs", ServeDir::new(&cfg.songs_dir))
        .layer(Extension(pool))
        .layer(Extension(channel.clone()))
        .layer(Extension(cfg.clone()))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;

    channel.shutdown();
    Ok(())
}
