use axum::{routing::get, Router};

pub mod auth;
pub mod rooms;
pub mod ws;

pub fn router() -> Router {
    Router::new()
        .route("/",       get(|| async { "Hello, mood rooms are running" }))
        .nest("/rooms",   rooms::router())
        .nest("/api/auth", auth::router())
        .nest("/ws",      ws::router())
}
