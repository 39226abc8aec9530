//! routes/rooms.rs
use axum::{
    routing::get,
    extract::{Extension, Path, Json},
    Router,
};
use serde_json::{json, Value};

use crate::{
    channel::Channel,
    error::AppResult,
    state::Category,
};

pub fn router() -> Router {
    Router::new()
        .route("/",          get(all_rooms))
        .route("/:category", get(current_song))
}

/* ---------------- every room ---------------- */
async fn all_rooms(Extension(channel): Extension<Channel>) -> Json<Value> {
    Json(json!(channel.snapshot()))
}

/* ---------------- one room ---------------- */
async fn current_song(
    Path(category): Path<String>,
    Extension(channel): Extension<Channel>,
) -> AppResult<Json<Value>> {
    let category: Category = category.parse()?;

    Ok(Json(match channel.player(category).current() {
        Some(now) => json!(now),
        None      => json!({ "message": "No song is currently playing" }),
    }))
}
