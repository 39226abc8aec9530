use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::Category;

pub type AppResult<T> = Result<T, AppErr>;

/* ---------- HTTP surface ---------- */
#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Invalid mood: {0}")]
    InvalidCategory(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("DB: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Hash: {0}")]
    Hash(String),
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let code = match &self {
            AppErr::InvalidCategory(_) => StatusCode::BAD_REQUEST,
            // 400, not 401: don't tell which half of the login was wrong
            AppErr::Unauthorized(_) => StatusCode::BAD_REQUEST,
            other => {
                tracing::error!("request failed: {other}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<UnknownCategory> for AppErr {
    fn from(e: UnknownCategory) -> Self {
        AppErr::InvalidCategory(e.0)
    }
}

/* ---------- room core ---------- */

/// A category name outside the fixed set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

/// Errors raised inside a room's playback loop. None of them are fatal:
/// the room logs them and either stays put or falls back to a fixed delay.
#[derive(thiserror::Error, Debug)]
pub enum PlayerErr {
    #[error("no playable tracks in `{0}`")]
    CatalogEmpty(Category),

    #[error("can't read duration of `{track}`: {reason}")]
    MetadataUnreadable { track: String, reason: String },

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

pub type PlayerResult<T> = Result<T, PlayerErr>;
