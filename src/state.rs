use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::UnknownCategory;

/* ------------ rooms ------------ */

/// The fixed set of rooms. Each one lives for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Happy,
    Sad,
    Chill,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Happy, Category::Sad, Category::Chill];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Happy => "happy",
            Category::Sad   => "sad",
            Category::Chill => "chill",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/* ------------ playback snapshot ------------ */

/// What a room is playing right now. Track and start time travel together,
/// so a reader never sees one without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub name:       String,
    pub url:        String,
    pub start_time: DateTime<Utc>,
}

/* ------------ chat ------------ */

/// Never stored; fanned out once and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub message:  String,
    pub room:     Category,
}

/* ------------ wire (server -> client) ------------ */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewSong(NowPlaying),
    ReceiveMessage { username: String, message: String },
}

impl From<ChatMessage> for ServerEvent {
    fn from(m: ChatMessage) -> Self {
        ServerEvent::ReceiveMessage { username: m.username, message: m.message }
    }
}

/* ------------ connections ------------ */

pub type ClientId = Uuid;
pub type Outbox   = mpsc::Sender<ServerEvent>;
