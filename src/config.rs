use std::{env, path::PathBuf, time::Duration};

use crate::player::FALLBACK_DURATION;

/// Everything read from the environment (and `.env`) at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr:    String,
    pub songs_dir:    PathBuf,
    pub database_url: String,
    pub jwt_secret:   String,
    /// Delay used when a track's length can't be read.
    pub fallback:     Duration,
    /// Start every room at boot instead of on first join.
    pub autostart:    bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr:    "0.0.0.0:5000".into(),
            songs_dir:    PathBuf::from("songs"),
            database_url: "sqlite://moodcast.db?mode=rwc".into(),
            jwt_secret:   "mysecretkey".into(),
            fallback:     FALLBACK_DURATION,
            autostart:    false,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("bad value for {key}: `{value}`")]
pub struct ConfigErr {
    key:   &'static str,
    value: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigErr> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigErr> {
        let mut cfg = Config::default();

        if let Some(addr) = get("BIND_ADDR") {
            cfg.bind_addr = addr;
        } else if let Some(port) = get("PORT") {
            let port: u16 = port.parse().map_err(|_| ConfigErr { key: "PORT", value: port.clone() })?;
            cfg.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(dir) = get("SONGS_DIR")    { cfg.songs_dir = dir.into(); }
        if let Some(url) = get("DATABASE_URL") { cfg.database_url = url; }
        if let Some(s)   = get("JWT_SECRET")   { cfg.jwt_secret = s; }

        if let Some(v) = get("FALLBACK_SECS") {
            let secs: u64 = v.parse().map_err(|_| ConfigErr { key: "FALLBACK_SECS", value: v.clone() })?;
            cfg.fallback = Duration::from_secs(secs);
        }
        if let Some(v) = get("AUTOSTART_ROOMS") {
            cfg.autostart = match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on"  => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigErr { key: "AUTOSTART_ROOMS", value: v }),
            };
        }
        Ok(cfg)
    }
}
