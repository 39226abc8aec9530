//! Where a room's tracks come from.
use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    units::TimeBase,
};
use tokio::fs;

use crate::{
    error::{PlayerErr, PlayerResult},
    state::Category,
};

/// One resolved rotation step. Immutable once handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub name: String,
    pub url:  String,
}

impl Track {
    pub fn new(category: Category, name: impl Into<String>) -> Self {
        let name = name.into();
        let url  = format!("/songs/{category}/{name}");
        Self { name, url }
    }
}

/// Source of tracks for the room players.
///
/// `list_tracks` is called on every rotation step so files added to a
/// category show up without a restart.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Ordered track names for `category`. An empty list is `CatalogEmpty`.
    async fn list_tracks(&self, category: Category) -> PlayerResult<Vec<String>>;

    /// Real playback length of a track, or `MetadataUnreadable`.
    async fn track_length(&self, category: Category, name: &str) -> PlayerResult<Duration>;
}

/* ---------------- directory backed ---------------- */

/// `root/<category>/*.mp3`
#[derive(Debug, Clone)]
pub struct DirCatalog {
    root: PathBuf,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir(&self, category: Category) -> PathBuf {
        self.root.join(category.as_str())
    }
}

#[async_trait::async_trait]
impl Catalog for DirCatalog {
    async fn list_tracks(&self, category: Category) -> PlayerResult<Vec<String>> {
        let mut entries = match fs::read_dir(self.dir(category)).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlayerErr::CatalogEmpty(category));
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else { continue };
            if !name.ends_with(".mp3") { continue; }
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                names.push(name);
            }
        }

        if names.is_empty() {
            return Err(PlayerErr::CatalogEmpty(category));
        }
        // read_dir order is platform dependent
        names.sort();
        Ok(names)
    }

    async fn track_length(&self, category: Category, name: &str) -> PlayerResult<Duration> {
        let path  = self.dir(category).join(name);
        let track = name.to_string();

        // symphonia does blocking reads
        tokio::task::spawn_blocking(move || read_duration(&path))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r)
            .map_err(|reason| PlayerErr::MetadataUnreadable { track, reason })
    }
}

/// Reads the container header only; nothing is decoded.
fn read_duration(path: &Path) -> Result<Duration, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mss  = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| e.to_string())?;

    let track  = probed.format.default_track().ok_or("no default track")?;
    let params = &track.codec_params;

    let frames = params.n_frames.ok_or("frame count unknown")?;
    let tb = params
        .time_base
        .or_else(|| params.sample_rate.map(|r| TimeBase::new(1, r)))
        .ok_or("time base unknown")?;

    let t = tb.calc_time(frames);
    let d = Duration::from_secs(t.seconds) + Duration::from_secs_f64(t.frac);
    if d.is_zero() {
        return Err("zero length".into());
    }
    Ok(d)
}

/* ---------------- in-memory (tests) ---------------- */
