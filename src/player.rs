//! One playback loop per room.
//!
//! Each room is a single task that owns its rotation cursor and current
//! track. Timer fires, first-join starts and manual advances all go through
//! the same command queue, so two advances for one room never overlap.
//! Rooms share nothing with each other.
use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    catalog::{Catalog, Track},
    channel::Members,
    error::PlayerErr,
    state::{Category, NowPlaying},
};

/// Used when a track's length can't be read from its metadata.
pub const FALLBACK_DURATION: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Advance only if nothing has been played yet.
    Start,
    /// Advance unconditionally.
    Advance,
}

/// Cheap cloneable handle to a running room.
#[derive(Clone)]
pub struct PlayerHandle {
    category: Category,
    commands: mpsc::UnboundedSender<Command>,
    state:    watch::Receiver<Option<NowPlaying>>,
}

impl PlayerHandle {
    /// Current track and its start time, `None` while idle. Pure read.
    pub fn current(&self) -> Option<NowPlaying> {
        self.state.borrow().clone()
    }

    /// Start playback if the room is idle; no-op otherwise.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Skip to the next track now.
    pub fn advance(&self) {
        self.send(Command::Advance);
    }

    fn send(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            debug!(room = %self.category, ?cmd, "room player already stopped");
        }
    }
}

/// Owned state of one room. Lives inside its task only.
struct RoomPlayer {
    category: Category,
    catalog:  Arc<dyn Catalog>,
    members:  Members,
    fallback: Duration,
    cursor:   usize,
    current:  Option<Track>,
    state:    watch::Sender<Option<NowPlaying>>,
    /// When the pending advance fires; `None` = no timer armed.
    deadline: Option<Instant>,
}

/// Spawn the task for `category` and return its handle.
pub fn spawn(
    category: Category,
    catalog:  Arc<dyn Catalog>,
    members:  Members,
    fallback: Duration,
    shutdown: watch::Receiver<bool>,
) -> (PlayerHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx)     = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(None);

    let player = RoomPlayer {
        category,
        catalog,
        members,
        fallback,
        cursor: 0,
        current: None,
        state: state_tx,
        deadline: None,
    };
    let task = tokio::spawn(player.run(cmd_rx, shutdown));

    (PlayerHandle { category, commands: cmd_tx, state: state_rx }, task)
}

impl RoomPlayer {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!(room = %self.category, "room player up");
        loop {
            let deadline = self.deadline;
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Start) if self.current.is_some() => {
                        debug!(room = %self.category, "already playing, start ignored");
                    }
                    Some(_) => self.advance().await,
                    None => break,
                },
                _ = async { sleep_until(deadline.unwrap_or_else(Instant::now)).await },
                    if deadline.is_some() => {
                    self.advance().await;
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() { break; }
                }
            }
        }
        // dropping the task drops any armed timer
        info!(room = %self.category, "room player stopped");
    }

    /// One rotation step: pick, publish, then arm the next timer.
    async fn advance(&mut self) {
        let category = self.category;
        let listed = self.catalog.list_tracks(category).await.and_then(|n| {
            if n.is_empty() { Err(PlayerErr::CatalogEmpty(category)) } else { Ok(n) }
        });
        let names = match listed {
            Ok(n) => n,
            Err(e) => {
                // keep whatever is current; the next start/advance retries
                warn!(room = %category, error = %e, "no playback possible");
                self.deadline = None;
                return;
            }
        };

        let name = names[self.cursor % names.len()].clone();
        self.cursor = (self.cursor + 1) % names.len();

        let track   = Track::new(self.category, name);
        let started = Instant::now();
        let now     = NowPlaying {
            name:       track.name.clone(),
            url:        track.url.clone(),
            start_time: Utc::now(),
        };
        self.current = Some(track.clone());
        self.state.send_replace(Some(now.clone()));

        info!(room = %self.category, track = %track.name, "now playing");
        self.members.broadcast_state_change(self.category, now).await;

        // only the next delay waits on the metadata read
        let length = match self.catalog.track_length(self.category, &track.name).await {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    room = %self.category, error = %e,
                    "using fallback of {}s", self.fallback.as_secs()
                );
                self.fallback
            }
        };
        debug!(room = %self.category, ms = length.as_millis() as u64, "next advance armed");
        self.deadline = Some(started + length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::memory::MemoryCatalog,
        state::{ClientId, ServerEvent},
    };
    use tokio::{sync::mpsc::Receiver, time::timeout};
    use uuid::Uuid;

    struct Room {
        handle:   PlayerHandle,
        members:  Members,
        _stop:    watch::Sender<bool>,
        task:     JoinHandle<()>,
    }

    fn room(catalog: Arc<MemoryCatalog>, category: Category) -> Room {
        let members = Members::default();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (handle, task) = spawn(category, catalog, members.clone(), FALLBACK_DURATION, stop_rx);
        Room { handle, members, _stop: stop_tx, task }
    }

    async fn listener(members: &Members, category: Category) -> (ClientId, Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let id = Uuid::new_v4();
        drop(members.add(category, id, tx).await);
        (id, rx)
    }

    async fn next_song(rx: &mut Receiver<ServerEvent>) -> NowPlaying {
        match rx.recv().await {
            Some(ServerEvent::NewSong(np)) => np,
            other => panic!("expected newSong, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_until_started() {
        let cat = Arc::new(MemoryCatalog::with(Category::Sad, &[("a.mp3", Some(1_000))]));
        let r = room(cat, Category::Sad);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(r.handle.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_with_read_and_fallback_lengths() {
        let cat = Arc::new(MemoryCatalog::with(
            Category::Chill,
            &[("a.mp3", Some(120_000)), ("b.mp3", None)],
        ));
        let r = room(cat, Category::Chill);
        let (_, mut rx) = listener(&r.members, Category::Chill).await;

        r.handle.start();
        let mut last = next_song(&mut rx).await;
        assert_eq!(last.name, "a.mp3");
        let mut at = Instant::now();

        let expected = [
            ("b.mp3", 120_000),
            ("a.mp3", 180_000),
            ("b.mp3", 120_000),
            ("a.mp3", 180_000),
        ];
        for (name, ms) in expected {
            let song = next_song(&mut rx).await;
            assert_eq!(song.name, name);
            let waited = at.elapsed();
            assert!(
                waited >= Duration::from_millis(ms) && waited < Duration::from_millis(ms + 5),
                "waited {waited:?} before {name}"
            );
            assert_eq!(r.handle.current(), Some(song.clone()));
            assert!(song.start_time >= last.start_time);
            last = song;
            at = Instant::now();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn round_robin_visits_every_track() {
        let tracks = [("1.mp3", Some(5)), ("2.mp3", Some(5)), ("3.mp3", Some(5))];
        let cat = Arc::new(MemoryCatalog::with(Category::Happy, &tracks));
        let r = room(cat, Category::Happy);
        let (_, mut rx) = listener(&r.members, Category::Happy).await;

        r.handle.start();
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(next_song(&mut rx).await.name);
        }
        assert_eq!(seen, ["1.mp3", "2.mp3", "3.mp3", "1.mp3", "2.mp3", "3.mp3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_advances_once() {
        let cat = Arc::new(MemoryCatalog::with(Category::Sad, &[("a.mp3", Some(60_000))]));
        let r = room(cat, Category::Sad);
        let (_, mut rx) = listener(&r.members, Category::Sad).await;

        r.handle.start();
        r.handle.start();
        r.handle.start();
        next_song(&mut rx).await;
        assert!(timeout(Duration::from_secs(30), rx.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_advance_rearms_timer() {
        let cat = Arc::new(MemoryCatalog::with(
            Category::Happy,
            &[("a.mp3", Some(60_000)), ("b.mp3", Some(60_000))],
        ));
        let r = room(cat, Category::Happy);
        let (_, mut rx) = listener(&r.members, Category::Happy).await;

        r.handle.start();
        next_song(&mut rx).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        r.handle.advance();
        let at = Instant::now();
        assert_eq!(next_song(&mut rx).await.name, "b.mp3");
        assert_eq!(next_song(&mut rx).await.name, "a.mp3");
        let waited = at.elapsed();
        assert!(waited >= Duration::from_secs(60) && waited < Duration::from_millis(60_005));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_catalog_stays_idle_then_recovers() {
        let cat = Arc::new(MemoryCatalog::default());
        let r = room(cat.clone(), Category::Chill);
        let (_, mut rx) = listener(&r.members, Category::Chill).await;

        r.handle.start();
        assert!(timeout(Duration::from_secs(600), rx.recv()).await.is_err());
        assert_eq!(r.handle.current(), None);

        cat.set(Category::Chill, &[("late.mp3", Some(1_000))]);
        r.handle.start();
        assert_eq!(next_song(&mut rx).await.name, "late.mp3");
    }

    #[tokio::test(start_paused = true)]
    async fn emptied_catalog_keeps_last_track() {
        let cat = Arc::new(MemoryCatalog::with(Category::Sad, &[("a.mp3", Some(1_000))]));
        let r = room(cat.clone(), Category::Sad);
        let (_, mut rx) = listener(&r.members, Category::Sad).await;

        r.handle.start();
        let first = next_song(&mut rx).await;
        cat.set(Category::Sad, &[]);

        assert!(timeout(Duration::from_secs(600), rx.recv()).await.is_err());
        assert_eq!(r.handle.current(), Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_advancing_without_members() {
        let cat = Arc::new(MemoryCatalog::with(
            Category::Happy,
            &[("a.mp3", Some(1_000)), ("b.mp3", Some(1_000))],
        ));
        let r = room(cat, Category::Happy);
        r.handle.start();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(r.handle.current().map(|n| n.name).as_deref(), Some("a.mp3"));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(r.handle.current().map(|n| n.name).as_deref(), Some("b.mp3"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_task() {
        let cat = Arc::new(MemoryCatalog::with(Category::Chill, &[("a.mp3", Some(1_000))]));
        let r = room(cat, Category::Chill);
        r.handle.start();
        r._stop.send(true).unwrap();
        timeout(Duration::from_secs(1), r.task).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn new_track_goes_out_before_its_length_is_known() {
        let cat = Arc::new(MemoryCatalog::with(Category::Sad, &[("a.mp3", Some(60_000))]));
        cat.slow_metadata(Category::Sad, Duration::from_secs(3_600));
        let r = room(cat, Category::Sad);
        let (_, mut rx) = listener(&r.members, Category::Sad).await;

        let at = Instant::now();
        r.handle.start();
        let song = next_song(&mut rx).await;
        assert_eq!(song.name, "a.mp3");
        assert!(at.elapsed() < Duration::from_secs(1));
        assert_eq!(r.handle.current(), Some(song));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_room_does_not_hold_up_another() {
        let cat = Arc::new(MemoryCatalog::with(Category::Sad, &[("s.mp3", Some(60_000))]));
        cat.set(Category::Happy, &[("a.mp3", Some(1_000)), ("b.mp3", Some(1_000))]);
        cat.slow_metadata(Category::Sad, Duration::from_secs(3_600));

        let sad = room(cat.clone(), Category::Sad);
        let happy = room(cat, Category::Happy);
        let (_, mut srx) = listener(&sad.members, Category::Sad).await;
        let (_, mut hrx) = listener(&happy.members, Category::Happy).await;

        sad.handle.start();
        assert_eq!(next_song(&mut srx).await.name, "s.mp3");

        let at = Instant::now();
        happy.handle.start();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(next_song(&mut hrx).await.name);
        }
        assert_eq!(seen, ["a.mp3", "b.mp3", "a.mp3"]);
        assert!(at.elapsed() < Duration::from_secs(3));
        // sad is still waiting on its length
        assert!(srx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn gap_counts_from_track_start() {
        let cat = Arc::new(MemoryCatalog::with(
            Category::Chill,
            &[("a.mp3", Some(10_000)), ("b.mp3", Some(10_000))],
        ));
        cat.slow_metadata(Category::Chill, Duration::from_secs(5));
        let r = room(cat, Category::Chill);
        let (_, mut rx) = listener(&r.members, Category::Chill).await;

        r.handle.start();
        next_song(&mut rx).await;
        let mut at = Instant::now();
        for name in ["b.mp3", "a.mp3"] {
            assert_eq!(next_song(&mut rx).await.name, name);
            let waited = at.elapsed();
            assert!(
                waited >= Duration::from_secs(10) && waited < Duration::from_millis(10_005),
                "waited {waited:?} before {name}"
            );
            at = Instant::now();
        }
    }
}
