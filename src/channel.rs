//! Room membership and fan-out.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use tokio::sync::{mpsc::error::TrySendError, watch, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    player::{self, PlayerHandle},
    state::{Category, ChatMessage, ClientId, NowPlaying, Outbox, ServerEvent},
};

/* ------------ membership ------------ */

type MemberSet = RwLock<HashMap<ClientId, Outbox>>;

/// Who is in which room. Each room has its own lock, so rooms never wait
/// on each other.
#[derive(Clone)]
pub struct Members {
    rooms: Arc<HashMap<Category, MemberSet>>,
}

impl Default for Members {
    fn default() -> Self {
        let rooms = Category::ALL.into_iter().map(|c| (c, MemberSet::default())).collect();
        Self { rooms: Arc::new(rooms) }
    }
}

impl Members {
    fn room(&self, category: Category) -> &MemberSet {
        // every category is inserted up front
        &self.rooms[&category]
    }

    /// Insert `client`. Fan-out to this room waits until the returned guard
    /// is dropped.
    pub async fn add(
        &self,
        category: Category,
        client: ClientId,
        outbox: Outbox,
    ) -> RwLockWriteGuard<'_, HashMap<ClientId, Outbox>> {
        let mut set = self.room(category).write().await;
        set.insert(client, outbox);
        set
    }

    pub async fn remove(&self, category: Category, client: ClientId) -> bool {
        self.room(category).write().await.remove(&client).is_some()
    }

    pub async fn count(&self, category: Category) -> usize {
        self.room(category).read().await.len()
    }

    /// Every room `client` is currently in.
    pub async fn rooms_of(&self, client: ClientId) -> Vec<Category> {
        let mut out = Vec::new();
        for c in Category::ALL {
            if self.room(c).read().await.contains_key(&client) {
                out.push(c);
            }
        }
        out
    }

    /// New track for `category`, to everyone in it.
    pub async fn broadcast_state_change(&self, category: Category, now: NowPlaying) {
        self.fan_out(category, ServerEvent::NewSong(now)).await;
    }

    /// Chat goes to every member, sender included.
    pub async fn relay_message(&self, msg: ChatMessage) {
        let category = msg.room;
        self.fan_out(category, msg.into()).await;
    }

    async fn fan_out(&self, category: Category, ev: ServerEvent) {
        let set = self.room(category).read().await;
        let mut sent = 0usize;
        for (id, outbox) in set.iter() {
            match outbox.try_send(ev.clone()) {
                Ok(()) => sent += 1,
                // slow reader: drop this event for it only
                Err(TrySendError::Full(_)) => warn!(room = %category, client = %id, "outbox full, event dropped"),
                // socket already gone; the gateway will clean up
                Err(TrySendError::Closed(_)) => debug!(room = %category, client = %id, "outbox closed"),
            }
        }
        debug!(room = %category, sent, "fan-out");
    }
}

/* ------------ channel ------------ */

struct Inner {
    members:  Members,
    players:  BTreeMap<Category, PlayerHandle>,
    shutdown: watch::Sender<bool>,
}

/// Membership plus the room players; the handle everything else is given.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Spawn one player per category.
    pub fn start(catalog: Arc<dyn Catalog>, fallback: Duration) -> Self {
        let members = Members::default();
        let (shutdown, stop_rx) = watch::channel(false);

        let players = Category::ALL
            .into_iter()
            .map(|c| {
                let (handle, _task) =
                    player::spawn(c, catalog.clone(), members.clone(), fallback, stop_rx.clone());
                (c, handle)
            })
            .collect();

        Self { inner: Arc::new(Inner { members, players, shutdown }) }
    }

    pub fn player(&self, category: Category) -> &PlayerHandle {
        &self.inner.players[&category]
    }

    pub fn members(&self) -> &Members {
        &self.inner.members
    }

    /// Playback snapshot for every room.
    pub fn snapshot(&self) -> BTreeMap<Category, Option<NowPlaying>> {
        self.inner.players.iter().map(|(c, p)| (*c, p.current())).collect()
    }

    /// Add `client` to `category`. An idle room starts playing (the joiner
    /// hears it through the broadcast); a playing room sends the current
    /// track to the joiner only.
    pub async fn join(&self, category: Category, client: ClientId, outbox: Outbox) {
        let player = self.player(category);

        // snapshot is read and queued under the write lock; the next
        // broadcast needs the read lock, so it always lands after it
        let set = self.inner.members.add(category, client, outbox.clone()).await;
        let members = set.len();
        let idle = match player.current() {
            Some(now) => {
                if outbox.try_send(ServerEvent::NewSong(now)).is_err() {
                    warn!(room = %category, %client, "couldn't deliver sync snapshot");
                }
                false
            }
            None => true,
        };
        drop(set);

        info!(room = %category, %client, members, "joined");
        if idle {
            player.start();
        }
    }

    pub async fn leave(&self, category: Category, client: ClientId) {
        if self.inner.members.remove(category, client).await {
            info!(room = %category, %client, "left");
        }
    }

    /// Drop `client` from every room it joined.
    pub async fn disconnect(&self, client: ClientId) {
        for c in self.inner.members.rooms_of(client).await {
            self.leave(c, client).await;
        }
    }

    pub async fn relay_message(&self, msg: ChatMessage) {
        self.inner.members.relay_message(msg).await;
    }

    pub async fn member_count(&self, category: Category) -> usize {
        self.inner.members.count(category).await
    }

    /// Stop every room player; pending timers go with them.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }
}
