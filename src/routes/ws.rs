use axum::{
    Router, routing::get, Extension,
    extract::ws::{WebSocketUpgrade, WebSocket, Message},
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    channel::Channel,
    state::{Category, ChatMessage, ClientId, Outbox, ServerEvent},
};

/// Per-connection outbox depth; a client further behind than this misses events.
const OUTBOX: usize = 64;

/* ---------- wire (client -> server) ---------- */
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum ClientEvent {
    JoinRoom(String),
    LeaveRoom(String),
    SendMessage(SendMessage),
}

#[derive(Debug, Deserialize, PartialEq)]
struct SendMessage {
    #[serde(alias = "mood")]
    category: String,
    message:  String,
    #[serde(default)]
    username: String,
}

pub fn router() -> Router {
    Router::new().route("/", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(channel): Extension<Channel>,
) -> impl IntoResponse {
    // clients are anonymous here; names come with each chat message
    ws.on_upgrade(move |s| user_ws(s, channel))
}

/* ---------------- per connection ---------------- */
async fn user_ws(sock: WebSocket, channel: Channel) {
    let (sink, stream) = sock.split();
    run_session(sink, stream, channel).await;
}

/// Pump one connection until either side goes away, then leave every room.
async fn run_session<W, R>(mut sink: W, mut stream: R, channel: Channel)
where
    W: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    let id: ClientId = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOX);
    info!(client = %id, "connected");

    /* writer: outbox -> socket */
    let mut send_task = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let text = match serde_json::to_string(&ev) {
                Ok(t) => t,
                Err(e) => { warn!("can't encode event: {e}"); continue; }
            };
            if sink.send(Message::Text(text)).await.is_err() { break; }
        }
    });

    /* reader: socket -> channel */
    let reader_channel = channel.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(raw)) => handle_frame(&reader_channel, id, &tx, &raw).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => { debug!(client = %id, "read error: {e}"); break; }
            }
        }
    });

    // wait for the aborted side too, or a join still in flight could
    // re-add us after disconnect
    tokio::select! {
        _ = &mut send_task => { recv_task.abort(); let _ = recv_task.await; }
        _ = &mut recv_task => { send_task.abort(); let _ = send_task.await; }
    }

    /* 離房: connection lost counts as leaving everything */
    channel.disconnect(id).await;
    info!(client = %id, "disconnected");
}

async fn handle_frame(channel: &Channel, id: ClientId, outbox: &Outbox, raw: &str) {
    let ev = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(ev) => ev,
        Err(e) => { warn!(client = %id, "bad frame: {e}"); return; }
    };
    dispatch(channel, id, outbox, ev).await;
}

/// Unknown categories are dropped without telling the client.
async fn dispatch(channel: &Channel, id: ClientId, outbox: &Outbox, ev: ClientEvent) {
    match ev {
        ClientEvent::JoinRoom(room) => match room.parse::<Category>() {
            Ok(c) => channel.join(c, id, outbox.clone()).await,
            Err(e) => debug!(client = %id, "join ignored: {e}"),
        },
        ClientEvent::LeaveRoom(room) => match room.parse::<Category>() {
            Ok(c) => channel.leave(c, id).await,
            Err(e) => debug!(client = %id, "leave ignored: {e}"),
        },
        ClientEvent::SendMessage(m) => match m.category.parse::<Category>() {
            Ok(room) => {
                channel
                    .relay_message(ChatMessage { username: m.username, message: m.message, room })
                    .await
            }
            Err(e) => debug!(client = %id, "message ignored: {e}"),
        },
    }
}
