// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket Handler Module
//!
//! This module drives a single watch party connection once the handshake has
//! been accepted:
//! - joining the room named in the handshake
//! - a writer task that serialises outbound events and sends heartbeats
//! - a reader loop that parses inbound events and routes them to the room
//! - leaving the room on every exit path, so no ghost participant survives
//!
//! # Liveness
//! The reader gives up when no frame (pongs included) arrives within the
//! configured client timeout. The writer pings on a shorter interval, so a
//! healthy client always answers in time.
//!
//! # Eviction
//! The room owns the only sender feeding the writer. When a participant is
//! removed by the room (duplicate display name, party ended) the writer sees
//! its channel close, sends a close frame and exits, which ends the reader.

use crate::handshake::Handshake;
use crate::metrics as keys;
use crate::room_actor::RoomHandle;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;
use watchparty_common::{ClientEvent, ConnectionId, ServerEvent};

/// WebSocket handler for one accepted connection
pub struct WebSocketHandler {
    state: Arc<AppState>,
    connection_id: ConnectionId,
    handshake: Handshake,
}

impl WebSocketHandler {
    pub fn new(state: Arc<AppState>, handshake: Handshake) -> Self {
        Self {
            state,
            connection_id: Uuid::new_v4(),
            handshake,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Run the connection until it closes, then leave the room
    pub async fn run(self, socket: WebSocket) {
        let (sink, stream) = socket.split();
        let (client_tx, client_rx) = mpsc::unbounded_channel::<ServerEvent>();

        let mut send_task = tokio::spawn(writer_task(
            sink,
            client_rx,
            self.state.settings.heartbeat_interval(),
            self.connection_id,
        ));

        let room = match self
            .state
            .registry
            .join_room(
                &self.handshake.room_id,
                self.handshake.display_name.clone(),
                self.handshake.user_id.clone(),
                self.connection_id,
                client_tx,
            )
            .await
        {
            Ok(room) => room,
            Err(e) => {
                warn!(
                    room_id = %self.handshake.room_id,
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to join room"
                );
                send_task.abort();
                return;
            },
        };

        info!(
            room_id = %self.handshake.room_id,
            connection_id = %self.connection_id,
            display_name = %self.handshake.display_name,
            "Connection joined room"
        );

        tokio::select! {
            () = self.read_loop(stream, &room) => {},
            _ = &mut send_task => {
                debug!(connection_id = %self.connection_id, "Writer closed, ending connection");
            },
        }

        // Cleanup: always leave, whichever side ended the connection
        self.state
            .registry
            .leave_room(&self.handshake.room_id, self.connection_id)
            .await;
        send_task.abort();

        info!(
            room_id = %self.handshake.room_id,
            connection_id = %self.connection_id,
            "Connection closed"
        );
    }

    async fn read_loop(&self, mut stream: SplitStream<WebSocket>, room: &RoomHandle) {
        let idle_timeout = self.state.settings.client_timeout();
        loop {
            let frame = match timeout(idle_timeout, stream.next()).await {
                Err(_) => {
                    info!(connection_id = %self.connection_id, "Connection idle, dropping");
                    break;
                },
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    debug!(connection_id = %self.connection_id, error = %e, "Transport error");
                    break;
                },
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(text) => self.handle_text(room, text.as_str()),
                Message::Close(_) => break,
                // Pings are answered by axum; pongs only refresh the idle timer
                _ => {},
            }
        }
    }

    /// Parse one text frame and route it to the room. Bad frames are dropped.
    pub fn handle_text(&self, room: &RoomHandle, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(room, event),
            Err(e) => {
                counter!(keys::WS_MALFORMED).increment(1);
                debug!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "Dropping malformed frame"
                );
            },
        }
    }

    /// Route a parsed event to the room
    pub fn handle_event(&self, room: &RoomHandle, event: ClientEvent) {
        let id = self.connection_id;
        let result = match event {
            ClientEvent::SyncVideo(sync) => room.sync_video(id, sync),
            ClientEvent::RequestSync => room.request_sync(id),
            ClientEvent::SendMessage { message } => room.send_message(id, message),
            ClientEvent::SendReaction { emoji } => room.send_reaction(id, emoji),
        };
        if let Err(e) = result {
            debug!(connection_id = %id, error = %e, "Room no longer accepting events");
        }
    }
}

/// Forward room events to the socket and keep the connection alive with pings
async fn writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut client_rx: mpsc::UnboundedReceiver<ServerEvent>,
    heartbeat_interval: Duration,
    connection_id: ConnectionId,
) {
    let mut heartbeat = time::interval(heartbeat_interval);
    // Skip the first immediate tick
    heartbeat.tick().await;

    loop {
        tokio::select! {
            event = client_rx.recv() => {
                let Some(event) = event else {
                    // Removed from the room: close politely
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(%connection_id, event = event.name(), error = %e, "Failed to serialize event");
                        continue;
                    },
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            },
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            },
        }
    }
}
