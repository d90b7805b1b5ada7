// ============================
// watchparty-backend/src/room_actor.rs
// ============================
//! One task per room. Every command for a room goes through its queue, so the
//! room's state is only ever touched by a single task, one command at a time.
use crate::error::AppError;
use crate::metrics as keys;
use crate::room::{ClientSender, Room, RoomSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use watchparty_common::{ConnectionId, RoomId, SyncVideo};

/// Shared map of live rooms, keyed by room id
pub type RoomMap = DashMap<RoomId, RoomHandle>;

/// Message sent *into* the actor
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        display_name: String,
        user_id: Option<String>,
        tx: ClientSender,
        resp_tx: oneshot::Sender<()>,
    },
    Leave {
        connection_id: ConnectionId,
        resp_tx: oneshot::Sender<bool>,
    },
    SyncVideo {
        connection_id: ConnectionId,
        sync: SyncVideo,
    },
    RequestSync {
        connection_id: ConnectionId,
    },
    SendMessage {
        connection_id: ConnectionId,
        message: String,
    },
    SendReaction {
        connection_id: ConnectionId,
        emoji: String,
    },
    EndParty {
        reason: String,
        message: String,
        resp_tx: oneshot::Sender<usize>,
    },
    Snapshot {
        resp_tx: oneshot::Sender<RoomSnapshot>,
    },
}

/// Handle that other components keep: the actor's command channel
#[derive(Clone, Debug)]
pub struct RoomHandle {
    room_id: RoomId,
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a command without waiting for it to run
    pub fn send(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.cmd_tx.send(cmd)?;
        Ok(())
    }

    pub(crate) fn try_send(&self, cmd: RoomCommand) -> Result<(), mpsc::error::SendError<RoomCommand>> {
        self.cmd_tx.send(cmd)
    }

    pub fn sync_video(&self, connection_id: ConnectionId, sync: SyncVideo) -> Result<(), AppError> {
        self.send(RoomCommand::SyncVideo { connection_id, sync })
    }

    pub fn request_sync(&self, connection_id: ConnectionId) -> Result<(), AppError> {
        self.send(RoomCommand::RequestSync { connection_id })
    }

    pub fn send_message(&self, connection_id: ConnectionId, message: String) -> Result<(), AppError> {
        self.send(RoomCommand::SendMessage {
            connection_id,
            message,
        })
    }

    pub fn send_reaction(&self, connection_id: ConnectionId, emoji: String) -> Result<(), AppError> {
        self.send(RoomCommand::SendReaction {
            connection_id,
            emoji,
        })
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.send(RoomCommand::Snapshot { resp_tx })?;
        resp_rx.await.map_err(|_| self.unavailable())
    }

    pub async fn end_party(&self, reason: String, message: String) -> Result<usize, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.send(RoomCommand::EndParty {
            reason,
            message,
            resp_tx,
        })?;
        resp_rx.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> AppError {
        AppError::RoomUnavailable(self.room_id.clone())
    }
}

pub struct RoomActor {
    room: Room,
    generation: u64,
    rooms: Arc<RoomMap>,
    retired: bool,
}

impl RoomActor {
    pub fn new(room: Room, generation: u64, rooms: Arc<RoomMap>) -> Self {
        RoomActor {
            room,
            generation,
            rooms,
            retired: false,
        }
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCommand>) {
        debug!(room_id = %self.room.id(), generation = self.generation, "Room actor started");
        while let Some(cmd) = rx.recv().await {
            self.handle_command(cmd, &rx);
            if !self.retired && self.room.is_empty() {
                self.retired = self.try_retire(&rx);
            }
            if self.retired {
                break;
            }
        }
        debug!(room_id = %self.room.id(), generation = self.generation, "Room actor stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand, rx: &mpsc::UnboundedReceiver<RoomCommand>) {
        match cmd {
            RoomCommand::Join {
                connection_id,
                display_name,
                user_id,
                tx,
                resp_tx,
            } => {
                self.room
                    .add_participant(connection_id, display_name, user_id, tx);
                let _ = resp_tx.send(());
            },
            RoomCommand::Leave {
                connection_id,
                resp_tx,
            } => {
                let removed = self.room.remove_participant(connection_id).is_some();
                // Retire before answering so the caller observes the room gone
                if self.room.is_empty() {
                    self.retired = self.try_retire(rx);
                }
                let _ = resp_tx.send(removed);
            },
            RoomCommand::SyncVideo {
                connection_id,
                sync,
            } => {
                self.room.sync_video(connection_id, sync);
            },
            RoomCommand::RequestSync { connection_id } => {
                self.room.request_sync(connection_id);
            },
            RoomCommand::SendMessage {
                connection_id,
                message,
            } => {
                self.room.send_message(connection_id, &message);
            },
            RoomCommand::SendReaction {
                connection_id,
                emoji,
            } => {
                self.room.send_reaction(connection_id, &emoji);
            },
            RoomCommand::EndParty {
                reason,
                message,
                resp_tx,
            } => {
                let notified = self.room.end_party(&reason, &message);
                counter!(keys::PARTY_ENDED).increment(1);
                self.retired = self.try_retire(rx);
                let _ = resp_tx.send(notified);
            },
            RoomCommand::Snapshot { resp_tx } => {
                let _ = resp_tx.send(self.room.snapshot());
            },
        }
    }

    /// Remove this room from the map if it is still ours and nothing is queued.
    ///
    /// Joins are queued while holding the map entry, so holding the same entry
    /// here means no join can slip in between the emptiness check and removal.
    fn try_retire(&self, rx: &mpsc::UnboundedReceiver<RoomCommand>) -> bool {
        match self.rooms.entry(self.room.id().to_string()) {
            Entry::Occupied(entry) if entry.get().generation == self.generation => {
                if !rx.is_empty() {
                    return false;
                }
                entry.remove();
            },
            // Already replaced or removed; nothing can reach this actor through the map
            _ => return true,
        }
        counter!(keys::ROOM_RETIRED).increment(1);
        gauge!(keys::ROOM_ACTIVE).set(self.rooms.len() as f64);
        info!(room_id = %self.room.id(), "Room retired");
        true
    }
}

/// Spawn a new room actor and return its handle
pub fn spawn_room_actor(room: Room, generation: u64, rooms: Arc<RoomMap>) -> RoomHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = RoomHandle {
        room_id: room.id().to_string(),
        generation,
        cmd_tx,
    };
    let actor = RoomActor::new(room, generation, rooms);

    tokio::spawn(async move {
        actor.run(cmd_rx).await;
    });

    handle
}
