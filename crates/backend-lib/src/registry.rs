// ============================
// watchparty-backend/src/registry.rs
// ============================
//! Room registry: creates rooms on first join and forgets them once empty.
use crate::config::RoomLimits;
use crate::error::AppError;
use crate::metrics as keys;
use crate::room::{ClientSender, Room};
use crate::room_actor::{spawn_room_actor, RoomCommand, RoomHandle, RoomMap};
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use watchparty_common::{ConnectionId, RoomId};

/// Manager for all active rooms
pub struct RoomRegistry {
    rooms: Arc<RoomMap>,
    next_generation: AtomicU64,
    limits: RoomLimits,
}

impl RoomRegistry {
    /// Create an empty registry
    pub fn new(limits: RoomLimits) -> Self {
        RoomRegistry {
            rooms: Arc::new(RoomMap::new()),
            next_generation: AtomicU64::new(1),
            limits,
        }
    }

    fn spawn_room(&self, room_id: &str) -> RoomHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let room = Room::new(room_id.to_string(), self.limits);
        counter!(keys::ROOM_CREATED).increment(1);
        info!(room_id, generation, "Room created");
        spawn_room_actor(room, generation, self.rooms.clone())
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Resolves once the room has processed the join and returns the handle
    /// the connection should use for its subsequent events.
    pub async fn join_room(
        &self,
        room_id: &str,
        display_name: String,
        user_id: Option<String>,
        connection_id: ConnectionId,
        tx: ClientSender,
    ) -> Result<RoomHandle, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let cmd = RoomCommand::Join {
            connection_id,
            display_name,
            user_id,
            tx,
            resp_tx,
        };

        // The entry guard is held while queueing so the room cannot retire in between
        let handle = {
            let mut entry = self
                .rooms
                .entry(room_id.to_string())
                .or_insert_with(|| self.spawn_room(room_id));
            if let Err(rejected) = entry.try_send(cmd) {
                warn!(room_id, "Room actor gone without retiring, replacing it");
                *entry = self.spawn_room(room_id);
                entry.send(rejected.0)?;
            }
            entry.clone()
        };
        gauge!(keys::ROOM_ACTIVE).set(self.rooms.len() as f64);

        resp_rx
            .await
            .map_err(|_| AppError::RoomUnavailable(room_id.to_string()))?;
        Ok(handle)
    }

    /// Remove a connection from its room. Unknown rooms or connections are a no-op.
    ///
    /// Returns whether a participant was removed. When the room becomes empty it
    /// is gone from the registry by the time this resolves.
    pub async fn leave_room(&self, room_id: &str, connection_id: ConnectionId) -> bool {
        let Some(handle) = self.get_room(room_id) else {
            debug!(room_id, %connection_id, "Leave for unknown room");
            return false;
        };
        let (resp_tx, resp_rx) = oneshot::channel();
        if handle
            .send(RoomCommand::Leave {
                connection_id,
                resp_tx,
            })
            .is_err()
        {
            return false;
        }
        resp_rx.await.unwrap_or(false)
    }

    /// End a party: every participant receives `party-ended` and is disconnected
    pub async fn end_party(
        &self,
        room_id: &str,
        reason: String,
        message: String,
    ) -> Result<usize, AppError> {
        let handle = self
            .get_room(room_id)
            .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))?;
        handle.end_party(reason, message).await
    }

    /// End every live party, e.g. on shutdown
    pub async fn end_all(&self, reason: &str, message: &str) -> usize {
        let handles: Vec<RoomHandle> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut notified = 0;
        for handle in handles {
            match handle.end_party(reason.to_string(), message.to_string()).await {
                Ok(n) => notified += n,
                Err(e) => debug!(room_id = handle.room_id(), error = %e, "Room already gone"),
            }
        }
        notified
    }

    /// Get a room handle by ID
    pub fn get_room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Get all active room IDs
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RoomLimits::default())
    }
}
