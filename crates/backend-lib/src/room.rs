// ============================
// crates/backend-lib/src/room.rs
// ============================
//! Room state machine: roster, host election and the authoritative clock.
//!
//! A `Room` is plain synchronous state. It never awaits; every outbound event
//! is pushed onto the recipient's unbounded channel and the connection's
//! writer task drains it, so a slow socket cannot stall the room.
//!
//! Invariant: whenever the roster is non-empty exactly one participant has
//! `is_host == true` and its connection id equals `host_connection_id`.

use crate::chat;
use crate::config::RoomLimits;
use crate::metrics as keys;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use watchparty_common::{
    ConnectionId, ParticipantInfo, PlaybackState, RoomId, ServerEvent, SyncVideo,
};

/// Outbound channel of one connection
pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

/// Fastest playback rate a host may broadcast
pub const MAX_PLAYBACK_SPEED: f64 = 16.0;

/// One connected viewer
#[derive(Debug)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub user_id: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub is_host: bool,
    tx: ClientSender,
}

impl Participant {
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.connection_id,
            nickname: self.display_name.clone(),
            user_id: self.user_id.clone(),
            is_host: self.is_host,
            joined_at: self.joined_at,
        }
    }

    fn send(&self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            trace!(connection_id = %self.connection_id, "Dropping event for closed connection");
        }
    }
}

/// Serializable view of a room, used by the inspection endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub participants: Vec<ParticipantInfo>,
    pub playback: PlaybackState,
    pub host_connection_id: Option<ConnectionId>,
    pub host_user_id: Option<String>,
}

/// State of one watch party session
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    participants: Vec<Participant>,
    playback: PlaybackState,
    host_connection_id: Option<ConnectionId>,
    host_user_id: Option<String>,
    limits: RoomLimits,
}

impl Room {
    pub fn new(id: RoomId, limits: RoomLimits) -> Self {
        Self {
            id,
            participants: Vec::new(),
            playback: PlaybackState::default(),
            host_connection_id: None,
            host_user_id: None,
            limits,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    pub fn host_connection_id(&self) -> Option<ConnectionId> {
        self.host_connection_id
    }

    pub fn host_user_id(&self) -> Option<&str> {
        self.host_user_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn participant(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            participants: self.roster(),
            playback: self.playback,
            host_connection_id: self.host_connection_id,
            host_user_id: self.host_user_id.clone(),
        }
    }

    fn roster(&self) -> Vec<ParticipantInfo> {
        self.participants.iter().map(Participant::info).collect()
    }

    /// Add a connection to the roster.
    ///
    /// A participant already using `display_name` is evicted first through the
    /// normal removal path, except that an evicted host is not succeeded when
    /// the joiner is about to reclaim host. The joiner becomes host when the
    /// roster was empty or when its `user_id` matches the room's `host_user_id`.
    pub fn add_participant(
        &mut self,
        connection_id: ConnectionId,
        display_name: String,
        user_id: Option<String>,
        tx: ClientSender,
    ) {
        let reclaims_host = user_id.is_some() && user_id == self.host_user_id;
        let mut displaced_host = None;

        if let Some(stale) = self
            .participants
            .iter()
            .find(|p| p.display_name == display_name)
            .map(|p| p.connection_id)
        {
            info!(
                room_id = %self.id,
                evicted = %stale,
                connection_id = %connection_id,
                display_name = %display_name,
                "Evicting participant with duplicate display name"
            );
            counter!(keys::PARTICIPANT_EVICTED).increment(1);
            // A returning host takes its seat back directly, nobody is promoted in between
            let keeps_seat = reclaims_host && self.host_connection_id == Some(stale);
            self.remove(stale, !keeps_seat);
            if keeps_seat && !self.participants.is_empty() {
                displaced_host = Some(stale);
            }
        }

        let becomes_host = self.participants.is_empty() || reclaims_host;
        if becomes_host {
            if let Some(previous) = self.host_connection_id.take() {
                displaced_host = Some(previous);
            }
            for p in &mut self.participants {
                p.is_host = false;
            }
            self.host_connection_id = Some(connection_id);
            if user_id.is_some() {
                self.host_user_id = user_id.clone();
            }
        }

        let participant = Participant {
            connection_id,
            display_name,
            user_id,
            joined_at: Utc::now(),
            is_host: becomes_host,
            tx,
        };
        let joined = participant.info();
        self.participants.push(participant);
        counter!(keys::PARTICIPANT_JOINED).increment(1);

        info!(
            room_id = %self.id,
            connection_id = %connection_id,
            display_name = %joined.nickname,
            is_host = becomes_host,
            participants = self.participants.len(),
            "Participant joined"
        );

        self.send_to(
            connection_id,
            ServerEvent::WatchPartyJoined {
                participant_id: connection_id,
                participants: self.roster(),
                current_time: self.playback.current_time,
                is_playing: self.playback.is_playing,
                playback_speed: self.playback.playback_speed,
            },
        );
        self.broadcast_except(
            connection_id,
            &ServerEvent::ParticipantJoined {
                participant: joined.clone(),
            },
        );

        if displaced_host.is_some() {
            info!(room_id = %self.id, new_host = %connection_id, "Host reclaimed on reconnect");
            counter!(keys::HOST_CHANGED).increment(1);
            self.broadcast_all(&ServerEvent::HostChanged {
                new_host_id: connection_id,
                new_host_nickname: joined.nickname,
            });
        }
    }

    /// Remove a connection from the roster and hand host status to the
    /// earliest remaining joiner if needed. Unknown ids are a no-op.
    ///
    /// Dropping the returned participant closes its outbound channel.
    pub fn remove_participant(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        self.remove(connection_id, true)
    }

    fn remove(&mut self, connection_id: ConnectionId, elect_successor: bool) -> Option<Participant> {
        let pos = self
            .participants
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        let departed = self.participants.remove(pos);
        counter!(keys::PARTICIPANT_LEFT).increment(1);
        info!(
            room_id = %self.id,
            connection_id = %connection_id,
            display_name = %departed.display_name,
            participants = self.participants.len(),
            "Participant left"
        );

        self.broadcast_all(&ServerEvent::ParticipantLeft {
            participant_id: departed.connection_id,
            nickname: departed.display_name.clone(),
        });

        if self.host_connection_id == Some(connection_id) {
            self.host_connection_id = None;
            if !elect_successor {
                return Some(departed);
            }
            if let Some(successor) = self.participants.first_mut() {
                successor.is_host = true;
                self.host_connection_id = Some(successor.connection_id);
                let event = ServerEvent::HostChanged {
                    new_host_id: successor.connection_id,
                    new_host_nickname: successor.display_name.clone(),
                };
                info!(
                    room_id = %self.id,
                    new_host = %successor.connection_id,
                    "Host handed to earliest remaining participant"
                );
                counter!(keys::HOST_CHANGED).increment(1);
                self.broadcast_all(&event);
            }
        }

        Some(departed)
    }

    /// Apply a host playback update and relay it to everyone else.
    /// Returns `false` when the update was ignored.
    pub fn sync_video(&mut self, connection_id: ConnectionId, sync: SyncVideo) -> bool {
        if self.host_connection_id != Some(connection_id) {
            debug!(room_id = %self.id, connection_id = %connection_id, "Ignoring sync from non-host");
            counter!(keys::SYNC_IGNORED).increment(1);
            return false;
        }
        if !is_valid_sync(&sync) {
            debug!(room_id = %self.id, connection_id = %connection_id, ?sync, "Ignoring out-of-range sync");
            counter!(keys::SYNC_IGNORED).increment(1);
            return false;
        }

        self.playback.current_time = sync.current_time;
        self.playback.is_playing = sync.is_playing;
        if let Some(speed) = sync.playback_speed {
            self.playback.playback_speed = speed;
        }
        counter!(keys::SYNC_ACCEPTED).increment(1);
        trace!(room_id = %self.id, ?sync, "Relaying host sync");

        self.broadcast_except(connection_id, &ServerEvent::from(sync));
        true
    }

    /// Forward a follower's catch-up request to the host only
    pub fn request_sync(&self, connection_id: ConnectionId) -> bool {
        let Some(requester) = self.participant(connection_id) else {
            return false;
        };
        let Some(host) = self.host_connection_id else {
            debug!(room_id = %self.id, "Dropping request-sync, no host");
            return false;
        };
        self.send_to(
            host,
            ServerEvent::RequestSync {
                requester_id: requester.connection_id,
                nickname: requester.display_name.clone(),
            },
        )
    }

    /// Relay a chat message to all members, sender included
    pub fn send_message(&self, connection_id: ConnectionId, text: &str) -> bool {
        let Some(sender) = self.participant(connection_id) else {
            return false;
        };
        match chat::new_message(&sender.display_name, text, self.limits.max_message_len) {
            Some(event) => {
                counter!(keys::CHAT_MESSAGE).increment(1);
                self.broadcast_all(&event);
                true
            },
            None => false,
        }
    }

    /// Relay an emoji reaction to all members, sender included
    pub fn send_reaction(&self, connection_id: ConnectionId, emoji: &str) -> bool {
        let Some(sender) = self.participant(connection_id) else {
            return false;
        };
        match chat::new_reaction(&sender.display_name, emoji, self.limits.max_emoji_len) {
            Some(event) => {
                counter!(keys::CHAT_REACTION).increment(1);
                self.broadcast_all(&event);
                true
            },
            None => false,
        }
    }

    /// Tell everyone the party is over and empty the roster.
    /// Returns how many participants were notified.
    pub fn end_party(&mut self, reason: &str, message: &str) -> usize {
        self.broadcast_all(&ServerEvent::PartyEnded {
            reason: reason.to_string(),
            message: message.to_string(),
        });
        let notified = self.participants.len();
        self.participants.clear();
        self.host_connection_id = None;
        info!(room_id = %self.id, reason, notified, "Party ended");
        notified
    }

    /// Deliver to every connection in the room
    pub fn broadcast_all(&self, event: &ServerEvent) {
        for p in &self.participants {
            p.send(event.clone());
        }
    }

    /// Deliver to every connection except `excluded`
    pub fn broadcast_except(&self, excluded: ConnectionId, event: &ServerEvent) {
        for p in self
            .participants
            .iter()
            .filter(|p| p.connection_id != excluded)
        {
            p.send(event.clone());
        }
    }

    /// Deliver to one connection; `false` if it is not in the room
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        match self.participant(connection_id) {
            Some(p) => {
                p.send(event);
                true
            },
            None => false,
        }
    }
}

fn is_valid_sync(sync: &SyncVideo) -> bool {
    let time_ok = sync.current_time.is_finite() && sync.current_time >= 0.0;
    let speed_ok = sync
        .playback_speed
        .is_none_or(|speed| speed.is_finite() && speed > 0.0 && speed <= MAX_PLAYBACK_SPEED);
    time_ok && speed_ok
}
