// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between the watch party client and server.
//! This module defines the WebSocket protocol events and supporting types.
//!
//! Every frame is a JSON object of the form `{"event": "<name>", "data": {...}}`.
//! Event names are kebab-case, payload fields are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one underlying connection. Not stable across reconnects.
pub type ConnectionId = Uuid;

/// Opaque room identifier supplied by the web layer.
pub type RoomId = String;

/// Playback speed a room starts with.
pub const DEFAULT_PLAYBACK_SPEED: f64 = 1.0;

/// Authoritative playback clock of a room
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Position in seconds
    pub current_time: f64,
    /// Play/pause state
    pub is_playing: bool,
    /// Playback rate
    pub playback_speed: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            is_playing: false,
            playback_speed: DEFAULT_PLAYBACK_SPEED,
        }
    }
}

/// Payload of a `sync-video` event, relayed verbatim as `video-sync`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncVideo {
    pub current_time: f64,
    pub is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_speed: Option<f64>,
}

/// Public view of a participant
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: ConnectionId,
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

/// Events sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Host-only playback update
    SyncVideo(SyncVideo),
    /// Ask the host for a fresh `sync-video`
    RequestSync,
    /// Chat message
    SendMessage { message: String },
    /// Emoji reaction
    SendReaction { emoji: String },
}

/// Events sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Sent only to the joining connection: roster plus the room's clock
    WatchPartyJoined {
        /// Connection id assigned to the receiver
        participant_id: ConnectionId,
        participants: Vec<ParticipantInfo>,
        current_time: f64,
        is_playing: bool,
        playback_speed: f64,
    },
    ParticipantJoined {
        participant: ParticipantInfo,
    },
    ParticipantLeft {
        participant_id: ConnectionId,
        nickname: String,
    },
    HostChanged {
        new_host_id: ConnectionId,
        new_host_nickname: String,
    },
    VideoSync {
        current_time: f64,
        is_playing: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        playback_speed: Option<f64>,
    },
    /// Forwarded to the host only
    RequestSync {
        requester_id: ConnectionId,
        nickname: String,
    },
    NewMessage {
        id: String,
        nickname: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    NewReaction {
        emoji: String,
        from: String,
        timestamp: DateTime<Utc>,
    },
    PartyEnded {
        reason: String,
        message: String,
    },
}

impl ServerEvent {
    /// Wire name of the event, handy for logs
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::WatchPartyJoined { .. } => "watch-party-joined",
            ServerEvent::ParticipantJoined { .. } => "participant-joined",
            ServerEvent::ParticipantLeft { .. } => "participant-left",
            ServerEvent::HostChanged { .. } => "host-changed",
            ServerEvent::VideoSync { .. } => "video-sync",
            ServerEvent::RequestSync { .. } => "request-sync",
            ServerEvent::NewMessage { .. } => "new-message",
            ServerEvent::NewReaction { .. } => "new-reaction",
            ServerEvent::PartyEnded { .. } => "party-ended",
        }
    }
}

impl From<SyncVideo> for ServerEvent {
    fn from(sync: SyncVideo) -> Self {
        ServerEvent::VideoSync {
            current_time: sync.current_time,
            is_playing: sync.is_playing,
            playback_speed: sync.playback_speed,
        }
    }
}
