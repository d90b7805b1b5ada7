// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const WS_REJECTED: &str = "ws.rejected";
pub const WS_MALFORMED: &str = "ws.malformed";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_RETIRED: &str = "room.retired";
pub const ROOM_ACTIVE: &str = "room.active";
pub const PARTICIPANT_JOINED: &str = "participant.joined";
pub const PARTICIPANT_LEFT: &str = "participant.left";
pub const PARTICIPANT_EVICTED: &str = "participant.evicted";
pub const HOST_CHANGED: &str = "host.changed";
pub const SYNC_ACCEPTED: &str = "sync.accepted";
pub const SYNC_IGNORED: &str = "sync.ignored";
pub const CHAT_MESSAGE: &str = "chat.message";
pub const CHAT_REACTION: &str = "chat.reaction";
pub const PARTY_ENDED: &str = "party.ended";
