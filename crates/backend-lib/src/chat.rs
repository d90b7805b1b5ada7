// ============================
// crates/backend-lib/src/chat.rs
// ============================
//! Chat and reaction payload construction.
//!
//! Nothing here is stored; the room fans the events out to every member,
//! sender included, and forgets them.

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use watchparty_common::ServerEvent;

const MESSAGE_ID_SUFFIX_LEN: usize = 9;

/// Build a `new-message` event, or `None` if the text is blank or too long
pub fn new_message(nickname: &str, text: &str, max_len: usize) -> Option<ServerEvent> {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > max_len {
        return None;
    }
    let timestamp = Utc::now();
    Some(ServerEvent::NewMessage {
        id: message_id(timestamp),
        nickname: nickname.to_string(),
        message: text.to_string(),
        timestamp,
    })
}

/// Build a `new-reaction` event, or `None` if the emoji is blank or too long
pub fn new_reaction(nickname: &str, emoji: &str, max_len: usize) -> Option<ServerEvent> {
    let emoji = emoji.trim();
    if emoji.is_empty() || emoji.chars().count() > max_len {
        return None;
    }
    Some(ServerEvent::NewReaction {
        emoji: emoji.to_string(),
        from: nickname.to_string(),
        timestamp: Utc::now(),
    })
}

/// Millisecond timestamp joined to a random alphanumeric suffix
fn message_id(timestamp: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", timestamp.timestamp_millis(), suffix)
}
