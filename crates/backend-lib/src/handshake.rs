// ============================
// crates/backend-lib/src/handshake.rs
// ============================
//! Handshake parsing and validation for inbound connections.
//!
//! The web layer hands out `ws://host/ws?roomId=..&displayName=..&userId=..`
//! URLs; everything here runs before the WebSocket upgrade so a malformed
//! handshake never reaches a room.

use crate::config::RoomLimits;
use crate::error::AppError;
use serde::Deserialize;
use watchparty_common::RoomId;

/// Raw query parameters of the upgrade request
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeQuery {
    pub room_id: Option<String>,
    #[serde(alias = "nickname")]
    pub display_name: Option<String>,
    pub user_id: Option<String>,
}

/// A handshake that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub room_id: RoomId,
    pub display_name: String,
    pub user_id: Option<String>,
}

impl HandshakeQuery {
    /// Validate the query against the configured limits
    pub fn validate(self, limits: &RoomLimits) -> Result<Handshake, AppError> {
        let room_id = required("roomId", self.room_id, limits.max_room_id_len)?;
        let display_name = required("displayName", self.display_name, limits.max_display_name_len)?;
        let user_id = self
            .user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Ok(Handshake {
            room_id,
            display_name,
            user_id,
        })
    }
}

fn required(field: &str, value: Option<String>, max_len: usize) -> Result<String, AppError> {
    let value = value.as_deref().map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(AppError::InvalidHandshake(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(AppError::InvalidHandshake(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(AppError::InvalidHandshake(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(value.to_string())
}
