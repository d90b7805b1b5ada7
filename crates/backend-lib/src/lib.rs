// ============================
// watchparty-backend/src/lib.rs
// ============================
//! Core backend functionality for the watch party sync server.

pub mod chat;
pub mod config;
pub mod error;
pub mod handshake;
pub mod metrics;
pub mod registry;
pub mod room;
pub mod room_actor;
pub mod websocket;
pub mod ws_router;

use crate::config::Settings;
use crate::registry::RoomRegistry;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Live rooms
    pub registry: Arc<RoomRegistry>,
    /// Loaded settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create a new application state with an empty registry
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(RoomRegistry::new(settings.limits));
        Self {
            registry,
            settings: Arc::new(settings),
        }
    }

    /// Create a new application state with settings loaded from the default sources
    pub fn new_default() -> Result<Self, error::AppError> {
        Ok(Self::new(Settings::load()?))
    }
}
