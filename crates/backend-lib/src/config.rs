// ============================
// watchparty-backend/src/config.rs
// ============================
//! Configuration management.
use crate::error::AppError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Default config file looked up by [`Settings::load`]
pub const DEFAULT_CONFIG_FILE: &str = "watchparty.toml";

/// Prefix for environment overrides, e.g. `WATCHPARTY_BIND_ADDR`
pub const ENV_PREFIX: &str = "WATCHPARTY_";

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log filter, e.g. `info` or `info,tower_http=debug`. `RUST_LOG` wins when set
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Interval between server pings on each connection
    pub heartbeat_interval_secs: u64,
    /// A connection with no inbound frame for this long is dropped
    pub client_timeout_secs: u64,
    /// Input size limits
    pub limits: RoomLimits,
}

/// Size limits applied to handshakes and relayed payloads
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomLimits {
    pub max_room_id_len: usize,
    pub max_display_name_len: usize,
    pub max_message_len: usize,
    pub max_emoji_len: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            log_level: "info".to_string(),
            log_json: false,
            heartbeat_interval_secs: 25,
            client_timeout_secs: 60,
            limits: RoomLimits::default(),
        }
    }
}

impl Default for RoomLimits {
    fn default() -> Self {
        Self {
            max_room_id_len: 128,
            max_display_name_len: 64,
            max_message_len: 2000,
            max_emoji_len: 32,
        }
    }
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_FILE`] (if present) and the environment
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load defaults, then the given TOML file (if present), then `WATCHPARTY_*` env vars.
    /// Nested keys use a double underscore: `WATCHPARTY_LIMITS__MAX_MESSAGE_LEN`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        validate_log_filter(&self.log_level)?;
        if self.heartbeat_interval_secs == 0 {
            return Err(AppError::InvalidConfig(
                "heartbeat_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.client_timeout_secs <= self.heartbeat_interval_secs {
            return Err(AppError::InvalidConfig(
                "client_timeout_secs must exceed heartbeat_interval_secs".to_string(),
            ));
        }
        let limits = &self.limits;
        if limits.max_room_id_len == 0
            || limits.max_display_name_len == 0
            || limits.max_message_len == 0
            || limits.max_emoji_len == 0
        {
            return Err(AppError::InvalidConfig(
                "limits must all be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

/// Accept `EnvFilter` directives whose levels all parse: a bare level or
/// `target=level`, comma separated. Bare target names are rejected so a typo
/// in the level is not silently read as a target.
fn validate_log_filter(filter: &str) -> Result<(), AppError> {
    let invalid = |detail: String| AppError::InvalidConfig(format!("log_level {filter:?}: {detail}"));
    let mut directives = filter.split(',').map(str::trim).filter(|d| !d.is_empty()).peekable();
    if directives.peek().is_none() {
        return Err(invalid("must not be empty".to_string()));
    }
    for directive in directives {
        let level = directive.rsplit_once('=').map_or(directive, |(_, level)| level);
        LevelFilter::from_str(level)
            .map_err(|_| invalid(format!("unknown level in directive `{directive}`")))?;
    }
    EnvFilter::try_new(filter).map_err(|e| invalid(e.to_string()))?;
    Ok(())
}
