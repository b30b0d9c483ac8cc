use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("couldn't read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Everything the server reads at startup. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub shutdown_kick_reason: String,
    /// Scheduler ticks per second.
    pub tick_rate: u32,
    /// Ticks between keep-alives.
    pub keep_alive_interval: u64,
    pub lan_announce: bool,
    pub server: ServerInfo,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 25565,
            log_level: "info".into(),
            shutdown_kick_reason: "Server closed".into(),
            tick_rate: 20,
            keep_alive_interval: 200,
            lan_announce: false,
            server: ServerInfo::default(),
        }
    }
}

/// What the status response advertises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerInfo {
    pub version_name: String,
    pub protocol: i32,
    pub motd: String,
    pub max_players: u32,
    pub enforces_secure_chat: bool,
}
impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            version_name: "1.20.1".into(),
            protocol: 763,
            motd: "A Minecraft Server".into(),
            max_players: 20,
            enforces_secure_chat: false,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tickRate must be positive"));
        }
        if self.keep_alive_interval == 0 {
            return Err(ConfigError::Invalid("keepAliveInterval must be positive"));
        }
        Ok(())
    }
}
