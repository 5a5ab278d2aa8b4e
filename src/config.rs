use crate::error::ConfigError;
use crate::peer::types::{ServerConfig, ServerKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Logging is on by default in debug builds only; `LogConfig` can override it.
#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:9000/peerjs";
pub const DEFAULT_SIGNALING_KEY: &str = "peerjs";
pub const DEFAULT_CHANNEL_LABEL: &str = "ssc-data";

/// Settings fixed for the lifetime of a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub signaling: SignalingConfig,
    /// NAT-assistance relays handed to every peer connection.
    pub ice_servers: Vec<ServerConfig>,
    pub channel_label: String,
    /// How long a dropped peer connection may take to recover before it is
    /// reported as failed.
    pub grace_period_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SignalingConfig {
    pub url: String,
    pub key: String,
    pub heartbeat_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig::default(),
            ice_servers: default_ice_servers(),
            channel_label: DEFAULT_CHANNEL_LABEL.into(),
            grace_period_secs: 10,
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SIGNALING_URL.into(),
            key: DEFAULT_SIGNALING_KEY.into(),
            heartbeat_interval_secs: 5,
        }
    }
}

impl SignalingConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

impl SessionConfig {
    /// Loads a JSON config file; missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signaling.url.trim().is_empty() {
            return Err(ConfigError::EmptySignalingUrl);
        }
        for server in &self.ice_servers {
            if server.url.trim().is_empty() {
                return Err(ConfigError::EmptyServerUrl(server.id.clone()));
            }
            if server.kind == ServerKind::Turn
                && (server.username.is_none() || server.credential.is_none())
            {
                return Err(ConfigError::MissingTurnCredentials(server.id.clone()));
            }
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::stun("default-stun", "stun:stun.l.google.com:19302"),
        ServerConfig::stun("default-stun-1", "stun:stun1.l.google.com:19302"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.grace_period(), Duration::from_secs(10));
    }

    #[test]
    fn turn_server_without_credentials_is_rejected() {
        let mut config = SessionConfig::default();
        config.ice_servers.push(ServerConfig {
            id: "relay".into(),
            kind: ServerKind::Turn,
            url: "turn.example.org:3478".into(),
            username: Some("user".into()),
            credential: None,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingTurnCredentials(id)) if id == "relay"
        ));
    }

    #[test]
    fn empty_urls_are_rejected() {
        let mut config = SessionConfig::default();
        config.ice_servers[0].url = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyServerUrl(_))));

        let mut config = SessionConfig::default();
        config.signaling.url.clear();
        assert!(matches!(config.validate(), Err(ConfigError::EmptySignalingUrl)));
    }

    #[test]
    fn partial_json_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"signaling": {{"url": "wss://rendezvous.example.org/peerjs"}}, "grace_period_secs": 3}}"#
        )
        .unwrap();

        let config = SessionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.signaling.url, "wss://rendezvous.example.org/peerjs");
        assert_eq!(config.signaling.key, DEFAULT_SIGNALING_KEY);
        assert_eq!(config.grace_period_secs, 3);
        assert_eq!(config.ice_servers, default_ice_servers());
    }
}
