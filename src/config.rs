//! Configuration loaded from a TOML file, with serde-level defaults so a
//! partial (or absent) file still yields a complete configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::session::SessionConfig;

const DEFAULT_CONFIG_FILE: &str = "peerbridge.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,
    #[serde(default = "default_data_channel_label")]
    pub data_channel_label: String,
    #[serde(default = "default_heartbeat_payload")]
    pub heartbeat_payload: String,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_channel_wait_ms")]
    pub channel_wait_ms: u64,
    #[serde(default = "default_max_buffered_bytes")]
    pub max_buffered_bytes: usize,
}

fn default_bind_address() -> String {
    peerbridge_relay::DEFAULT_RELAY_ADDR.to_string()
}

fn default_relay_url() -> String {
    format!("ws://{}", peerbridge_relay::DEFAULT_RELAY_ADDR)
}

fn default_stun_servers() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun.cloudflare.com:3478".to_string(),
    ]
}

fn default_data_channel_label() -> String {
    "chat".to_string()
}

fn default_heartbeat_payload() -> String {
    "ping".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    100
}

fn default_channel_wait_ms() -> u64 {
    1000
}

fn default_max_buffered_bytes() -> usize {
    1024 * 1024
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            stun_servers: default_stun_servers(),
            data_channel_label: default_data_channel_label(),
            heartbeat_payload: default_heartbeat_payload(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            channel_wait_ms: default_channel_wait_ms(),
            max_buffered_bytes: default_max_buffered_bytes(),
        }
    }
}

impl Config {
    /// Load from an explicit path, from `peerbridge.toml` in the working
    /// directory, or fall back to defaults when neither exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Config::default());
                }
                default
            }
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            relay_url: self.session.relay_url.clone(),
            stun_servers: self.session.stun_servers.clone(),
            data_channel_label: self.session.data_channel_label.clone(),
            heartbeat_payload: self.session.heartbeat_payload.clone(),
            heartbeat_interval_ms: self.session.heartbeat_interval_ms,
            channel_wait_ms: self.session.channel_wait_ms,
            max_buffered_bytes: self.session.max_buffered_bytes,
        }
    }
}
