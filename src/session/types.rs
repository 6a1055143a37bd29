//! Signaling wire types and session configuration

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Messages exchanged through the signaling relay.
///
/// One JSON object per WebSocket text frame, discriminated by `type`.
/// Candidate fields follow the browser `RTCIceCandidateInit` naming so the
/// wire format stays interoperable with non-Rust peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    Candidate {
        candidate: String,
        #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(
            rename = "sdpMLineIndex",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        sdp_mline_index: Option<u16>,
        #[serde(
            rename = "usernameFragment",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        username_fragment: Option<String>,
    },
}

/// Discriminant of a [`SignalingMessage`], for routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Offer,
    Answer,
    Candidate,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Offer => write!(f, "offer"),
            MessageKind::Answer => write!(f, "answer"),
            MessageKind::Candidate => write!(f, "candidate"),
        }
    }
}

impl SignalingMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalingMessage::Offer { .. } => MessageKind::Offer,
            SignalingMessage::Answer { .. } => MessageKind::Answer,
            SignalingMessage::Candidate { .. } => MessageKind::Candidate,
        }
    }

    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Malformed(e.to_string()))
    }

    pub fn decode(frame: &str) -> Result<Self, SessionError> {
        serde_json::from_str(frame).map_err(|e| SessionError::Malformed(e.to_string()))
    }
}

/// Which side of the negotiation this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Offerer => write!(f, "offerer"),
            Role::Answerer => write!(f, "answerer"),
        }
    }
}

/// Lifecycle of one peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SignalingConnected,
    Offering,
    Answering,
    DescriptionExchanged,
    TrackAndChannelActive,
    Closed,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::SignalingConnected => write!(f, "signaling-connected"),
            SessionState::Offering => write!(f, "offering"),
            SessionState::Answering => write!(f, "answering"),
            SessionState::DescriptionExchanged => write!(f, "description-exchanged"),
            SessionState::TrackAndChannelActive => write!(f, "track-and-channel-active"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Runtime configuration for one peer session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Signaling relay URL
    pub relay_url: String,
    /// STUN servers handed to the engine for NAT traversal
    pub stun_servers: Vec<String>,
    /// Label of the data channel the offerer creates
    pub data_channel_label: String,
    /// Fixed payload sent by the liveness loop
    pub heartbeat_payload: String,
    /// Interval between heartbeats while the channel is open, milliseconds
    pub heartbeat_interval_ms: u64,
    /// Re-check interval while the channel is not yet open, milliseconds
    pub channel_wait_ms: u64,
    /// Heartbeats are skipped while the channel buffers more than this
    pub max_buffered_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay_url: format!("ws://{}", peerbridge_relay::DEFAULT_RELAY_ADDR),
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun.cloudflare.com:3478".to_string(),
            ],
            data_channel_label: "chat".to_string(),
            heartbeat_payload: "ping".to_string(),
            heartbeat_interval_ms: 100,
            channel_wait_ms: 1000,
            max_buffered_bytes: 1024 * 1024,
        }
    }
}
