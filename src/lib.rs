//! Two-peer real-time media/data sessions coordinated through a WebSocket
//! signaling relay.
//!
//! The relay ([`peerbridge_relay`]) pairs anonymous endpoints and forwards
//! offer/answer/candidate frames between them; the [`session`] module drives
//! one peer connection through negotiation, per-track media consumption, and
//! a heartbeat over the data channel.

pub mod config;
pub mod error;
pub mod session;

pub use config::Config;
pub use error::SessionError;
pub use peerbridge_relay as relay;
pub use session::{Role, Session, SessionConfig, SessionState, SignalingMessage, TlsMaterial};
