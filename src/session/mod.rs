//! Client-side peer session
//!
//! Drives one peer connection through offer/answer negotiation over a
//! signaling relay, fans out per-track consumption loops, and keeps the
//! data channel alive with a heartbeat.

pub mod heartbeat;
pub mod media;
mod peer;
mod signaling;
mod types;

#[cfg(test)]
mod tests;

pub use peer::{EngineEvent, PeerSession};
pub use signaling::{Session, SignalingClient, TlsMaterial};
pub use types::{MessageKind, Role, SessionConfig, SessionState, SignalingMessage};
