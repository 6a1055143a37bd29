//! Error types for peer sessions

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// A signaling payload that could not be encoded or decoded. Inbound
    /// malformed messages are dropped and logged, never fatal.
    #[error("malformed signaling message: {0}")]
    Malformed(String),

    #[error("signaling transport error: {0}")]
    SignalingTransport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The relay closed the signaling connection before negotiation finished.
    #[error("signaling connection lost before negotiation completed")]
    SignalingClosed,

    /// Remote description rejected or offer/answer mismatch. Terminal for
    /// the session.
    #[error("negotiation failure: {0}")]
    Negotiation(String),

    /// The engine reported the peer connection as failed. Terminal.
    #[error("peer connection failed")]
    ConnectionFailed,

    /// A frame could not be decoded or rendered. Terminates only the
    /// affected track's consumption loop.
    #[error("media consumption error: {0}")]
    MediaConsumption(String),

    /// A send was attempted without an open data channel. The liveness
    /// loop treats this as a wait state, not a failure.
    #[error("data channel unavailable")]
    ChannelUnavailable,

    #[error("tls setup error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] webrtc::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
