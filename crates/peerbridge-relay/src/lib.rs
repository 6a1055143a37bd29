//! WebSocket signaling relay
//!
//! Accepts anonymous WebSocket connections and forwards offer/answer/candidate
//! frames from each endpoint to every other registered endpoint. The relay
//! never inspects payloads beyond the `type` field and forwards frames
//! verbatim, so peers are free to extend the envelope.

mod envelope;
mod registry;
mod server;

pub use envelope::{classify, EnvelopeError, ForwardKind};
pub use registry::{EndpointId, Registry};
pub use server::{ws_handler, RelayServer, RelayState, DEFAULT_RELAY_ADDR};
