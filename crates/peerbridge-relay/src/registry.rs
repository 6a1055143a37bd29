//! Endpoint registry and broadcast
//!
//! One registry per relay process. Each connection task registers an
//! outbound queue on connect and unregisters it on any termination path.
//! Broadcast snapshots the endpoint set under the lock, then delivers
//! outside it, so concurrent unregistration never blocks a delivery pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Handle for one registered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(u64);

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The set of currently-open endpoints.
#[derive(Default)]
pub struct Registry {
    endpoints: Mutex<HashMap<EndpointId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint's outbound queue to the active set.
    pub fn register(&self, tx: mpsc::Sender<String>) -> EndpointId {
        let id = EndpointId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.endpoints
            .lock()
            .expect("endpoint registry poisoned")
            .insert(id, tx);
        id
    }

    /// Remove an endpoint. Removing an already-absent endpoint is a no-op.
    pub fn unregister(&self, id: EndpointId) {
        self.endpoints
            .lock()
            .expect("endpoint registry poisoned")
            .remove(&id);
    }

    pub fn len(&self) -> usize {
        self.endpoints
            .lock()
            .expect("endpoint registry poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forward a frame to every registered endpoint except the sender.
    ///
    /// Delivery is best-effort per receiver: a backlogged or vanished
    /// endpoint is skipped and logged, never allowed to stall the rest.
    /// Returns the number of successful deliveries.
    pub fn broadcast(&self, frame: &str, sender: EndpointId) -> usize {
        let targets: Vec<(EndpointId, mpsc::Sender<String>)> = {
            let endpoints = self.endpoints.lock().expect("endpoint registry poisoned");
            endpoints
                .iter()
                .filter(|(id, _)| **id != sender)
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("endpoint {} backlogged, dropping frame", id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("endpoint {} gone, skipping", id);
                }
            }
        }
        delivered
    }
}
