//! Data-channel liveness loop
//!
//! Sends a fixed payload while the channel is open, waits while it is still
//! connecting, and stops once it closes. The channel handle may arrive after
//! the loop starts (the answerer learns about the channel from an engine
//! event), so the loop watches for it instead of requiring it up front.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, trace, warn};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

use crate::error::Result;
use crate::session::types::SessionConfig;

/// Channel ready-state as the liveness loop sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// What the liveness loop needs from a data channel. `RTCDataChannel`
/// implements it; tests substitute a scripted channel.
#[async_trait]
pub trait LivenessChannel: Send + Sync + 'static {
    fn ready_state(&self) -> ChannelReadyState;
    async fn buffered_amount(&self) -> usize;
    async fn send_payload(&self, payload: &str) -> Result<()>;
}

#[async_trait]
impl LivenessChannel for RTCDataChannel {
    fn ready_state(&self) -> ChannelReadyState {
        match RTCDataChannel::ready_state(self) {
            RTCDataChannelState::Open => ChannelReadyState::Open,
            RTCDataChannelState::Closing => ChannelReadyState::Closing,
            RTCDataChannelState::Closed => ChannelReadyState::Closed,
            _ => ChannelReadyState::Connecting,
        }
    }

    async fn buffered_amount(&self) -> usize {
        RTCDataChannel::buffered_amount(self).await
    }

    async fn send_payload(&self, payload: &str) -> Result<()> {
        self.send_text(payload.to_string()).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub payload: String,
    pub send_interval: Duration,
    pub wait_interval: Duration,
    pub max_buffered: usize,
}

impl From<&SessionConfig> for HeartbeatConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            payload: config.heartbeat_payload.clone(),
            send_interval: Duration::from_millis(config.heartbeat_interval_ms),
            wait_interval: Duration::from_millis(config.channel_wait_ms),
            max_buffered: config.max_buffered_bytes,
        }
    }
}

/// Run the liveness loop until the channel closes or the session shuts down.
pub async fn run<C: LivenessChannel>(
    mut channel_rx: watch::Receiver<Option<Arc<C>>>,
    mut shutdown: watch::Receiver<bool>,
    config: HeartbeatConfig,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let channel = channel_rx.borrow().clone();
        let Some(channel) = channel else {
            tokio::select! {
                res = channel_rx.changed() => {
                    if res.is_err() {
                        return;
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() {
                        return;
                    }
                }
            }
            continue;
        };

        match channel.ready_state() {
            ChannelReadyState::Open => {
                if channel.buffered_amount().await <= config.max_buffered {
                    if let Err(e) = channel.send_payload(&config.payload).await {
                        warn!("heartbeat send failed: {}", e);
                    }
                } else {
                    trace!("channel backlogged, skipping heartbeat");
                }
                if sleep_or_shutdown(config.send_interval, &mut shutdown).await {
                    break;
                }
            }
            ChannelReadyState::Connecting => {
                if sleep_or_shutdown(config.wait_interval, &mut shutdown).await {
                    break;
                }
            }
            ChannelReadyState::Closing | ChannelReadyState::Closed => {
                info!("data channel closed, stopping heartbeat");
                break;
            }
        }
    }
}

/// Returns true when the session shut down during the sleep.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        res = shutdown.changed() => res.is_err() || *shutdown.borrow(),
    }
}
