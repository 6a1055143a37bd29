//! Media collaborator seams and per-track pump loops
//!
//! Capture and rendering are device concerns that live outside this crate;
//! sessions consume them through [`MediaSource`] and [`MediaSink`]. Each
//! inbound track gets its own consumption task with no state shared between
//! tracks, so one bad stream never takes down another.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use crate::error::Result;

/// A frame lifted out of an inbound RTP stream, ready for a renderer.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub payload: Bytes,
    pub timestamp: u32,
    pub sequence: u16,
    pub marker: bool,
}

/// Produces outbound media samples. The offerer publishes one local track
/// per source.
#[async_trait]
pub trait MediaSource: Send + Sync + 'static {
    fn codec(&self) -> RTCRtpCodecCapability;
    /// Next sample to packetize, or `None` at end of stream.
    async fn next_sample(&mut self) -> Result<Option<Sample>>;
}

/// Renders frames from an inbound track.
#[async_trait]
pub trait MediaSink: Send + Sync + 'static {
    async fn render(&self, frame: MediaFrame) -> Result<()>;
}

/// Sink that only logs what arrives. Real display is a device concern
/// outside this crate.
pub struct LogSink;

#[async_trait]
impl MediaSink for LogSink {
    async fn render(&self, frame: MediaFrame) -> Result<()> {
        trace!(
            "frame: {} bytes, ts {} seq {}",
            frame.payload.len(),
            frame.timestamp,
            frame.sequence
        );
        Ok(())
    }
}

/// Start a consumption loop for one inbound track.
///
/// A render failure terminates only this track's loop; the session and any
/// other tracks continue.
pub fn spawn_track_consumer(
    track: Arc<TrackRemote>,
    sink: Arc<dyn MediaSink>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("consuming inbound {} track", track.kind());
        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                res = track.read_rtp() => {
                    let (packet, _) = match res {
                        Ok(p) => p,
                        Err(e) => {
                            debug!("inbound track ended: {}", e);
                            break;
                        }
                    };
                    let frame = MediaFrame {
                        payload: packet.payload,
                        timestamp: packet.header.timestamp,
                        sequence: packet.header.sequence_number,
                        marker: packet.header.marker,
                    };
                    if let Err(e) = sink.render(frame).await {
                        warn!("render failed, stopping this track: {}", e);
                        break;
                    }
                }
            }
        }
        info!("track consumer stopped");
    })
}

/// Pump samples from a source into a published local track.
pub fn spawn_track_writer(
    track: Arc<TrackLocalStaticSample>,
    mut source: Box<dyn MediaSource>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("publishing local track");
        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                res = source.next_sample() => {
                    match res {
                        Ok(Some(sample)) => {
                            if let Err(e) = track.write_sample(&sample).await {
                                debug!("sample write failed: {}", e);
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("media source drained");
                            break;
                        }
                        Err(e) => {
                            warn!("media source error: {}", e);
                            break;
                        }
                    }
                }
            }
        }
        info!("track writer stopped");
    })
}
