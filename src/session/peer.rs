//! Peer-connection engine wrapper
//!
//! Wraps one `RTCPeerConnection` and converts its callback-based events into
//! typed [`EngineEvent`]s delivered over a channel to the owning session
//! loop, so no closure ever captures mutable session state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{Result, SessionError};
use crate::session::types::SignalingMessage;

/// Engine happenings, delivered to the session loop in arrival order.
pub enum EngineEvent {
    /// The engine produced a local ICE candidate to trickle to the peer.
    LocalCandidate(RTCIceCandidateInit),
    /// An inbound media track appeared.
    RemoteTrack(Arc<TrackRemote>),
    /// The remote peer created a data channel towards us.
    ChannelOpened(Arc<RTCDataChannel>),
    /// A data channel (ours or theirs) finished opening.
    ChannelReady(String),
    /// Text received on a data channel.
    ChannelMessage(String),
    ConnectionState(RTCPeerConnectionState),
}

/// One peer-connection instance behind an event-channel facade.
pub struct PeerSession {
    pc: Arc<RTCPeerConnection>,
    events_tx: mpsc::Sender<EngineEvent>,
}

impl PeerSession {
    pub async fn new(
        stun_servers: &[String],
        events_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);

        Ok(Self { pc, events_tx })
    }

    /// Register the engine callbacks. Each one forwards a typed event and
    /// nothing else.
    pub fn attach_handlers(&self) {
        let tx = self.events_tx.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let tx = tx.clone();
                Box::pin(async move {
                    if let Some(c) = candidate {
                        match c.to_json() {
                            Ok(init) => {
                                let _ = tx.send(EngineEvent::LocalCandidate(init)).await;
                            }
                            Err(e) => debug!("failed to serialize local candidate: {}", e),
                        }
                    }
                })
            }));

        let tx = self.events_tx.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(EngineEvent::ConnectionState(state)).await;
                })
            }));

        let tx = self.events_tx.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(EngineEvent::RemoteTrack(track)).await;
                })
            },
        ));

        let tx = self.events_tx.clone();
        self.pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let tx = tx.clone();
            Box::pin(async move {
                info!("data channel \"{}\" announced by remote peer", dc.label());
                Self::wire_channel(&dc, tx.clone());
                let _ = tx.send(EngineEvent::ChannelOpened(dc)).await;
            })
        }));
    }

    fn wire_channel(dc: &Arc<RTCDataChannel>, events_tx: mpsc::Sender<EngineEvent>) {
        let label = dc.label().to_string();
        let tx = events_tx.clone();
        dc.on_open(Box::new(move || {
            let tx = tx.clone();
            let label = label.clone();
            Box::pin(async move {
                let _ = tx.send(EngineEvent::ChannelReady(label)).await;
            })
        }));

        let tx = events_tx;
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let tx = tx.clone();
            Box::pin(async move {
                if msg.is_string {
                    if let Ok(text) = String::from_utf8(msg.data.to_vec()) {
                        let _ = tx.send(EngineEvent::ChannelMessage(text)).await;
                    }
                } else {
                    trace!("ignoring {} byte binary channel message", msg.data.len());
                }
            })
        }));
    }

    /// Create the local data channel (offerer path) and wire its events.
    pub async fn create_channel(&self, label: &str) -> Result<Arc<RTCDataChannel>> {
        let dc = self.pc.create_data_channel(label, None).await?;
        Self::wire_channel(&dc, self.events_tx.clone());
        Ok(dc)
    }

    /// Add a local sample track for outbound media.
    pub async fn publish_track(
        &self,
        codec: RTCRtpCodecCapability,
        id: &str,
    ) -> Result<Arc<TrackLocalStaticSample>> {
        let track = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.to_string(),
            "peerbridge".to_string(),
        ));
        self.pc
            .add_track(track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        Ok(track)
    }

    /// Create a local offer and install it as the local description.
    pub async fn create_offer(&self) -> Result<String> {
        let offer = self.pc.create_offer(None).await?;
        let sdp = offer.sdp.clone();
        self.pc.set_local_description(offer).await?;
        Ok(sdp)
    }

    /// Apply the peer's answer as the remote description.
    pub async fn apply_answer(&self, sdp: String) -> Result<()> {
        let desc = RTCSessionDescription::answer(sdp)
            .map_err(|e| SessionError::Negotiation(format!("invalid answer description: {e}")))?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| SessionError::Negotiation(format!("remote answer rejected: {e}")))?;
        Ok(())
    }

    /// Apply the peer's offer, then create and install a local answer.
    /// Returns the answer SDP to send back.
    pub async fn apply_offer(&self, sdp: String) -> Result<String> {
        let desc = RTCSessionDescription::offer(sdp)
            .map_err(|e| SessionError::Negotiation(format!("invalid offer description: {e}")))?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| SessionError::Negotiation(format!("remote offer rejected: {e}")))?;

        let answer = self.pc.create_answer(None).await?;
        let sdp = answer.sdp.clone();
        self.pc.set_local_description(answer).await?;
        Ok(sdp)
    }

    pub async fn add_remote_candidate(&self, init: RTCIceCandidateInit) -> Result<()> {
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.pc.connection_state()
    }

    pub async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

/// Lift a local candidate into its wire form.
pub(crate) fn candidate_message(init: RTCIceCandidateInit) -> SignalingMessage {
    SignalingMessage::Candidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

/// Rebuild the engine's candidate type from a wire message.
pub(crate) fn candidate_init(
    candidate: String,
    sdp_mid: Option<String>,
    sdp_mline_index: Option<u16>,
    username_fragment: Option<String>,
) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate,
        sdp_mid,
        sdp_mline_index,
        username_fragment,
    }
}
