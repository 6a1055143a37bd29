//! Signaling transport and the session run loop
//!
//! The signaling client holds the WebSocket write half and pumps the read
//! half into a plain channel, so the session loop can select over inbound
//! signals and engine events without any shared mutable state.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, tungstenite::protocol::Message, Connector,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::error::{Result, SessionError};
use crate::session::heartbeat::{self, HeartbeatConfig};
use crate::session::media::{self, MediaSink, MediaSource};
use crate::session::peer::{self, EngineEvent, PeerSession};
use crate::session::types::{MessageKind, Role, SessionConfig, SessionState, SignalingMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// TLS material for `wss://` relays. A certificate alone is trusted as an
/// additional root; together with a key it becomes a client identity.
#[derive(Debug, Clone, Default)]
pub struct TlsMaterial {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl TlsMaterial {
    fn connector(&self) -> Result<Option<Connector>> {
        if self.cert_file.is_none() && self.key_file.is_none() {
            return Ok(None);
        }

        let mut builder = native_tls::TlsConnector::builder();
        match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => {
                let cert_pem = fs::read(cert)?;
                let key_pem = fs::read(key)?;
                builder.identity(native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)?);
            }
            (Some(cert), None) => {
                builder.add_root_certificate(native_tls::Certificate::from_pem(&fs::read(cert)?)?);
            }
            (None, _) => {
                warn!("a key file without a certificate is unusable, ignoring it");
                return Ok(None);
            }
        }
        Ok(Some(Connector::NativeTls(builder.build()?)))
    }
}

/// WebSocket connection to the signaling relay.
pub struct SignalingClient {
    out: SplitSink<WsStream, Message>,
    inbox: Option<mpsc::Receiver<SignalingMessage>>,
}

impl SignalingClient {
    pub async fn connect(url: &str, tls: &TlsMaterial) -> Result<Self> {
        let (stream, _) = match tls.connector()? {
            Some(connector) => {
                connect_async_tls_with_config(url, None, false, Some(connector)).await?
            }
            None => connect_async(url).await?,
        };
        let (out, read) = stream.split();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump_inbound(read, tx));

        Ok(Self {
            out,
            inbox: Some(rx),
        })
    }

    /// Take the inbound message stream. The stream ends when the relay
    /// connection does.
    pub fn take_inbox(&mut self) -> mpsc::Receiver<SignalingMessage> {
        self.inbox.take().expect("signaling inbox already taken")
    }

    pub async fn send(&mut self, msg: &SignalingMessage) -> Result<()> {
        let frame = msg.encode()?;
        self.out.send(Message::Text(frame)).await?;
        debug!("sent {}", msg.kind());
        Ok(())
    }

    pub async fn close(&mut self) {
        let _ = self.out.send(Message::Close(None)).await;
    }
}

/// Decode inbound frames and hand them to the session loop. Malformed
/// messages are dropped and logged, never fatal; the channel closing is the
/// session's signal that the transport is gone.
async fn pump_inbound(mut read: SplitStream<WsStream>, tx: mpsc::Sender<SignalingMessage>) {
    while let Some(item) = read.next().await {
        match item {
            Ok(Message::Text(text)) => match SignalingMessage::decode(&text) {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("dropping malformed signaling message: {}", e),
            },
            Ok(Message::Close(_)) => {
                debug!("relay closed the signaling connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("signaling transport error: {}", e);
                break;
            }
        }
    }
}

/// What to do with an inbound signaling message, given role and state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalAction {
    ApplyAnswer,
    ApplyOffer,
    ApplyCandidate,
    Reject,
    Ignore,
}

pub(crate) fn classify_signal(role: Role, state: SessionState, kind: MessageKind) -> SignalAction {
    match kind {
        // only the answer that pairs our outstanding offer counts
        MessageKind::Answer => match (role, state) {
            (Role::Offerer, SessionState::Offering) => SignalAction::ApplyAnswer,
            _ => SignalAction::Ignore,
        },
        MessageKind::Offer => match (role, state) {
            (Role::Answerer, SessionState::Answering) => SignalAction::ApplyOffer,
            // an offer reaching an offerer means both sides think they lead
            (Role::Offerer, _) => SignalAction::Reject,
            _ => SignalAction::Ignore,
        },
        MessageKind::Candidate => match state {
            SessionState::Closed | SessionState::Failed => SignalAction::Ignore,
            _ => SignalAction::ApplyCandidate,
        },
    }
}

/// One client-side peer session: a peer connection, a signaling connection,
/// a role, and zero-or-one data channel. Lives for the process lifetime;
/// a failed session is terminal and never recreated.
pub struct Session {
    role: Role,
    config: SessionConfig,
    state: SessionState,
    peer: PeerSession,
    signaling: SignalingClient,
    signaling_open: bool,
    events_rx: Option<mpsc::Receiver<EngineEvent>>,
    state_tx: watch::Sender<SessionState>,
    channel_tx: watch::Sender<Option<Arc<RTCDataChannel>>>,
    shutdown: Arc<watch::Sender<bool>>,
    pending_candidates: Vec<RTCIceCandidateInit>,
    remote_description_set: bool,
    sink: Arc<dyn MediaSink>,
    source: Option<Box<dyn MediaSource>>,
}

impl Session {
    pub async fn connect(
        role: Role,
        config: SessionConfig,
        tls: TlsMaterial,
        sink: Arc<dyn MediaSink>,
        source: Option<Box<dyn MediaSource>>,
    ) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::channel(64);
        let peer = PeerSession::new(&config.stun_servers, events_tx).await?;
        peer.attach_handlers();

        info!("connecting to signaling relay at {}", config.relay_url);
        let signaling = SignalingClient::connect(&config.relay_url, &tls).await?;
        info!("signaling connected as {}", role);

        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (shutdown_tx, _) = watch::channel(false);
        let (channel_tx, _) = watch::channel(None);

        let mut session = Self {
            role,
            config,
            state: SessionState::Idle,
            peer,
            signaling,
            signaling_open: true,
            events_rx: Some(events_rx),
            state_tx,
            channel_tx,
            shutdown: Arc::new(shutdown_tx),
            pending_candidates: Vec::new(),
            remote_description_set: false,
            sink,
            source,
        };
        session.set_state(SessionState::SignalingConnected);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Watch state transitions from outside the run loop.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Shared shutdown signal; sending `true` tears the session down.
    pub fn shutdown_signal(&self) -> Arc<watch::Sender<bool>> {
        self.shutdown.clone()
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("session state {} -> {}", self.state, state);
            self.state = state;
            let _ = self.state_tx.send(state);
        }
    }

    /// Drive the session until it closes, fails, or is shut down.
    pub async fn run(mut self) -> Result<()> {
        let heartbeat_task = tokio::spawn(heartbeat::run(
            self.channel_tx.subscribe(),
            self.shutdown.subscribe(),
            HeartbeatConfig::from(&self.config),
        ));

        let result = self.drive().await;

        let _ = self.shutdown.send(true);
        self.signaling.close().await;
        if let Err(e) = self.peer.close().await {
            debug!("peer connection close: {}", e);
        }
        let _ = heartbeat_task.await;

        match &result {
            Ok(()) => info!("session ended in state {}", self.state),
            Err(e) => error!("session failed: {}", e),
        }
        result
    }

    async fn drive(&mut self) -> Result<()> {
        let mut inbox = self.signaling.take_inbox();
        let mut events_rx = self.events_rx.take().expect("engine events already taken");
        let mut shutdown_rx = self.shutdown.subscribe();

        match self.role {
            Role::Offerer => self.start_offer().await?,
            Role::Answerer => self.set_state(SessionState::Answering),
        }

        loop {
            let signaling_open = self.signaling_open;
            tokio::select! {
                maybe_ev = events_rx.recv() => {
                    let Some(ev) = maybe_ev else { break };
                    self.handle_engine_event(ev).await?;
                }
                maybe_msg = inbox.recv(), if signaling_open => {
                    match maybe_msg {
                        Some(msg) => self.handle_signal(msg).await?,
                        None => self.signaling_lost()?,
                    }
                }
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        self.set_state(SessionState::Closed);
                    }
                }
            }

            match self.state {
                SessionState::Closed => return Ok(()),
                SessionState::Failed => return Err(SessionError::ConnectionFailed),
                _ => {}
            }
        }
        Ok(())
    }

    /// Offerer opening move: channel first, then the offer.
    async fn start_offer(&mut self) -> Result<()> {
        if let Some(source) = self.source.take() {
            let track = self.peer.publish_track(source.codec(), "video").await?;
            media::spawn_track_writer(track, source, self.shutdown.subscribe());
        }

        let channel = self.peer.create_channel(&self.config.data_channel_label).await?;
        let _ = self.channel_tx.send(Some(channel));

        let sdp = self.peer.create_offer().await?;
        self.signaling.send(&SignalingMessage::Offer { sdp }).await?;
        info!("offer sent");
        self.set_state(SessionState::Offering);
        Ok(())
    }

    async fn handle_signal(&mut self, msg: SignalingMessage) -> Result<()> {
        match classify_signal(self.role, self.state, msg.kind()) {
            SignalAction::ApplyAnswer => {
                if let SignalingMessage::Answer { sdp } = msg {
                    match self.peer.apply_answer(sdp).await {
                        Ok(()) => {
                            info!("answer applied");
                            self.description_exchanged().await;
                        }
                        Err(e) => {
                            self.set_state(SessionState::Failed);
                            return Err(e);
                        }
                    }
                }
            }
            SignalAction::ApplyOffer => {
                if let SignalingMessage::Offer { sdp } = msg {
                    let answer = match self.peer.apply_offer(sdp).await {
                        Ok(answer) => answer,
                        Err(e) => {
                            self.set_state(SessionState::Failed);
                            return Err(e);
                        }
                    };
                    self.signaling
                        .send(&SignalingMessage::Answer { sdp: answer })
                        .await?;
                    info!("offer applied, answer sent");
                    self.description_exchanged().await;
                }
            }
            SignalAction::ApplyCandidate => {
                if let SignalingMessage::Candidate {
                    candidate,
                    sdp_mid,
                    sdp_mline_index,
                    username_fragment,
                } = msg
                {
                    let init =
                        peer::candidate_init(candidate, sdp_mid, sdp_mline_index, username_fragment);
                    if self.remote_description_set {
                        if let Err(e) = self.peer.add_remote_candidate(init).await {
                            debug!("failed to add remote candidate: {}", e);
                        }
                    } else {
                        self.pending_candidates.push(init);
                    }
                }
            }
            SignalAction::Reject => {
                self.set_state(SessionState::Failed);
                return Err(SessionError::Negotiation(format!(
                    "unexpected {} message while {} in state {}",
                    msg.kind(),
                    self.role,
                    self.state
                )));
            }
            SignalAction::Ignore => {
                warn!("ignoring {} message in state {}", msg.kind(), self.state);
            }
        }
        Ok(())
    }

    async fn description_exchanged(&mut self) {
        self.remote_description_set = true;
        self.set_state(SessionState::DescriptionExchanged);
        for init in std::mem::take(&mut self.pending_candidates) {
            if let Err(e) = self.peer.add_remote_candidate(init).await {
                debug!("failed to add buffered candidate: {}", e);
            }
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::LocalCandidate(init) => {
                if self.signaling_open {
                    let msg = peer::candidate_message(init);
                    if let Err(e) = self.signaling.send(&msg).await {
                        warn!("failed to send local candidate: {}", e);
                        self.signaling_lost()?;
                    }
                }
            }
            EngineEvent::RemoteTrack(track) => {
                info!("inbound {} track received", track.kind());
                media::spawn_track_consumer(track, self.sink.clone(), self.shutdown.subscribe());
                self.enter_active();
            }
            EngineEvent::ChannelOpened(channel) => {
                let _ = self.channel_tx.send(Some(channel));
            }
            EngineEvent::ChannelReady(label) => {
                info!("data channel \"{}\" open", label);
                self.enter_active();
            }
            EngineEvent::ChannelMessage(text) => {
                debug!("data channel message: {}", text);
            }
            EngineEvent::ConnectionState(state) => {
                info!("connection state: {}", state);
                match state {
                    RTCPeerConnectionState::Failed => {
                        if let Err(e) = self.peer.close().await {
                            debug!("closing failed peer connection: {}", e);
                        }
                        self.set_state(SessionState::Failed);
                    }
                    RTCPeerConnectionState::Closed => {
                        self.set_state(SessionState::Closed);
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn enter_active(&mut self) {
        if self.state == SessionState::DescriptionExchanged {
            self.set_state(SessionState::TrackAndChannelActive);
        }
    }

    /// The relay connection is gone. Fatal while negotiating; once
    /// descriptions are exchanged the direct transport stands on its own.
    fn signaling_lost(&mut self) -> Result<()> {
        self.signaling_open = false;
        match self.state {
            SessionState::SignalingConnected
            | SessionState::Offering
            | SessionState::Answering => {
                self.set_state(SessionState::Failed);
                Err(SessionError::SignalingClosed)
            }
            _ => {
                warn!("signaling connection lost after negotiation, continuing on the direct transport");
                Ok(())
            }
        }
    }
}
