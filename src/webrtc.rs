use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{Error, Result};
use crate::media::LocalMedia;
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};
use crate::transport::{PeerConnector, PeerLink, PeerTransport, RemoteTrack, TransportEvent};

/// Builds webrtc-rs peer connections that share one API instance and one
/// set of local tracks.
pub struct WebRtcConnector {
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
    media: Arc<LocalMedia>,
}

impl WebRtcConnector {
    pub fn new(ice_servers: Vec<RTCIceServer>, media: Arc<LocalMedia>) -> Result<Self> {
        // Create a MediaEngine object to configure the supported codec
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api: Arc::new(api),
            ice_servers,
            media,
        })
    }
}

impl PeerConnector for WebRtcConnector {
    fn connect(&self, link: PeerLink) -> Arc<dyn PeerTransport> {
        Arc::new(WebRtcTransport {
            api: Arc::clone(&self.api),
            ice_servers: self.ice_servers.clone(),
            media: Arc::clone(&self.media),
            link,
            peer_connection: OnceCell::new(),
            detached: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// One `RTCPeerConnection`, created on first use.
pub struct WebRtcTransport {
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
    media: Arc<LocalMedia>,
    link: PeerLink,
    peer_connection: OnceCell<Arc<RTCPeerConnection>>,
    detached: Arc<AtomicBool>,
}

impl WebRtcTransport {
    async fn peer_connection(&self) -> Result<&Arc<RTCPeerConnection>> {
        if self.detached.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.peer_connection.get_or_try_init(|| self.build()).await
    }

    async fn build(&self) -> Result<Arc<RTCPeerConnection>> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let peer_connection = Arc::new(self.api.new_peer_connection(config).await?);

        for track in self.media.tracks() {
            peer_connection.add_track(track).await?;
        }

        self.register_handlers(&peer_connection);

        // Detached while we were building: nobody will close it for us.
        if self.detached.load(Ordering::Acquire) {
            peer_connection.close().await?;
            return Err(Error::Closed);
        }

        debug!(peer = %self.link.peer(), "Peer connection built");
        Ok(peer_connection)
    }

    fn register_handlers(&self, peer_connection: &RTCPeerConnection) {
        let link = self.link.clone();
        let detached = Arc::clone(&self.detached);
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let link = link.clone();
            let detached = Arc::clone(&detached);
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                if detached.load(Ordering::Acquire) {
                    return;
                }
                match candidate.to_json() {
                    Ok(init) => {
                        link.emit(TransportEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        }));
                    }
                    Err(e) => warn!(peer = %link.peer(), error = %e, "Failed to encode local candidate"),
                }
            })
        }));

        let link = self.link.clone();
        let detached = Arc::clone(&self.detached);
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                let link = link.clone();
                let detached = Arc::clone(&detached);
                Box::pin(async move {
                    if detached.load(Ordering::Acquire) {
                        return;
                    }
                    link.emit(TransportEvent::RemoteTrack(RemoteTrack {
                        stream_id: track.stream_id(),
                        track_id: track.id(),
                        kind: track.kind().into(),
                        handle: Some(track),
                    }));
                })
            },
        ));

        let link = self.link.clone();
        let detached = Arc::clone(&self.detached);
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let link = link.clone();
                let detached = Arc::clone(&detached);
                Box::pin(async move {
                    if detached.load(Ordering::Acquire) {
                        return;
                    }
                    debug!(peer = %link.peer(), %state, "Peer connection state changed");
                    match state {
                        RTCPeerConnectionState::Connected => {
                            link.emit(TransportEvent::Connected);
                        }
                        RTCPeerConnectionState::Failed => {
                            link.emit(TransportEvent::Failed(state.to_string()));
                        }
                        _ => {}
                    }
                })
            },
        ));
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn open(&self) -> Result<()> {
        self.peer_connection().await.map(|_| ())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let peer_connection = self.peer_connection().await?;
        let offer = peer_connection.create_offer(None).await?;
        peer_connection.set_local_description(offer.clone()).await?;
        from_rtc(&offer)
    }

    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let peer_connection = self.peer_connection().await?;
        peer_connection.set_remote_description(to_rtc(offer)?).await?;

        let answer = peer_connection.create_answer(None).await?;
        peer_connection.set_local_description(answer.clone()).await?;
        from_rtc(&answer)
    }

    async fn accept_answer(&self, answer: SessionDescription) -> Result<()> {
        let peer_connection = self.peer_connection().await?;
        peer_connection.set_remote_description(to_rtc(answer)?).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let peer_connection = self.peer_connection().await?;
        peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        if let Some(peer_connection) = self.peer_connection.get() {
            peer_connection.on_ice_candidate(Box::new(|_: Option<RTCIceCandidate>| Box::pin(async {})));
            peer_connection.on_track(Box::new(
                |_: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                    Box::pin(async {})
                },
            ));
            peer_connection
                .on_peer_connection_state_change(Box::new(|_: RTCPeerConnectionState| Box::pin(async {})));
        }
    }

    async fn close(&self) -> Result<()> {
        if let Some(peer_connection) = self.peer_connection.get() {
            peer_connection.close().await?;
        }
        Ok(())
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let description = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
    };
    Ok(description)
}

fn from_rtc(description: &RTCSessionDescription) -> Result<SessionDescription> {
    match description.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(description.sdp.clone())),
        RTCSdpType::Answer => Ok(SessionDescription::answer(description.sdp.clone())),
        other => Err(Error::Negotiation(format!(
            "Unexpected session description type: {}",
            other
        ))),
    }
}
