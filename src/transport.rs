//! Seam between the orchestrator and the peer-to-peer connection stack.
//!
//! The orchestrator only ever talks to a [`PeerTransport`]; the webrtc-rs
//! backed implementation lives in [`crate::webrtc`]. Transports report
//! asynchronous happenings (local candidates, remote media, connectivity)
//! through the [`PeerLink`] they were created with.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use crate::error::Result;
use crate::role::PeerId;
use crate::signaling::{IceCandidate, SessionDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Unknown,
}

impl From<RTPCodecType> for MediaKind {
    fn from(kind: RTPCodecType) -> Self {
        match kind {
            RTPCodecType::Audio => MediaKind::Audio,
            RTPCodecType::Video => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }
}

/// One inbound media track announced by the transport.
#[derive(Clone)]
pub struct RemoteTrack {
    pub stream_id: String,
    pub track_id: String,
    pub kind: MediaKind,
    /// Underlying webrtc-rs track; absent for transports without real media.
    pub handle: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("stream_id", &self.stream_id)
            .field("track_id", &self.track_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Media received from one remote participant.
#[derive(Debug, Clone)]
pub struct RemoteStream {
    pub stream_id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn new(first: RemoteTrack) -> Self {
        Self {
            stream_id: first.stream_id.clone(),
            tracks: vec![first],
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    Connected,
    Failed(String),
}

/// A [`TransportEvent`] tagged with the connection entry that produced it.
#[derive(Debug)]
pub struct TaggedEvent {
    pub peer: PeerId,
    pub generation: u64,
    pub event: TransportEvent,
}

/// Back-channel from a transport into the session that owns it.
#[derive(Debug, Clone)]
pub struct PeerLink {
    peer: PeerId,
    generation: u64,
    events: mpsc::UnboundedSender<TaggedEvent>,
}

impl PeerLink {
    pub fn new(peer: PeerId, generation: u64, events: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self {
            peer,
            generation,
            events,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the session has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events
            .send(TaggedEvent {
                peer: self.peer.clone(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// One pairwise connection as driven by the orchestrator.
///
/// Descriptions are applied inside the transport: `create_offer` also sets
/// the offer as local description, `accept_offer` sets the remote offer and
/// the local answer before returning the answer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Builds the underlying connection and attaches local media. Safe to
    /// call more than once; later calls wait for the first.
    async fn open(&self) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription>;

    async fn accept_answer(&self, answer: SessionDescription) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Silences every event handler. Must not block.
    fn detach(&self);

    async fn close(&self) -> Result<()>;
}

pub trait PeerConnector: Send {
    fn connect(&self, link: PeerLink) -> Arc<dyn PeerTransport>;
}
