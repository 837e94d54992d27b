use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::NegotiationState;
use crate::role::PeerId;
use crate::signaling::IceCandidate;
use crate::transport::{PeerTransport, RemoteStream};

/// Candidates held per entry before the remote description is in place.
pub const MAX_EARLY_CANDIDATES: usize = 64;

/// One live connection to a remote participant.
pub struct PeerEntry {
    transport: Arc<dyn PeerTransport>,
    initiator: bool,
    generation: u64,
    state: NegotiationState,
    /// Remote media or a transport "connected" report was seen, possibly
    /// before the handshake finished.
    connection_reported: bool,
    remote_description_set: bool,
    applying_remote: bool,
    early_candidates: Vec<IceCandidate>,
}

impl PeerEntry {
    pub(crate) fn new(transport: Arc<dyn PeerTransport>, initiator: bool, generation: u64) -> Self {
        Self {
            transport,
            initiator,
            generation,
            state: NegotiationState::Created,
            connection_reported: false,
            remote_description_set: false,
            applying_remote: false,
            early_candidates: Vec::new(),
        }
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }

    pub fn buffered_candidates(&self) -> usize {
        self.early_candidates.len()
    }

    pub(crate) fn transport(&self) -> Arc<dyn PeerTransport> {
        Arc::clone(&self.transport)
    }

    pub(crate) fn advance(&mut self, next: NegotiationState) -> bool {
        self.state.advance(next)
    }

    /// Records that the connection is up and moves to `Connected` if the
    /// handshake has already finished. Returns whether it moved.
    pub(crate) fn report_connected(&mut self) -> bool {
        self.connection_reported = true;
        self.state.advance(NegotiationState::Connected)
    }

    /// Called once both descriptions are applied. Returns whether an earlier
    /// connected report took the entry straight to `Connected`.
    pub(crate) fn handshake_complete(&mut self) -> bool {
        self.state.advance(NegotiationState::ConnectedPending);
        self.connection_reported && self.state.advance(NegotiationState::Connected)
    }

    pub(crate) fn is_applying_remote(&self) -> bool {
        self.applying_remote
    }

    pub(crate) fn begin_remote_description(&mut self) {
        self.applying_remote = true;
    }

    /// Records that the remote description is in place and hands back the
    /// candidates that arrived before it, oldest first.
    pub(crate) fn complete_remote_description(&mut self) -> Vec<IceCandidate> {
        self.applying_remote = false;
        self.remote_description_set = true;
        std::mem::take(&mut self.early_candidates)
    }

    /// Holds `candidate` until the remote description is set. Returns false
    /// if the buffer is full and the candidate was dropped.
    pub(crate) fn buffer_candidate(&mut self, candidate: IceCandidate) -> bool {
        if self.early_candidates.len() >= MAX_EARLY_CANDIDATES {
            return false;
        }
        self.early_candidates.push(candidate);
        true
    }
}

/// Connection entries and remote streams of one room, keyed by participant.
#[derive(Default)]
pub(crate) struct RoomState {
    pub(crate) connections: HashMap<PeerId, PeerEntry>,
    pub(crate) remote_streams: HashMap<PeerId, RemoteStream>,
    pub(crate) host: Option<PeerId>,
}

impl RoomState {
    pub(crate) fn contains(&self, peer: &PeerId) -> bool {
        self.connections.contains_key(peer)
    }

    /// Entry for `peer` only if it is the incarnation `generation` refers to.
    pub(crate) fn live(&mut self, peer: &PeerId, generation: u64) -> Option<&mut PeerEntry> {
        self.connections
            .get_mut(peer)
            .filter(|entry| entry.generation == generation)
    }

    pub(crate) fn insert(&mut self, peer: PeerId, entry: PeerEntry) {
        self.connections.insert(peer, entry);
    }

    /// Removes both the entry and the remote stream for `peer`.
    pub(crate) fn remove_peer(
        &mut self,
        peer: &PeerId,
    ) -> (Option<PeerEntry>, Option<RemoteStream>) {
        (self.connections.remove(peer), self.remote_streams.remove(peer))
    }
}
