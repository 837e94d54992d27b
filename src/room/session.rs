use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::membership::MembershipDiff;
use super::state::{PeerEntry, RoomState};
use super::Presenter;
use crate::connection::NegotiationState;
use crate::error::Result;
use crate::role::{is_initiator, PeerId};
use crate::signaling::{
    CandidateSignal, IceCandidate, SdpSignal, SessionDescription, SignalKind, SignalSink,
    SignalingMessage,
};
use crate::transport::{
    PeerConnector, PeerLink, PeerTransport, RemoteStream, RemoteTrack, TaggedEvent,
    TransportEvent,
};

/// Result of an asynchronous negotiation step, fed back into the session.
#[derive(Debug)]
pub(crate) enum Step {
    Opened,
    OfferCreated(SessionDescription),
    AnswerCreated(SessionDescription),
    AnswerApplied,
    CandidatesApplied { applied: usize, rejected: Vec<String> },
    Closed,
}

#[derive(Debug)]
pub struct Outcome {
    peer: PeerId,
    generation: u64,
    step: Result<Step>,
}

/// Work that completed outside the session and must be applied to it.
#[derive(Debug)]
pub enum SessionInput {
    Outcome(Outcome),
    Transport(TaggedEvent),
}

/// Orchestrates the mesh of connections for one room on behalf of the local
/// participant.
pub struct RoomSession {
    pub(super) room: String,
    pub(super) local_id: PeerId,
    pub(super) state: RoomState,
    connector: Box<dyn PeerConnector>,
    signals: Box<dyn SignalSink>,
    presenter: Box<dyn Presenter>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    pending: FuturesUnordered<BoxFuture<'static, Outcome>>,
    next_generation: u64,
}

impl RoomSession {
    pub fn new(
        room: impl Into<String>,
        local_id: PeerId,
        connector: impl PeerConnector + 'static,
        signals: impl SignalSink + 'static,
        presenter: impl Presenter + 'static,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            room: room.into(),
            local_id,
            state: RoomState::default(),
            connector: Box::new(connector),
            signals: Box::new(signals),
            presenter: Box::new(presenter),
            events_tx,
            events_rx,
            pending: FuturesUnordered::new(),
            next_generation: 0,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn host(&self) -> Option<&PeerId> {
        self.state.host.as_ref()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.state.connections.keys()
    }

    pub fn connection(&self, peer: &PeerId) -> Option<&PeerEntry> {
        self.state.connections.get(peer)
    }

    pub fn connection_state(&self, peer: &PeerId) -> Option<NegotiationState> {
        self.connection(peer).map(PeerEntry::state)
    }

    pub fn remote_stream(&self, peer: &PeerId) -> Option<&RemoteStream> {
        self.state.remote_streams.get(peer)
    }

    /// Applies a full membership snapshot.
    pub fn on_room_users(&mut self, users: &[PeerId]) {
        let diff = MembershipDiff::compute(self.state.connections.keys(), users, &self.local_id);
        if diff.is_empty() {
            debug!(room = %self.room, members = users.len(), "Membership unchanged");
            return;
        }
        debug!(room = %self.room, added = diff.added.len(), removed = diff.removed.len(), "Membership changed");

        for peer in &diff.removed {
            self.close_peer(peer, "left the room");
        }
        for peer in diff.added {
            let initiator = is_initiator(&self.local_id, &peer);
            self.create_peer(peer, initiator);
        }
    }

    pub fn on_user_disconnected(&mut self, peer: &PeerId) {
        self.close_peer(peer, "disconnected");
    }

    pub fn on_host_assigned(&mut self, host: PeerId) {
        info!(room = %self.room, host = %host, "Host assigned");
        self.state.host = Some(host);
    }

    /// Sends a locally discovered ICE candidate to `peer`.
    pub fn on_local_candidate(&mut self, peer: &PeerId, candidate: IceCandidate) {
        if !self.state.contains(peer) {
            debug!(peer = %peer, "Dropping local candidate for a closed connection");
            return;
        }
        let signal = CandidateSignal::new(candidate, self.room.clone(), peer.clone());
        self.emit(SignalingMessage::Candidate(signal));
    }

    /// Registers inbound media from `peer`. Only the first track of a peer
    /// reaches the presenter.
    pub fn on_remote_track(&mut self, peer: &PeerId, track: RemoteTrack) {
        if !self.state.contains(peer) {
            debug!(peer = %peer, "Dropping remote track for a closed connection");
            return;
        }
        match self.state.remote_streams.entry(peer.clone()) {
            Entry::Occupied(mut existing) => {
                debug!(peer = %peer, track = %track.track_id, "Additional remote track");
                existing.get_mut().tracks.push(track);
            }
            Entry::Vacant(slot) => {
                info!(peer = %peer, stream = %track.stream_id, "Remote stream received");
                let stream = slot.insert(RemoteStream::new(track));
                self.presenter.on_remote_stream(peer, stream);
                self.mark_connected(peer);
            }
        }
    }

    /// Creates a connection entry unless `peer` already has one.
    pub(super) fn create_peer(&mut self, peer: PeerId, initiator: bool) -> bool {
        if self.state.contains(&peer) {
            debug!(peer = %peer, "Connection already exists");
            return false;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let link = PeerLink::new(peer.clone(), generation, self.events_tx.clone());
        let transport = self.connector.connect(link);
        let mut entry = PeerEntry::new(Arc::clone(&transport), initiator, generation);

        if initiator {
            entry.advance(NegotiationState::Offering);
            self.schedule(peer.clone(), generation, async move {
                transport.open().await?;
                transport.create_offer().await.map(Step::OfferCreated)
            });
        } else {
            self.schedule(peer.clone(), generation, async move {
                transport.open().await.map(|_| Step::Opened)
            });
        }

        info!(peer = %peer, initiator, "Connection created");
        self.state.insert(peer, entry);
        true
    }

    /// Closes and evicts the entry for `peer`. Closing a peer without an
    /// entry is a no-op.
    pub fn close_peer(&mut self, peer: &PeerId, reason: &str) -> bool {
        let (entry, stream) = self.state.remove_peer(peer);
        if stream.is_some() {
            self.presenter.on_peer_removed(peer);
        }
        let Some(mut entry) = entry else {
            debug!(peer = %peer, reason, "No connection to close");
            return false;
        };

        entry.advance(NegotiationState::Closed);
        let transport = entry.transport();
        transport.detach();
        self.schedule(peer.clone(), entry.generation(), async move {
            transport.close().await.map(|_| Step::Closed)
        });

        info!(peer = %peer, reason, "Connection closed");
        true
    }

    pub fn close_all(&mut self) {
        let peers: Vec<PeerId> = self.state.connections.keys().cloned().collect();
        for peer in peers {
            self.close_peer(&peer, "leaving the room");
        }
    }

    /// Waits for the next completed negotiation step or transport event.
    pub async fn next_input(&mut self) -> Option<SessionInput> {
        tokio::select! {
            Some(outcome) = self.pending.next(), if !self.pending.is_empty() => {
                Some(SessionInput::Outcome(outcome))
            }
            Some(event) = self.events_rx.recv() => Some(SessionInput::Transport(event)),
            else => None,
        }
    }

    pub fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Outcome(outcome) => self.handle_outcome(outcome),
            SessionInput::Transport(event) => self.handle_transport_event(event),
        }
    }

    /// Drives every scheduled step and queued event to completion.
    pub async fn settle(&mut self) {
        loop {
            let mut progressed = false;
            while let Ok(event) = self.events_rx.try_recv() {
                self.handle_transport_event(event);
                progressed = true;
            }
            if let Some(outcome) = self.pending.next().await {
                self.handle_outcome(outcome);
                continue;
            }
            if !progressed {
                break;
            }
        }
    }

    fn handle_outcome(&mut self, outcome: Outcome) {
        let Outcome {
            peer,
            generation,
            step,
        } = outcome;

        if self.state.live(&peer, generation).is_none() {
            match step {
                Ok(Step::Closed) => debug!(peer = %peer, "Transport released"),
                Ok(step) => debug!(peer = %peer, ?step, "Discarding result for a closed connection"),
                Err(e) => debug!(peer = %peer, error = %e, "Closed connection reported an error"),
            }
            return;
        }

        match step {
            Ok(Step::Opened) => debug!(peer = %peer, "Peer connection ready"),
            Ok(Step::OfferCreated(offer)) => self.offer_created(&peer, offer),
            Ok(Step::AnswerCreated(answer)) => self.answer_created(&peer, generation, answer),
            Ok(Step::AnswerApplied) => self.answer_applied(&peer, generation),
            Ok(Step::CandidatesApplied { applied, rejected }) => {
                for reason in &rejected {
                    warn!(peer = %peer, error = %reason, "Remote ICE candidate rejected");
                }
                debug!(peer = %peer, applied, "Remote ICE candidates applied");
            }
            Ok(Step::Closed) => {}
            Err(e) => {
                error!(peer = %peer, error = %e, "Negotiation failed");
                self.close_peer(&peer, "negotiation failed");
            }
        }
    }

    fn handle_transport_event(&mut self, tagged: TaggedEvent) {
        let TaggedEvent {
            peer,
            generation,
            event,
        } = tagged;

        if self.state.live(&peer, generation).is_none() {
            debug!(peer = %peer, "Dropping transport event for a closed connection");
            return;
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => self.on_local_candidate(&peer, candidate),
            TransportEvent::RemoteTrack(track) => self.on_remote_track(&peer, track),
            TransportEvent::Connected => self.mark_connected(&peer),
            TransportEvent::Failed(reason) => {
                warn!(peer = %peer, reason = %reason, "Peer connection failed")
            }
        }
    }

    fn offer_created(&mut self, peer: &PeerId, offer: SessionDescription) {
        let signal = SdpSignal {
            kind: SignalKind::Offer,
            sdp: offer,
            room: self.room.clone(),
            to: peer.clone(),
            from: None,
        };
        self.emit(SignalingMessage::Offer(signal));
        if let Some(entry) = self.state.connections.get_mut(peer) {
            entry.advance(NegotiationState::AwaitingAnswer);
        }
        debug!(peer = %peer, "Offer sent");
    }

    fn answer_created(&mut self, peer: &PeerId, generation: u64, answer: SessionDescription) {
        self.remote_description_ready(peer, generation);
        let signal = SdpSignal {
            kind: SignalKind::Answer,
            sdp: answer,
            room: self.room.clone(),
            to: peer.clone(),
            from: None,
        };
        self.emit(SignalingMessage::Answer(signal));
        self.handshake_complete(peer);
        debug!(peer = %peer, "Answer sent");
    }

    fn answer_applied(&mut self, peer: &PeerId, generation: u64) {
        self.remote_description_ready(peer, generation);
        self.handshake_complete(peer);
        debug!(peer = %peer, "Answer applied");
    }

    /// Flushes candidates that arrived before the remote description.
    fn remote_description_ready(&mut self, peer: &PeerId, generation: u64) {
        let Some(entry) = self.state.live(peer, generation) else {
            return;
        };
        let early = entry.complete_remote_description();
        if !early.is_empty() {
            debug!(peer = %peer, count = early.len(), "Flushing buffered ICE candidates");
            let transport = entry.transport();
            self.apply_candidates(peer.clone(), generation, transport, early);
        }
    }

    /// Connected reports that arrive mid-handshake are kept on the entry and
    /// applied by `handshake_complete`.
    fn mark_connected(&mut self, peer: &PeerId) {
        if let Some(entry) = self.state.connections.get_mut(peer) {
            if entry.report_connected() {
                info!(peer = %peer, "Peer connected");
            }
        }
    }

    fn handshake_complete(&mut self, peer: &PeerId) {
        if let Some(entry) = self.state.connections.get_mut(peer) {
            if entry.handshake_complete() {
                info!(peer = %peer, "Peer connected");
            }
        }
    }

    /// Applies `candidates` in order. Rejections are reported, not fatal.
    pub(super) fn apply_candidates(
        &mut self,
        peer: PeerId,
        generation: u64,
        transport: Arc<dyn PeerTransport>,
        candidates: Vec<IceCandidate>,
    ) {
        self.schedule(peer, generation, async move {
            let mut applied = 0;
            let mut rejected = Vec::new();
            for candidate in candidates {
                match transport.add_remote_candidate(candidate).await {
                    Ok(()) => applied += 1,
                    Err(e) => rejected.push(e.to_string()),
                }
            }
            Ok(Step::CandidatesApplied { applied, rejected })
        });
    }

    pub(super) fn schedule<F>(&mut self, peer: PeerId, generation: u64, step: F)
    where
        F: Future<Output = Result<Step>> + Send + 'static,
    {
        self.pending.push(Box::pin(async move {
            Outcome {
                peer,
                generation,
                step: step.await,
            }
        }));
    }

    /// Best-effort send; failures are logged and swallowed.
    pub(super) fn emit(&self, msg: SignalingMessage) {
        let event = msg.event_name();
        if let Err(e) = self.signals.send(msg) {
            warn!(event, error = %e, "Dropping outbound signaling message");
        }
    }
}
