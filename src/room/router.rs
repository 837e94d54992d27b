use tracing::{debug, info, warn};

use super::session::{RoomSession, Step};
use super::state::MAX_EARLY_CANDIDATES;
use crate::connection::NegotiationState;
use crate::role::PeerId;
use crate::signaling::{CandidateSignal, SdpKind, SdpSignal, SignalingMessage};

impl RoomSession {
    /// Dispatches one inbound signaling message.
    pub fn on_signal(&mut self, msg: SignalingMessage) {
        match msg {
            SignalingMessage::RoomUsers(users) => self.on_room_users(&users),
            SignalingMessage::UserDisconnected(peer) => self.on_user_disconnected(&peer),
            SignalingMessage::HostAssigned(host) => self.on_host_assigned(host),
            SignalingMessage::Offer(signal) => self.route_offer(signal),
            SignalingMessage::Answer(signal) => self.route_answer(signal),
            SignalingMessage::Candidate(signal) => self.route_candidate(signal),
            SignalingMessage::Full(room) => warn!(room = %room, "Room is full"),
            other => debug!(event = other.event_name(), "Ignoring signaling message"),
        }
    }

    /// Sender of a message addressed to us. Messages for other participants
    /// are dropped without a trace.
    fn accept_sender(&self, to: &PeerId, from: Option<PeerId>, event: &str) -> Option<PeerId> {
        if to != &self.local_id {
            return None;
        }
        match from {
            Some(from) if from == self.local_id => {
                warn!(event, "Ignoring message that claims to come from ourselves");
                None
            }
            Some(from) => Some(from),
            None => {
                warn!(event, "Ignoring message without a sender");
                None
            }
        }
    }

    fn route_offer(&mut self, signal: SdpSignal) {
        let Some(from) = self.accept_sender(&signal.to, signal.from, "offer") else {
            return;
        };
        if signal.sdp.kind != SdpKind::Offer {
            warn!(peer = %from, "Offer event carried an answer description");
            return;
        }

        if !self.state.contains(&from) {
            self.create_peer(from.clone(), false);
        }
        let Some(entry) = self.state.connections.get_mut(&from) else {
            return;
        };
        if !entry.state().accepts_offer() {
            warn!(peer = %from, state = %entry.state(), "Ignoring offer for a connection already negotiating");
            return;
        }

        entry.advance(NegotiationState::Answering);
        entry.begin_remote_description();
        let transport = entry.transport();
        let generation = entry.generation();
        let offer = signal.sdp;
        self.schedule(from.clone(), generation, async move {
            transport.accept_offer(offer).await.map(Step::AnswerCreated)
        });
        info!(peer = %from, "Answering offer");
    }

    fn route_answer(&mut self, signal: SdpSignal) {
        let Some(from) = self.accept_sender(&signal.to, signal.from, "answer") else {
            return;
        };
        if signal.sdp.kind != SdpKind::Answer {
            warn!(peer = %from, "Answer event carried an offer description");
            return;
        }

        let Some(entry) = self.state.connections.get_mut(&from) else {
            info!(peer = %from, "Discarding answer without a matching connection");
            return;
        };
        if !entry.state().accepts_answer() || entry.is_applying_remote() {
            warn!(peer = %from, state = %entry.state(), "Discarding unexpected answer");
            return;
        }

        entry.begin_remote_description();
        let transport = entry.transport();
        let generation = entry.generation();
        let answer = signal.sdp;
        self.schedule(from, generation, async move {
            transport.accept_answer(answer).await.map(|_| Step::AnswerApplied)
        });
    }

    fn route_candidate(&mut self, signal: CandidateSignal) {
        let candidate = signal.ice_candidate();
        let Some(from) = self.accept_sender(&signal.to, signal.from, "candidate") else {
            return;
        };

        let Some(entry) = self.state.connections.get_mut(&from) else {
            info!(peer = %from, "Discarding candidate without a matching connection");
            return;
        };
        if !entry.has_remote_description() {
            if entry.buffer_candidate(candidate) {
                debug!(peer = %from, buffered = entry.buffered_candidates(), "Buffering early ICE candidate");
            } else {
                warn!(peer = %from, limit = MAX_EARLY_CANDIDATES, "Early candidate buffer full, dropping candidate");
            }
            return;
        }

        let transport = entry.transport();
        let generation = entry.generation();
        self.apply_candidates(from, generation, transport, vec![candidate]);
    }
}
