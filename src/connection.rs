use serde::{Deserialize, Serialize};
use std::fmt;

/// Handshake progress of one pairwise connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationState {
    /// Local tracks attached, nothing exchanged yet.
    Created,
    /// Initiator is synthesising its offer.
    Offering,
    /// Offer sent, waiting for the remote answer.
    AwaitingAnswer,
    /// Remote offer received, answer being synthesised.
    Answering,
    /// Both descriptions applied, ICE not yet confirmed.
    ConnectedPending,
    Connected,
    Closed,
}

impl NegotiationState {
    pub fn can_transition(self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Created, Offering) | (Created, Answering) => true,
            (Offering, AwaitingAnswer) => true,
            (AwaitingAnswer, ConnectedPending) | (Answering, ConnectedPending) => true,
            (ConnectedPending, Connected) => true,
            _ => false,
        }
    }

    /// Moves to `next` if the state machine allows it. Returns whether the
    /// transition happened.
    pub fn advance(&mut self, next: NegotiationState) -> bool {
        if !self.can_transition(next) {
            return false;
        }
        *self = next;
        true
    }

    pub fn accepts_offer(self) -> bool {
        self == NegotiationState::Created
    }

    pub fn accepts_answer(self) -> bool {
        self == NegotiationState::AwaitingAnswer
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationState::Created => write!(f, "Created"),
            NegotiationState::Offering => write!(f, "Offering"),
            NegotiationState::AwaitingAnswer => write!(f, "AwaitingAnswer"),
            NegotiationState::Answering => write!(f, "Answering"),
            NegotiationState::ConnectedPending => write!(f, "ConnectedPending"),
            NegotiationState::Connected => write!(f, "Connected"),
            NegotiationState::Closed => write!(f, "Closed"),
        }
    }
}
