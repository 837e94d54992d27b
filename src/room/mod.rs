//! Per-room orchestration of a full mesh of peer connections.
//!
//! A [`RoomSession`] owns every connection entry for one room. It is driven
//! from a single event loop: membership snapshots and signaling messages go
//! in through [`RoomSession::on_signal`], and the results of asynchronous
//! negotiation steps come back through [`RoomSession::next_input`].

mod membership;
mod router;
mod session;
mod state;

pub use membership::MembershipDiff;
pub use session::{Outcome, RoomSession, SessionInput};
pub use state::{PeerEntry, MAX_EARLY_CANDIDATES};

use crate::role::PeerId;
use crate::transport::RemoteStream;

/// Outward calls into whatever renders participants.
pub trait Presenter: Send {
    /// Called once per peer, on its first inbound media.
    fn on_remote_stream(&self, peer: &PeerId, stream: &RemoteStream);

    /// Called when a peer whose stream was presented goes away.
    fn on_peer_removed(&self, peer: &PeerId);
}
