//! Full-mesh WebRTC rooms.
//!
//! Every participant of a room holds one direct peer connection to every
//! other participant. [`room::RoomSession`] decides who offers to whom,
//! drives each handshake over the signaling channel and tears connections
//! down as participants leave. [`relay::RelayServer`] is the matching
//! room-scoped signaling relay.

pub mod config;
pub mod connection;
pub mod error;
pub mod media;
pub mod relay;
pub mod role;
pub mod room;
pub mod signaling;
pub mod transport;
pub mod webrtc;

pub use error::{Error, Result};
pub use role::{is_initiator, PeerId};
pub use room::{Presenter, RoomSession};
pub use signaling::{SignalingClient, SignalingMessage};
