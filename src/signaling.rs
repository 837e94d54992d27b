use crate::error::{Error, Result};
use crate::role::PeerId;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 100;

/// Discriminator stamped into every peer-to-peer signaling payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Browser-style `{type, sdp}` session description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Payload of `offer` and `answer` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpSignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub sdp: SessionDescription,
    pub room: String,
    pub to: PeerId,
    /// Filled in by the relay; never trusted from the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PeerId>,
}

/// Payload of `candidate` events. `label` is the m-line index, `id` the mid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(default)]
    pub label: Option<u16>,
    #[serde(default)]
    pub id: Option<String>,
    pub candidate: String,
    pub room: String,
    pub to: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PeerId>,
}

impl CandidateSignal {
    pub fn new(candidate: IceCandidate, room: String, to: PeerId) -> Self {
        Self {
            kind: SignalKind::Candidate,
            label: candidate.sdp_mline_index,
            id: candidate.sdp_mid,
            candidate: candidate.candidate,
            room,
            to,
            from: None,
        }
    }

    pub fn ice_candidate(&self) -> IceCandidate {
        IceCandidate {
            candidate: self.candidate.clone(),
            sdp_mid: self.id.clone(),
            sdp_mline_index: self.label,
        }
    }
}

/// Every event carried by the signaling channel, framed as
/// `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum SignalingMessage {
    // Client -> relay
    JoinRoom(String),

    // Relay -> client
    Welcome(PeerId),
    RoomUsers(Vec<PeerId>),
    UserDisconnected(PeerId),
    HostAssigned(PeerId),
    Full(String),

    // Both directions, relayed 1:1
    Offer(SdpSignal),
    Answer(SdpSignal),
    Candidate(CandidateSignal),
}

impl SignalingMessage {
    /// Destination of a peer-to-peer message, `None` for room-wide events.
    pub fn addressee(&self) -> Option<&PeerId> {
        match self {
            SignalingMessage::Offer(signal) | SignalingMessage::Answer(signal) => Some(&signal.to),
            SignalingMessage::Candidate(signal) => Some(&signal.to),
            _ => None,
        }
    }

    /// Stamps the sender of a peer-to-peer message.
    pub fn set_sender(&mut self, sender: PeerId) {
        match self {
            SignalingMessage::Offer(signal) | SignalingMessage::Answer(signal) => {
                signal.from = Some(sender)
            }
            SignalingMessage::Candidate(signal) => signal.from = Some(sender),
            _ => {}
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            SignalingMessage::JoinRoom(_) => "joinRoom",
            SignalingMessage::Welcome(_) => "welcome",
            SignalingMessage::RoomUsers(_) => "roomUsers",
            SignalingMessage::UserDisconnected(_) => "userDisconnected",
            SignalingMessage::HostAssigned(_) => "hostAssigned",
            SignalingMessage::Full(_) => "full",
            SignalingMessage::Offer(_) => "offer",
            SignalingMessage::Answer(_) => "answer",
            SignalingMessage::Candidate(_) => "candidate",
        }
    }
}

/// Outbound half of the signaling channel as seen by the orchestrator.
///
/// Sending must not block the event loop; an `Err` means the message was
/// dropped.
pub trait SignalSink: Send {
    fn send(&self, msg: SignalingMessage) -> Result<()>;
}

/// Cloneable handle onto a [`SignalingClient`]'s writer task.
#[derive(Clone)]
pub struct OutboundSignals {
    tx: mpsc::Sender<SignalingMessage>,
}

impl SignalSink for OutboundSignals {
    fn send(&self, msg: SignalingMessage) -> Result<()> {
        self.tx
            .try_send(msg)
            .map_err(|e| Error::Signaling(format!("Failed to queue message: {}", e)))
    }
}

pub struct SignalingClient {
    tx: mpsc::Sender<SignalingMessage>,
    rx: mpsc::Receiver<SignalingMessage>,
}

impl SignalingClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (incoming_tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx, mut outgoing_rx) = mpsc::channel::<SignalingMessage>(CHANNEL_CAPACITY);

        // Handle outgoing messages
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, event = msg.event_name(), "Failed to encode signaling message");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    warn!(error = %e, "Signaling write failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Handle incoming messages
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<SignalingMessage>(&text) {
                            Ok(msg) => {
                                if incoming_tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "Ignoring malformed signaling frame"),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Signaling read failed");
                        break;
                    }
                }
            }
            debug!("Signaling reader finished");
        });

        Ok(Self { tx, rx })
    }

    pub fn outbound(&self) -> OutboundSignals {
        OutboundSignals {
            tx: self.tx.clone(),
        }
    }

    pub async fn send(&self, msg: SignalingMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|e| Error::Signaling(format!("Failed to send message: {}", e)))
    }

    /// Next inbound message, `None` once the connection is gone.
    pub async fn receive(&mut self) -> Option<SignalingMessage> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offer_uses_browser_field_names() {
        let msg = SignalingMessage::Offer(SdpSignal {
            kind: SignalKind::Offer,
            sdp: SessionDescription::offer("v=0"),
            room: "room1".to_string(),
            to: PeerId::from("u1"),
            from: None,
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "offer",
                "data": {
                    "type": "offer",
                    "sdp": {"type": "offer", "sdp": "v=0"},
                    "room": "room1",
                    "to": "u1"
                }
            })
        );
    }

    #[test]
    fn candidate_parses_label_and_id() {
        let raw = json!({
            "event": "candidate",
            "data": {
                "type": "candidate",
                "label": 1,
                "id": "video",
                "candidate": "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host",
                "room": "room1",
                "to": "u1",
                "from": "u2"
            }
        });

        let msg: SignalingMessage = serde_json::from_value(raw).unwrap();
        match msg {
            SignalingMessage::Candidate(signal) => {
                assert_eq!(signal.from, Some(PeerId::from("u2")));
                let candidate = signal.ice_candidate();
                assert_eq!(candidate.sdp_mline_index, Some(1));
                assert_eq!(candidate.sdp_mid.as_deref(), Some("video"));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn room_events_use_camel_case_names() {
        let msg: SignalingMessage =
            serde_json::from_value(json!({"event": "roomUsers", "data": ["a", "b"]})).unwrap();
        assert_eq!(
            msg,
            SignalingMessage::RoomUsers(vec![PeerId::from("a"), PeerId::from("b")])
        );

        let msg: SignalingMessage =
            serde_json::from_value(json!({"event": "userDisconnected", "data": "a"})).unwrap();
        assert_eq!(msg, SignalingMessage::UserDisconnected(PeerId::from("a")));
        assert_eq!(msg.event_name(), "userDisconnected");
    }

    #[test]
    fn set_sender_only_touches_peer_messages() {
        let mut join = SignalingMessage::JoinRoom("room1".to_string());
        join.set_sender(PeerId::from("x"));
        assert_eq!(join, SignalingMessage::JoinRoom("room1".to_string()));

        let mut candidate = SignalingMessage::Candidate(CandidateSignal::new(
            IceCandidate {
                candidate: "c".to_string(),
                sdp_mid: None,
                sdp_mline_index: Some(0),
            },
            "room1".to_string(),
            PeerId::from("u1"),
        ));
        candidate.set_sender(PeerId::from("u2"));
        match candidate {
            SignalingMessage::Candidate(signal) => {
                assert_eq!(signal.from, Some(PeerId::from("u2")))
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }
}
