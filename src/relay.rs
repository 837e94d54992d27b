//! Room-scoped signaling relay.
//!
//! Assigns every WebSocket client an id, keeps room membership, broadcasts
//! membership snapshots and forwards peer-to-peer messages to their
//! addressee with the sender stamped in.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::role::PeerId;
use crate::signaling::SignalingMessage;

struct Client {
    tx: mpsc::UnboundedSender<SignalingMessage>,
    room: Option<String>,
}

#[derive(Default)]
struct RelayState {
    clients: HashMap<PeerId, Client>,
    /// Members in join order; the first one is the host.
    rooms: HashMap<String, Vec<PeerId>>,
}

impl RelayState {
    fn register(&mut self, tx: mpsc::UnboundedSender<SignalingMessage>) -> PeerId {
        let id = loop {
            let candidate = PeerId::new(format!("{:016x}", rand::random::<u64>()));
            if !self.clients.contains_key(&candidate) {
                break candidate;
            }
        };
        self.clients.insert(id.clone(), Client { tx, room: None });
        id
    }

    fn join(&mut self, id: &PeerId, room: String, max_users: usize) {
        let Some(client) = self.clients.get_mut(id) else {
            return;
        };
        if let Some(current) = &client.room {
            warn!(peer = %id, room = %current, "Client already joined a room");
            return;
        }

        let occupied = self.rooms.get(&room).map_or(0, Vec::len);
        if occupied >= max_users {
            let _ = client.tx.send(SignalingMessage::Full(room.clone()));
            info!(peer = %id, room = %room, "Rejected join: room is full");
            return;
        }

        let members = self.rooms.entry(room.clone()).or_default();
        members.push(id.clone());
        client.room = Some(room.clone());
        let host = members[0].clone();
        let snapshot = members.clone();
        info!(peer = %id, room = %room, users = snapshot.len(), "Client joined room");

        self.broadcast(&room, SignalingMessage::HostAssigned(host));
        self.broadcast(&room, SignalingMessage::RoomUsers(snapshot));
    }

    fn forward(&self, from: &PeerId, mut msg: SignalingMessage) {
        let Some(to) = msg.addressee().cloned() else {
            debug!(peer = %from, event = msg.event_name(), "Ignoring message from client");
            return;
        };
        msg.set_sender(from.clone());

        match self.clients.get(&to) {
            Some(client) => {
                debug!(from = %from, to = %to, event = msg.event_name(), "Relaying message");
                let _ = client.tx.send(msg);
            }
            None => debug!(from = %from, to = %to, "Dropping message for unknown client"),
        }
    }

    fn disconnect(&mut self, id: &PeerId) {
        let Some(client) = self.clients.remove(id) else {
            return;
        };
        let Some(room) = client.room else {
            return;
        };
        let Some(members) = self.rooms.get_mut(&room) else {
            return;
        };

        members.retain(|member| member != id);
        if members.is_empty() {
            self.rooms.remove(&room);
            info!(room = %room, "Room removed (empty)");
        } else {
            let host = members[0].clone();
            let snapshot = members.clone();
            self.broadcast(&room, SignalingMessage::HostAssigned(host));
            self.broadcast(&room, SignalingMessage::UserDisconnected(id.clone()));
            self.broadcast(&room, SignalingMessage::RoomUsers(snapshot));
        }
        info!(peer = %id, room = %room, "Client left room");
    }

    fn broadcast(&self, room: &str, msg: SignalingMessage) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for member in members {
            if let Some(client) = self.clients.get(member) {
                let _ = client.tx.send(msg.clone());
            }
        }
    }
}

pub struct RelayServer {
    state: Arc<RwLock<RelayState>>,
    max_users: usize,
}

impl RelayServer {
    pub fn new(max_users: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(RelayState::default())),
            max_users,
        }
    }

    pub async fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling relay listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Accepts clients on an already bound listener until the task is
    /// cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New signaling connection from {}", peer_addr);
                    let state = Arc::clone(&self.state);
                    let max_users = self.max_users;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state, max_users).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<RwLock<RelayState>>,
    max_users: usize,
) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = state.write().await.register(tx.clone());
    let _ = tx.send(SignalingMessage::Welcome(id.clone()));
    drop(tx);
    debug!(peer = %id, "Client registered");

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SignalingMessage>(&text) {
                            Ok(SignalingMessage::JoinRoom(room)) => {
                                state.write().await.join(&id, room, max_users);
                            }
                            Ok(msg) => state.read().await.forward(&id, msg),
                            Err(e) => warn!(peer = %id, error = %e, "Invalid message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(peer = %id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            outgoing = rx.recv() => {
                let Some(msg) = outgoing else { break };
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(peer = %id, error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if write.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    }

    state.write().await.disconnect(&id);
    Ok(())
}
