use std::net::SocketAddr;

use super::client::State;
use super::request::ClientPacket;
use crate::collections::Key;

/// Something that happened on the server, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Listening(SocketAddr),
    Connected { key: Key, peer: SocketAddr },
    Packet { key: Key, packet: ClientPacket },
    /// No known packet matched the frame in the connection's current state.
    UnknownPacket { key: Key, state: State, frame: Vec<u8> },
    StateChanged { key: Key, from: State, to: State },
    Disconnected { key: Key, peer: SocketAddr },
    Closed,
}
