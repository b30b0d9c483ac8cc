//! Serverbound packets and the registry that recognises them.
//!
//! Packet ids are only unique within a connection state, so every descriptor pairs an id
//! with the states it is legal in. Descriptors must not overlap: for any state and frame,
//! at most one of them may accept.

use super::client::State;
use super::parsed::ParsedPacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
}
impl From<NextState> for State {
    fn from(next: NextState) -> Self {
        match next {
            NextState::Status => State::Status,
            NextState::Login => State::Login,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub username: String,
    pub uuid: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    Handshake(Handshake),
    StatusRequest,
    Ping(u64),
    LoginStart(LoginStart),
    LoginAck,
}
impl ClientPacket {
    pub fn name(&self) -> &'static str {
        match self {
            ClientPacket::Handshake(_) => "Handshake",
            ClientPacket::StatusRequest => "StatusRequest",
            ClientPacket::Ping(_) => "Ping",
            ClientPacket::LoginStart(_) => "LoginStart",
            ClientPacket::LoginAck => "LoginAck",
        }
    }
}

pub struct Descriptor {
    pub name: &'static str,
    pub id: i32,
    pub legal_in: fn(State) -> bool,
    decode: fn(ParsedPacket<'_>) -> Option<ClientPacket>,
}
impl Descriptor {
    /// The typed packet, if this descriptor owns `pkt` while the connection is in `state`.
    pub fn accept(&self, pkt: ParsedPacket<'_>, state: State) -> Option<ClientPacket> {
        if pkt.id() != self.id || !(self.legal_in)(state) {
            return None;
        }
        (self.decode)(pkt)
    }
}
impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor").field("name", &self.name).field("id", &self.id).finish()
    }
}

pub static REGISTRY: &[Descriptor] = &[
    Descriptor { name: "Handshake", id: 0x00, legal_in: |s| s == State::None, decode: handshake },
    Descriptor { name: "StatusRequest", id: 0x00, legal_in: |s| s == State::Status, decode: status_request },
    Descriptor { name: "Ping", id: 0x01, legal_in: |_| true, decode: ping },
    Descriptor { name: "LoginStart", id: 0x00, legal_in: |s| s == State::Login, decode: login_start },
    Descriptor { name: "LoginAck", id: 0x03, legal_in: |s| s == State::Login, decode: login_ack },
];

/// Finds the first descriptor that accepts `frame`.
pub fn classify(frame: &[u8], state: State) -> Option<ClientPacket> {
    let pkt = ParsedPacket::parse(frame)?;
    REGISTRY.iter().find_map(|d| d.accept(pkt, state))
}

fn handshake(mut pkt: ParsedPacket<'_>) -> Option<ClientPacket> {
    let protocol_version = pkt.get_var_int()?;
    let server_address = pkt.get_string()?;
    let server_port = pkt.get_ushort()?;
    let next_state = match pkt.get_var_int()? {
        1 => NextState::Status,
        2 => NextState::Login,
        _ => return None,
    };
    pkt.is_exhausted().then_some(ClientPacket::Handshake(Handshake {
        protocol_version,
        server_address,
        server_port,
        next_state,
    }))
}
fn status_request(pkt: ParsedPacket<'_>) -> Option<ClientPacket> {
    pkt.is_exhausted().then_some(ClientPacket::StatusRequest)
}
fn ping(mut pkt: ParsedPacket<'_>) -> Option<ClientPacket> {
    let payload = pkt.get_ulong()?;
    pkt.is_exhausted().then_some(ClientPacket::Ping(payload))
}
fn login_start(mut pkt: ParsedPacket<'_>) -> Option<ClientPacket> {
    let username = pkt.get_string().filter(|name| valid_username(name))?;
    let uuid = if pkt.get_boolean()? {
        Some(pkt.get_uuid()?)
    } else {
        None
    };
    pkt.is_exhausted().then_some(ClientPacket::LoginStart(LoginStart { username, uuid }))
}
fn login_ack(pkt: ParsedPacket<'_>) -> Option<ClientPacket> {
    pkt.is_exhausted().then_some(ClientPacket::LoginAck)
}

/// `^[.*]?[A-Za-z0-9_]{3,16}$`
pub fn valid_username(name: &str) -> bool {
    let name = name.strip_prefix(['.', '*']).unwrap_or(name);
    (3..=16).contains(&name.len()) && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::encode::{frame, ToWire};
    use crate::network::wire::var;

    fn packet(id: i32, fields: impl ToWire) -> Vec<u8> {
        let mut payload = vec![];
        (var(id), fields).encode(&mut payload);
        frame(&payload)
    }
    fn login_frame() -> Vec<u8> {
        packet(0x00, ("Notch", false))
    }

    #[test]
    fn handshake_only_in_none() {
        let hs = packet(0x00, (var(763), "localhost", 25565u16, var(2)));
        assert_eq!(classify(&hs, State::None), Some(ClientPacket::Handshake(Handshake {
            protocol_version: 763,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: NextState::Login,
        })));
        assert_eq!(classify(&hs, State::Login), None);
        let bad_next = packet(0x00, (var(763), "localhost", 25565u16, var(3)));
        assert_eq!(classify(&bad_next, State::None), None);
    }

    #[test]
    fn login_is_rejected_before_handshake() {
        assert_eq!(classify(&login_frame(), State::None), None);
        assert_eq!(classify(&login_frame(), State::Login), Some(ClientPacket::LoginStart(LoginStart {
            username: "Notch".into(),
            uuid: None,
        })));
    }

    #[test]
    fn has_uuid_gates_the_uuid_bytes() {
        let id = uuid::Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let with = packet(0x00, ("Notch", true, id));
        assert_eq!(classify(&with, State::Login), Some(ClientPacket::LoginStart(LoginStart {
            username: "Notch".into(),
            uuid: Some(id),
        })));
        let missing = packet(0x00, ("Notch", true));
        assert_eq!(classify(&missing, State::Login), None);
    }

    #[test]
    fn ping_in_every_state() {
        let ping = packet(0x01, 0x0102030405060708u64);
        for state in State::ALL {
            assert_eq!(classify(&ping, state), Some(ClientPacket::Ping(0x0102030405060708)));
        }
        assert_eq!(classify(&packet(0x01, 7u32), State::Status), None);
    }

    #[test]
    fn status_request_must_be_empty() {
        assert_eq!(classify(&packet(0x00, ()), State::Status), Some(ClientPacket::StatusRequest));
        assert_eq!(classify(&packet(0x00, 1u8), State::Status), None);
        assert_eq!(classify(&packet(0x00, ()), State::Play), None);
    }

    #[test]
    fn login_ack_moves_nothing_outside_login() {
        assert_eq!(classify(&packet(0x03, ()), State::Login), Some(ClientPacket::LoginAck));
        assert_eq!(classify(&packet(0x03, ()), State::Configuration), None);
    }

    #[test]
    fn descriptors_never_overlap() {
        for state in State::ALL {
            for (i, a) in REGISTRY.iter().enumerate() {
                for b in &REGISTRY[i + 1..] {
                    assert!(
                        !(a.id == b.id && (a.legal_in)(state) && (b.legal_in)(state)),
                        "{} and {} both claim id {:#04x} in {state:?}", a.name, b.name, a.id,
                    );
                }
            }
        }
    }

    #[test]
    fn dispatch_is_deterministic() {
        let frames = [
            packet(0x00, (var(763), "mc.example", 25565u16, var(1))),
            login_frame(),
            packet(0x01, 42u64),
            packet(0x03, ()),
            packet(0x00, ()),
            packet(0x7f, ()),
        ];
        for state in State::ALL {
            for f in &frames {
                let pkt = ParsedPacket::parse(f).unwrap();
                let accepted = REGISTRY.iter().filter(|d| d.accept(pkt, state).is_some()).count();
                assert!(accepted <= 1);
                assert_eq!(classify(f, state), classify(f, state));
            }
        }
    }

    #[test]
    fn usernames() {
        assert!(valid_username("Notch"));
        assert!(valid_username("abc"));
        assert!(valid_username(".bedrock_user"));
        assert!(valid_username("*x_1"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("seventeen_chars_x"));
        assert!(!valid_username("no spaces"));
        assert!(!valid_username(".."));
    }
}
