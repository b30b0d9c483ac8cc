use super::chat::Chat;
use super::client::State;
use super::encode::{self, Raw, ToWire};
use super::wire::var;
use crate::config::Config;

macro_rules! response {
    (@state Any) => { None };
    (@state $state:ident) => { Some(State::$state) };
    {$($name:ident($($field:ident : $t:ty),*): $state:ident $id:literal => $e:expr;)*} => {
        /// Clientbound packets. Ids are scoped to the state each packet is sent in.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Response {
            $($name($($t),*),)*
        }
        impl Response {
            pub fn id(&self) -> i32 {
                match self {
                    $(Response::$name(..) => $id,)*
                }
            }
            /// The state a connection must be in for this packet to make sense.
            pub fn state(&self) -> Option<State> {
                match self {
                    $(Response::$name(..) => response!(@state $state),)*
                }
            }
            /// `id ++ fields`, without the frame length.
            pub fn payload(&self) -> Vec<u8> {
                let mut pkt = vec![];
                match self {
                    $(Response::$name($($field),*) => ToWire::encode(&(var($id as i32), $e), &mut pkt),)*
                }
                pkt
            }
        }
    };
}
response! {
    StatusResponse(json: String): Status 0x00 => json;
    Pong(payload: u64): Any 0x01 => payload;
    DisconnectLogin(reason: Chat): Login 0x00 => reason;
    LoginSuccess(uuid: uuid::Uuid, name: String): Login 0x02 => (
        uuid,
        name,
        var(0i32), // no properties
    );
    FinishConfiguration(): Configuration 0x02 => ();
    ConfigurationKeepAlive(id: i64): Configuration 0x03 => id;
    RegistryData(nbt: Vec<u8>): Configuration 0x05 => Raw(nbt);
    DisconnectPlay(reason: Chat): Play 0x1A => reason;
    KeepAlive(id: i64): Play 0x23 => id;
}

impl Response {
    pub fn to_frame(&self) -> Vec<u8> {
        encode::frame(&self.payload())
    }
    /// The state a connection moves to once this packet has been sent.
    pub fn enters(&self) -> Option<State> {
        match self {
            Response::LoginSuccess(..) | Response::FinishConfiguration() => Some(State::Play),
            _ => None,
        }
    }
    pub fn status(config: &Config, online: usize) -> Self {
        let info = &config.server;
        Response::StatusResponse(serde_json::json!({
            "version": { "name": info.version_name, "protocol": info.protocol },
            "players": { "max": info.max_players, "online": online, "sample": [] },
            "description": { "text": info.motd },
            "enforcesSecureChat": info.enforces_secure_chat,
        }).to_string())
    }
    /// The keep-alive appropriate for `state`, if it has one.
    pub fn keep_alive(state: State, id: i64) -> Option<Self> {
        match state {
            State::Configuration => Some(Response::ConfigurationKeepAlive(id)),
            State::Play => Some(Response::KeepAlive(id)),
            _ => None,
        }
    }
    /// The disconnect appropriate for `state`, if it has one.
    pub fn disconnect(state: State, reason: Chat) -> Option<Self> {
        match state {
            State::Login => Some(Response::DisconnectLogin(reason)),
            State::Play => Some(Response::DisconnectPlay(reason)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_echoes_the_payload() {
        assert_eq!(Response::Pong(0x0102030405060708).to_frame(), [9, 0x01, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn login_success_layout() {
        let id = uuid::Uuid::from_u128(1);
        let frame = Response::LoginSuccess(id, "Notch".into()).to_frame();
        let mut expected = vec![1 + 16 + 6 + 1, 0x02];
        expected.extend_from_slice(id.as_bytes());
        expected.extend_from_slice(b"\x05Notch");
        expected.push(0);
        assert_eq!(frame, expected);
    }

    #[test]
    fn keep_alives_and_disconnects_follow_state() {
        assert_eq!(Response::keep_alive(State::Play, 7).map(|r| r.id()), Some(0x23));
        assert_eq!(Response::keep_alive(State::Configuration, 7).map(|r| r.id()), Some(0x03));
        assert_eq!(Response::keep_alive(State::Login, 7), None);
        assert_eq!(Response::disconnect(State::Login, "bye".into()).map(|r| r.id()), Some(0x00));
        assert_eq!(Response::disconnect(State::Play, "bye".into()).map(|r| r.id()), Some(0x1A));
        assert_eq!(Response::disconnect(State::Status, "bye".into()), None);
        assert_eq!(Response::KeepAlive(-1).payload(), [0x23, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn registry_data_is_not_length_prefixed() {
        assert_eq!(Response::RegistryData(vec![0x0a, 0x00]).payload(), [0x05, 0x0a, 0x00]);
        assert_eq!(Response::FinishConfiguration().to_frame(), [1, 0x02]);
        assert_eq!(Response::FinishConfiguration().enters(), Some(State::Play));
        assert_eq!(Response::Pong(0).state(), None);
    }

    #[test]
    fn status_json() {
        let Response::StatusResponse(json) = Response::status(&Config::default(), 3) else { unreachable!() };
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["version"]["protocol"], 763);
        assert_eq!(v["version"]["name"], "1.20.1");
        assert_eq!(v["players"]["online"], 3);
        assert_eq!(v["players"]["max"], 20);
        assert_eq!(v["description"]["text"], "A Minecraft Server");
        assert_eq!(v["enforcesSecureChat"], false);
    }
}
