use std::net::{SocketAddr, UdpSocket};

use mcproto::network::{Chat, ClientPacket};
use mcproto::scheduler::Repeat;
use mcproto::{Config, Event, Server};

const LAN_GROUP: &str = "224.0.2.60:4445";
const ANNOUNCE_EVERY: u64 = 40;

/// Multicasts the server to clients on the local network, like singleplayer's "open to LAN".
struct Announcer {
    socket: UdpSocket,
    announcement: String,
}
impl Announcer {
    fn new(motd: &str, port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            announcement: format!("[MOTD]{motd}[/MOTD][AD]{port}[/AD]"),
        })
    }
    fn announce(&self) {
        match self.socket.send_to(self.announcement.as_bytes(), LAN_GROUP) {
            Ok(n) if n == self.announcement.len() => {}
            Ok(_) => log::warn!("network too busy to announce on LAN"),
            Err(e) => log::warn!("couldn't announce on LAN: {e}"),
        }
    }
}

fn log_event(event: &Event) {
    match event {
        Event::Listening(addr) => match local_ip_address::local_ip() {
            Ok(ip) => log::info!("Ready for players at {}", SocketAddr::new(ip, addr.port())),
            Err(e) => log::info!("Ready for players on port {} (no LAN address: {e})", addr.port()),
        },
        Event::Connected { key, peer } => log::debug!("{peer} connected as {key}"),
        Event::Packet { key, packet: ClientPacket::LoginStart(login) } => {
            log::info!("{} joined ({key})", login.username)
        }
        Event::Packet { key, packet } => log::trace!("{key} -> {}", packet.name()),
        Event::UnknownPacket { key, state, frame } => {
            log::warn!("{key} sent an unknown packet in {state:?}: {frame:02x?}")
        }
        Event::StateChanged { key, from, to } => log::debug!("{key}: {from:?} -> {to:?}"),
        Event::Disconnected { key, peer } => log::debug!("{peer} ({key}) left"),
        Event::Closed => log::info!("Closed"),
    }
}

fn main() -> std::io::Result<()> {
    let path = std::env::args_os().nth(1).unwrap_or_else(|| "config.json".into());
    let (config, problem) = match Config::from_path(&path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level)).init();
    if let Some(e) = problem {
        log::error!("{e} ({}); using the default config", std::path::Path::new(&path).display());
    }

    let mut server = Server::bind(config)?;
    server.observe(|event, shared| {
        log_event(event);
        if let Event::UnknownPacket { key, .. } = event {
            if let Err(e) = shared.pool.disconnect(*key, None::<&Chat>) {
                log::debug!("{key} didn't disconnect cleanly: {e}");
            }
        }
    });

    let config = &server.shared.config;
    if config.lan_announce {
        let announcer = Announcer::new(&config.server.motd, server.local_addr().port())?;
        server.scheduler.schedule_repeating(None, ANNOUNCE_EVERY, None, move |_, _| {
            announcer.announce();
            Repeat::Continue
        });
    }
    server.run()
}
