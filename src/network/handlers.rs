//! What the server does with each packet it recognises.

use crate::prelude::*;
use crate::compound;
use crate::nbt::{self, List};
use crate::scheduler::{Repeat, Scheduler};

use super::client::State;
use super::request::ClientPacket;
use super::response::Response;
use super::Shared;

pub(super) fn execute(
    packet: &ClientPacket,
    key: Key,
    shared: &mut Shared,
    scheduler: &mut Scheduler<Shared>,
) -> io::Result<()> {
    match packet {
        ClientPacket::Handshake(hs) => {
            let expected = shared.config.server.protocol;
            if hs.protocol_version != expected {
                log::warn!("{key} speaks protocol {}, we speak {expected}", hs.protocol_version);
            }
            if let Some(conn) = shared.pool.get_mut(key) {
                conn.protocol_version = Some(hs.protocol_version);
            }
            enter(key, hs.next_state.into(), shared, scheduler);
        }
        ClientPacket::StatusRequest => {
            let status = Response::status(&shared.config, shared.pool.len());
            send(key, &status, shared, scheduler)?;
        }
        ClientPacket::Ping(payload) => send(key, &Response::Pong(*payload), shared, scheduler)?,
        ClientPacket::LoginStart(login) => {
            let uuid = login.uuid.unwrap_or_else(|| offline_uuid(&login.username));
            log::info!("{} logging in as {uuid}", login.username);
            send(key, &Response::LoginSuccess(uuid, login.username.clone()), shared, scheduler)?;
        }
        ClientPacket::LoginAck => {
            enter(key, State::Configuration, shared, scheduler);
            let registries = registry_data().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            send(key, &Response::RegistryData(registries), shared, scheduler)?;
            send(key, &Response::FinishConfiguration(), shared, scheduler)?;
        }
    }
    Ok(())
}

/// Sends `response`, then applies whatever state change sending it implies.
fn send(key: Key, response: &Response, shared: &mut Shared, scheduler: &mut Scheduler<Shared>) -> io::Result<()> {
    shared.pool.send(key, response)?;
    if let Some(state) = response.enters() {
        enter(key, state, shared, scheduler);
    }
    Ok(())
}

fn enter(key: Key, state: State, shared: &mut Shared, scheduler: &mut Scheduler<Shared>) {
    if shared.pool.set_state(key, state).is_none() {
        return;
    }
    if matches!(state, State::Configuration | State::Play) {
        start_keep_alive(key, shared, scheduler);
    }
}

/// One series per connection. It ends itself once the connection is gone.
fn start_keep_alive(key: Key, shared: &mut Shared, scheduler: &mut Scheduler<Shared>) {
    let interval = shared.config.keep_alive_interval;
    let Some(conn) = shared.pool.get_mut(key) else { return };
    if conn.keep_alive.is_some() {
        return;
    }
    let first = scheduler.age() + interval;
    conn.keep_alive = Some(scheduler.schedule_repeating(Some(first), interval, None, move |shared: &mut Shared, _| {
        let Some(conn) = shared.pool.get(key) else { return Repeat::Stop };
        if let Some(packet) = Response::keep_alive(conn.state(), unix_millis()) {
            if let Err(e) = shared.pool.send(key, &packet) {
                log::debug!("{key} missed a keep-alive: {e}");
            }
        }
        Repeat::Continue
    }));
}

fn unix_millis() -> i64 {
    time::SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// The id a server without authentication hands out for `name`.
pub fn offline_uuid(name: &str) -> uuid::Uuid {
    uuid::Uuid::new_v3(&uuid::Uuid::NAMESPACE_URL, format!("OfflinePlayer:{name}").as_bytes())
}

/// The smallest registry a client will accept: a single overworld dimension type.
fn registry_data() -> nbt::Result<Vec<u8>> {
    let overworld = compound! {
        "piglin_safe": false,
        "natural": true,
        "ambient_light": 0.0f32,
        "infiniburn": "#minecraft:infiniburn_overworld",
        "respawn_anchor_works": false,
        "has_skylight": true,
        "bed_works": true,
        "effects": "minecraft:overworld",
        "has_raids": true,
        "logical_height": 384i32,
        "coordinate_scale": 1.0f64,
        "monster_spawn_light_level": compound! {
            "type": "minecraft:uniform",
            "value": compound! { "min_inclusive": 0i32, "max_inclusive": 7i32 },
        },
        "min_y": -64i32,
        "ultrawarm": false,
        "has_ceiling": false,
        "monster_spawn_block_light_limit": 0i32,
        "height": 384i32,
    };
    let root = compound! {
        "minecraft:dimension_type": compound! {
            "type": "minecraft:dimension_type",
            "value": List::of([compound! {
                "name": "minecraft:overworld",
                "id": 0i32,
                "element": overworld,
            }])?,
        },
    };
    nbt::network_root(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::network::ConnectionPool;
    use crate::scheduler::SeriesEnd;
    use std::io::Read;
    use std::net::TcpListener;

    fn shared(keep_alive_interval: u64) -> (Shared, Key, TcpStream) {
        let mut pool = ConnectionPool::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client.set_read_timeout(Some(time::Duration::from_secs(5))).unwrap();
        let (server, peer) = listener.accept().unwrap();
        let key = pool.add(server, peer).unwrap();
        let config = Config { keep_alive_interval, ..Config::default() };
        (Shared { config, pool, shutdown_requested: false }, key, client)
    }
    fn tick(scheduler: &mut Scheduler<Shared>, t0: time::Instant, shared: &mut Shared) {
        let age = scheduler.age() as u32 + 1;
        assert!(scheduler.poll(t0 + scheduler.interval() * age, shared));
    }
    /// Reads one keep-alive frame and returns its packet id.
    fn keep_alive_id(client: &mut TcpStream) -> u8 {
        let mut frame = [0; 10];
        client.read_exact(&mut frame).unwrap();
        assert_eq!(frame[0], 9);
        frame[1]
    }

    #[test]
    fn keep_alive_series_follows_the_connection() {
        let (mut shared, key, mut client) = shared(3);
        let mut scheduler = Scheduler::new(20);
        let t0 = time::Instant::now();
        scheduler.start_at(t0);

        enter(key, State::Login, &mut shared, &mut scheduler);
        assert!(shared.pool.get(key).unwrap().keep_alive.is_none());
        enter(key, State::Configuration, &mut shared, &mut scheduler);
        let series = shared.pool.get(key).unwrap().keep_alive.clone().unwrap();

        tick(&mut scheduler, t0, &mut shared);
        tick(&mut scheduler, t0, &mut shared);
        assert_eq!(series.fired(), 0);
        tick(&mut scheduler, t0, &mut shared);
        assert_eq!(series.fired(), 1);
        assert_eq!(keep_alive_id(&mut client), 0x03);

        // still the same series, with a single run pending
        enter(key, State::Play, &mut shared, &mut scheduler);
        assert_eq!(shared.pool.get(key).unwrap().keep_alive.as_ref().map(|s| s.id()), Some(series.id()));
        assert_eq!(scheduler.pending(), 1);
        for _ in 0..3 {
            tick(&mut scheduler, t0, &mut shared);
        }
        assert_eq!(series.fired(), 2);
        assert_eq!(keep_alive_id(&mut client), 0x23);

        assert!(shared.pool.close(key));
        for _ in 0..3 {
            tick(&mut scheduler, t0, &mut shared);
        }
        assert_eq!(series.ended(), Some(SeriesEnd::Completed));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn offline_uuids_are_stable_v3() {
        let id = offline_uuid("Notch");
        assert_eq!(id, offline_uuid("Notch"));
        assert_ne!(id, offline_uuid("notch"));
        assert_eq!(id.get_version_num(), 3);
    }

    #[test]
    fn registry_data_reads_back() {
        let bytes = registry_data().unwrap();
        let root = nbt::Reader::new(&bytes).read_network_root().unwrap();
        let Some(nbt::Tag::Compound(dimensions)) = root.get("minecraft:dimension_type") else {
            panic!("no dimension registry in {root:?}");
        };
        let Some(nbt::Tag::List(values)) = dimensions.get("value") else { panic!("no values") };
        assert_eq!(values.kind(), nbt::Kind::Compound);
        assert_eq!(values.len(), 1);
    }
}
