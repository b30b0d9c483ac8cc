use crate::prelude::*;
use std::collections::VecDeque;
use std::net::SocketAddr;

use super::chat::Chat;
use super::client::{Connection, State};
use super::event::Event;
use super::response::Response;

/// How long disconnecting may block writing out what a client hasn't taken yet. Shared by
/// every connection in [`ConnectionPool::disconnect_all`].
pub const FLUSH_BUDGET: time::Duration = time::Duration::from_millis(250);

/// The live connections, and the poller watching their sockets.
///
/// This is the only place connections are added or removed. Everything it does that an
/// observer might care about is queued as an [`Event`].
#[derive(Debug)]
pub struct ConnectionPool {
    pub(super) poller: polling::Poller,
    connections: SlotMap<Connection>,
    events: VecDeque<Event>,
}
impl ConnectionPool {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poller: polling::Poller::new()?,
            connections: SlotMap::new(),
            events: VecDeque::new(),
        })
    }
    pub(super) fn add(&mut self, conn: TcpStream, peer: SocketAddr) -> io::Result<Key> {
        let conn = Connection::accept(conn, peer)?;
        self.poller.add(conn.conn(), polling::Event::readable(self.connections.next_idx()))?;
        let key = self.connections.insert(conn);
        log::debug!("{peer} connected as {key}");
        self.emit(Event::Connected { key, peer });
        Ok(key)
    }

    pub fn get(&self, key: Key) -> Option<&Connection> {
        self.connections.get(key)
    }
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut Connection> {
        self.connections.get_mut(key)
    }
    pub fn contains(&self, key: Key) -> bool {
        self.connections.get(key).is_some()
    }
    pub fn len(&self) -> usize {
        self.connections.len()
    }
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
    pub fn keys(&self) -> Vec<Key> {
        self.connections.keys()
    }
    pub(super) fn key_at(&self, idx: usize) -> Option<Key> {
        self.connections.key_at(idx)
    }

    /// Sends a packet without touching the connection's state. A failed send leaves the
    /// connection in the pool.
    pub fn send(&mut self, key: Key, response: &Response) -> io::Result<()> {
        let conn = self.connections.get_mut(key)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        conn.send(response)?;
        if conn.waiting_for_write {
            self.poller.modify(conn.conn(), polling::Event::all(key.index()))?;
        }
        Ok(())
    }
    pub(crate) fn set_state(&mut self, key: Key, state: State) -> Option<State> {
        let from = self.connections.get_mut(key)?.set_state(state);
        if from != state {
            log::debug!("{key} moved from {from:?} to {state:?}");
            self.emit(Event::StateChanged { key, from, to: state });
        }
        Some(from)
    }

    /// Closes a connection, first telling the client why if a reason is given and its state
    /// has a way to say so. Returns `Ok(false)` if there was no such connection.
    ///
    /// The connection leaves the pool even when this fails: the error only says that the
    /// client may not have received everything queued for it.
    pub fn disconnect(&mut self, key: Key, reason: Option<&Chat>) -> io::Result<bool> {
        self.disconnect_within(key, reason, FLUSH_BUDGET)
    }
    /// Disconnects everyone with the same reason. True only if every disconnect succeeded.
    pub fn disconnect_all(&mut self, reason: Option<&Chat>) -> bool {
        let deadline = time::Instant::now() + FLUSH_BUDGET;
        let mut clean = true;
        for key in self.connections.keys() {
            let budget = deadline.saturating_duration_since(time::Instant::now());
            if let Err(e) = self.disconnect_within(key, reason, budget) {
                log::debug!("{key} didn't disconnect cleanly: {e}");
                clean = false;
            }
        }
        clean
    }
    fn disconnect_within(&mut self, key: Key, reason: Option<&Chat>, budget: time::Duration) -> io::Result<bool> {
        let Some(conn) = self.connections.get_mut(key) else { return Ok(false) };
        let mut result = Ok(());
        if let Some(reason) = reason {
            match Response::disconnect(conn.state(), reason.clone()) {
                Some(packet) => result = conn.send(&packet),
                None => log::warn!("{key} can't be told why it's disconnected in {:?}", conn.state()),
            }
        }
        let finished = conn.finish(budget);
        self.evict(key);
        result.and(finished).map(|()| true)
    }
    /// Drops a connection whose socket has gone away, without any protocol notice.
    pub fn close(&mut self, key: Key) -> bool {
        self.evict(key).is_some()
    }
    fn evict(&mut self, key: Key) -> Option<Connection> {
        let conn = self.connections.release(key)?;
        if let Err(e) = self.poller.delete(conn.conn()) {
            log::debug!("{key} wasn't registered with the poller: {e}");
        }
        log::debug!("{key} disconnected");
        self.emit(Event::Disconnected { key, peer: conn.peer() });
        Some(conn)
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.events.push_back(event);
    }
    pub(crate) fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }
}
