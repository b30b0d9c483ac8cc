use crate::prelude::*;
use std::io::Write;

use super::frame::FrameBuffer;
use super::response::Response;

/// Where a connection is in the protocol. Only packet execution moves it along.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum State {
    #[default]
    None,
    Status,
    Login,
    Configuration,
    Play,
}
impl State {
    pub const ALL: [State; 5] = [State::None, State::Status, State::Login, State::Configuration, State::Play];
}

pub struct Connection {
    conn: TcpStream,
    peer: std::net::SocketAddr,
    state: State,
    pub(super) frame: FrameBuffer,
    pending_bytes: Vec<u8>,
    pending_byte_cursor: usize,
    pub(super) protocol_version: Option<i32>,
    pub(super) keep_alive: Option<crate::scheduler::RepeatingTask>,

    pub(super) waiting_for_write: bool,
}
impl Connection {
    pub fn accept(conn: TcpStream, peer: std::net::SocketAddr) -> io::Result<Self> {
        conn.set_nonblocking(true)?;
        conn.set_nodelay(true)?;
        Ok(Self {
            conn,
            peer,
            state: State::None,
            frame: FrameBuffer::new(),
            pending_bytes: vec![],
            pending_byte_cursor: 0,
            protocol_version: None,
            keep_alive: None,
            waiting_for_write: false,
        })
    }
    pub fn state(&self) -> State {
        self.state
    }
    pub fn peer(&self) -> std::net::SocketAddr {
        self.peer
    }
    /// The protocol version announced in the handshake.
    pub fn protocol_version(&self) -> Option<i32> {
        self.protocol_version
    }
    pub(super) fn set_state(&mut self, state: State) -> State {
        core::mem::replace(&mut self.state, state)
    }
    pub(super) fn conn(&self) -> &TcpStream {
        &self.conn
    }
    pub(super) fn conn_mut(&mut self) -> &mut TcpStream {
        &mut self.conn
    }
    pub(super) fn has_pending_writes(&self) -> bool {
        self.pending_byte_cursor < self.pending_bytes.len()
    }

    /// Queues a framed packet and pushes out as much as the socket takes right now.
    pub fn send(&mut self, response: &Response) -> io::Result<()> {
        let frame = response.to_frame();
        log::trace!("Forwarding {response:?} {}b", frame.len());
        if !self.has_pending_writes() {
            self.pending_bytes.clear();
            self.pending_byte_cursor = 0;
        }
        self.pending_bytes.extend_from_slice(&frame);
        self.flush()
    }
    pub(super) fn flush(&mut self) -> io::Result<()> {
        while self.has_pending_writes() {
            match self.conn.write(&self.pending_bytes[self.pending_byte_cursor..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.pending_byte_cursor += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.waiting_for_write = true;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.pending_bytes.clear();
        self.pending_byte_cursor = 0;
        Ok(())
    }
    /// Blocks for at most `budget` to write out whatever is queued, then shuts the socket
    /// down. The socket is back in nonblocking mode and shut down whether or not the queued
    /// bytes made it out.
    pub(super) fn finish(&mut self, budget: time::Duration) -> io::Result<()> {
        let flushed = self.flush_within(budget);
        let closed = match self.conn.shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        };
        flushed.and(closed)
    }
    fn flush_within(&mut self, budget: time::Duration) -> io::Result<()> {
        if !self.has_pending_writes() {
            return Ok(());
        }
        let written = if budget.is_zero() {
            Err(io::ErrorKind::TimedOut.into())
        } else {
            self.conn.set_nonblocking(false)
                .and_then(|()| self.conn.set_write_timeout(Some(budget)))
                .and_then(|()| self.conn.write_all(&self.pending_bytes[self.pending_byte_cursor..]))
        };
        self.pending_bytes.clear();
        self.pending_byte_cursor = 0;
        self.waiting_for_write = false;
        let restored = self.conn.set_nonblocking(true);
        written.and(restored)
    }
}
impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("buffered", &self.frame.as_bytes().len())
            .finish()
    }
}
