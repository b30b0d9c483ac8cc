use crate::prelude::*;
use std::io::Read;
use std::net::{SocketAddr, TcpListener};

use crate::config::Config;
use crate::scheduler::Scheduler;

mod chat;
pub mod client;
pub mod encode;
mod event;
mod frame;
mod handlers;
mod parsed;
mod pool;
pub mod request;
pub mod response;
pub mod wire;

pub use chat::Chat;
pub use client::{Connection, State};
pub use event::Event;
pub use frame::{FrameBuffer, Progress, MAX_FRAME_LEN};
pub use handlers::offline_uuid;
pub use parsed::ParsedPacket;
pub use pool::ConnectionPool;
pub use request::ClientPacket;
pub use response::Response;

/// What packet handlers, scheduled jobs and observers get to work with.
#[derive(Debug)]
pub struct Shared {
    pub config: Config,
    pub pool: ConnectionPool,
    shutdown_requested: bool,
}
impl Shared {
    /// Asks [`Server::run`] to stop once the current turn is over.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }
}

pub type Observer = Box<dyn FnMut(&Event, &mut Shared)>;

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    scratch_buffer: Vec<u8>,
    events: Vec<polling::Event>,

    pub scheduler: Scheduler<Shared>,
    pub shared: Shared,
    observers: Vec<Observer>,
    running: bool,
}

const LISTENER: usize = usize::MAX - 1;
impl Server {
    /// Starts listening and starts the scheduler. Nothing is accepted until the first turn.
    pub fn bind(config: Config) -> io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let mut pool = ConnectionPool::new()?;
        pool.poller.add(&listener, polling::Event::readable(LISTENER))?;
        pool.emit(Event::Listening(local_addr));

        let mut scheduler = Scheduler::new(config.tick_rate);
        scheduler.start();
        log::info!("Listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            scratch_buffer: vec![0; 64 * 1024],
            events: vec![],

            scheduler,
            shared: Shared { config, pool, shutdown_requested: false },
            observers: vec![],
            running: true,
        })
    }
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    pub fn is_running(&self) -> bool {
        self.running
    }
    /// Observers see every event, in order, after the turn that produced it.
    pub fn observe(&mut self, observer: impl FnMut(&Event, &mut Shared) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Waits for socket activity (at most `timeout`, and never past the next tick), handles
    /// it, runs the scheduler and hands the resulting events to the observers.
    pub fn turn(&mut self, timeout: Option<time::Duration>) -> io::Result<()> {
        let timeout = match self.scheduler.next_deadline() {
            Some(deadline) => {
                let until_tick = deadline.saturating_duration_since(time::Instant::now());
                Some(timeout.map_or(until_tick, |t| t.min(until_tick)))
            }
            None => timeout,
        };
        self.events.clear();
        match self.shared.pool.poller.wait(&mut self.events, timeout) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
        let mut events = core::mem::take(&mut self.events);
        for event in events.drain(..) {
            self.handle(event)?;
        }
        self.events = events;

        self.scheduler.poll(time::Instant::now(), &mut self.shared);
        self.deliver();
        Ok(())
    }
    /// Turns until [`Server::stop`] or [`Shared::request_shutdown`].
    pub fn run(&mut self) -> io::Result<()> {
        while self.running {
            self.turn(None)?;
            if self.shared.shutdown_requested {
                self.stop();
            }
        }
        Ok(())
    }
    /// Disconnects everyone with the configured reason, stops accepting, and terminates
    /// the scheduler. Returns false if the server had already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        let reason = Chat::text(&self.shared.config.shutdown_kick_reason);
        if !self.shared.pool.disconnect_all(Some(&reason)) {
            log::warn!("Some connections didn't close cleanly");
        }
        if let Err(e) = self.shared.pool.poller.delete(&self.listener) {
            log::debug!("listener wasn't registered with the poller: {e}");
        }
        self.scheduler.stop();
        log::info!("Server closed");
        self.shared.pool.emit(Event::Closed);
        self.deliver();
        true
    }

    fn handle(&mut self, event: polling::Event) -> io::Result<()> {
        if event.key == LISTENER {
            self.accept_connections()?;
            return self.shared.pool.poller.modify(&self.listener, polling::Event::readable(LISTENER));
        }
        let Some(key) = self.shared.pool.key_at(event.key) else {
            log::trace!("event for a connection that's already gone: {event:?}");
            return Ok(());
        };
        let was_waiting_for_write = match self.shared.pool.get_mut(key) {
            Some(conn) => core::mem::take(&mut conn.waiting_for_write),
            None => return Ok(()),
        };

        // may set the waiting_for_write flag
        if event.readable && !self.read(key) {
            return Ok(());
        }
        if event.writable {
            let flushed = match self.shared.pool.get_mut(key) {
                Some(conn) => conn.flush(),
                None => return Ok(()),
            };
            if let Err(e) = flushed {
                log::debug!("{key} write failed: {e}");
                self.shared.pool.close(key);
                return Ok(());
            }
        }
        let Some(conn) = self.shared.pool.get(key) else { return Ok(()) };
        let rearmed = self.shared.pool.poller.modify(conn.conn(), polling::Event {
            key: event.key,
            readable: true,
            writable: conn.waiting_for_write || (was_waiting_for_write && !event.writable),
        });
        if let Err(e) = rearmed {
            log::debug!("{key} can't be polled anymore: {e}");
            self.shared.pool.close(key);
        }
        Ok(())
    }
    fn accept_connections(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((conn, peer)) => {
                    if let Err(e) = self.shared.pool.add(conn, peer) {
                        log::warn!("couldn't accept {peer}: {e}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
    /// Reads until the socket would block. Returns false once the connection is gone.
    fn read(&mut self, key: Key) -> bool {
        loop {
            let Some(conn) = self.shared.pool.get_mut(key) else { return false };
            match conn.conn_mut().read(&mut self.scratch_buffer) {
                Ok(0) => {
                    self.shared.pool.close(key);
                    return false;
                }
                Ok(n) => self.feed(key, n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::debug!("{key} read failed: {e}");
                    self.shared.pool.close(key);
                    return false;
                }
            }
        }
    }
    /// Pushes the first `n` bytes of the scratch buffer through the connection's framer one
    /// at a time, dispatching each frame as soon as it completes. A malformed length prefix
    /// is reported as an unknown packet and ends the connection, since nothing after it can
    /// be framed.
    fn feed(&mut self, key: Key, n: usize) {
        for &byte in &self.scratch_buffer[..n] {
            let Some(conn) = self.shared.pool.get_mut(key) else { return };
            let progress = conn.frame.push(byte);
            if progress == Progress::Partial {
                continue;
            }
            let frame = conn.frame.take();
            let state = conn.state();
            if progress == Progress::Malformed {
                log::debug!("{key} sent a malformed length prefix {frame:02x?}");
                self.shared.pool.emit(Event::UnknownPacket { key, state, frame });
                self.shared.pool.close(key);
                return;
            }
            match request::classify(&frame, state) {
                Some(packet) => {
                    log::trace!("{key} sent {packet:?}");
                    self.shared.pool.emit(Event::Packet { key, packet: packet.clone() });
                    if let Err(e) = handlers::execute(&packet, key, &mut self.shared, &mut self.scheduler) {
                        log::debug!("{key} couldn't be answered after {}: {e}", packet.name());
                    }
                }
                None => self.shared.pool.emit(Event::UnknownPacket { key, state, frame }),
            }
        }
    }
    fn deliver(&mut self) {
        while let Some(event) = self.shared.pool.next_event() {
            for observer in &mut self.observers {
                observer(&event, &mut self.shared);
            }
        }
    }
}
impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("scheduler", &self.scheduler)
            .field("shared", &self.shared)
            .field("observers", &self.observers.len())
            .field("running", &self.running)
            .finish()
    }
}
