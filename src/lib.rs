//! A minimal server for the Minecraft wire protocol: enough to take a client from the
//! handshake through login and configuration into play, on a single thread.

mod collections;
pub mod config;
pub mod nbt;
pub mod network;
pub mod scheduler;

pub use collections::Key;
pub use config::Config;
pub use network::{Event, Server, Shared};
pub use scheduler::Scheduler;

mod prelude {
    pub(crate) use crate::collections::*;
    pub(crate) use std::{io, time};
    pub(crate) use std::net::TcpStream;
}
