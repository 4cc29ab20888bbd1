pub mod client;
pub mod config;
pub mod io;
pub mod protocol;
pub mod socks5;
pub mod telemetry;

pub use client::{TunnelClient, UdpAssociation};
