use std::io;
use std::net::SocketAddr;

use tokio::net::TcpSocket;
use tracing::debug;

use super::{Address, SocksError, TunnelCommand};

/// Per-tunnel behaviour plugged into a [`HandshakeSession`](super::HandshakeSession).
pub trait TunnelVariant {
    fn command(&self) -> TunnelCommand;

    /// Address placed in the outbound tunnel request.
    fn target_address(&self) -> Address;

    /// Configure the socket before it connects to the SOCKS5 server.
    fn bind(&self, _socket: &TcpSocket, _server: SocketAddr) -> io::Result<()> {
        Ok(())
    }

    /// Receives the bound address from a successful reply.
    fn on_relay_address(&mut self, addr: Address) -> Result<(), SocksError>;
}

impl<T: TunnelVariant + ?Sized> TunnelVariant for Box<T> {
    fn command(&self) -> TunnelCommand {
        (**self).command()
    }

    fn target_address(&self) -> Address {
        (**self).target_address()
    }

    fn bind(&self, socket: &TcpSocket, server: SocketAddr) -> io::Result<()> {
        (**self).bind(socket, server)
    }

    fn on_relay_address(&mut self, addr: Address) -> Result<(), SocksError> {
        (**self).on_relay_address(addr)
    }
}

fn bind_source(socket: &TcpSocket, source: Option<SocketAddr>, server: SocketAddr) -> io::Result<()> {
    let Some(local) = source else {
        return Ok(());
    };
    if local.is_ipv4() != server.is_ipv4() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("source address {} does not match server family {}", local, server),
        ));
    }
    debug!(%local, "binding socks5 client socket");
    socket.set_reuseaddr(true)?;
    socket.bind(local)
}

/// Stream connect through the proxy.
#[derive(Debug, Clone)]
pub struct ConnectTunnel {
    target: Address,
    source: Option<SocketAddr>,
    bound: Option<Address>,
}

impl ConnectTunnel {
    pub fn new(target: Address) -> Self {
        Self {
            target,
            source: None,
            bound: None,
        }
    }

    /// Bind the outgoing socket to `source` before connecting.
    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn target(&self) -> &Address {
        &self.target
    }

    /// The address the server bound for this connection, once the handshake
    /// has completed.
    pub fn bound_address(&self) -> Option<&Address> {
        self.bound.as_ref()
    }
}

impl TunnelVariant for ConnectTunnel {
    fn command(&self) -> TunnelCommand {
        TunnelCommand::Connect
    }

    fn target_address(&self) -> Address {
        self.target.clone()
    }

    fn bind(&self, socket: &TcpSocket, server: SocketAddr) -> io::Result<()> {
        bind_source(socket, self.source, server)
    }

    fn on_relay_address(&mut self, addr: Address) -> Result<(), SocksError> {
        self.bound = Some(addr);
        Ok(())
    }
}

/// UDP datagrams forwarded over the TCP control stream itself.
#[derive(Debug, Clone, Default)]
pub struct UdpOverTcpTunnel {
    source: Option<SocketAddr>,
    relay: Option<Address>,
}

impl UdpOverTcpTunnel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn relay_address(&self) -> Option<&Address> {
        self.relay.as_ref()
    }
}

impl TunnelVariant for UdpOverTcpTunnel {
    fn command(&self) -> TunnelCommand {
        TunnelCommand::ForwardUdp
    }

    fn target_address(&self) -> Address {
        Address::unspecified()
    }

    fn bind(&self, socket: &TcpSocket, server: SocketAddr) -> io::Result<()> {
        bind_source(socket, self.source, server)
    }

    fn on_relay_address(&mut self, addr: Address) -> Result<(), SocksError> {
        self.relay = Some(addr);
        Ok(())
    }
}

/// UDP ASSOCIATE: the server opens a datagram relay and replies with its
/// endpoint.
#[derive(Debug, Clone)]
pub struct UdpAssociateTunnel {
    local: Address,
    source: Option<SocketAddr>,
    relay: Option<SocketAddr>,
}

impl Default for UdpAssociateTunnel {
    fn default() -> Self {
        Self {
            local: Address::unspecified(),
            source: None,
            relay: None,
        }
    }
}

impl UdpAssociateTunnel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce the address datagrams will be sent from.
    pub fn with_local(mut self, local: SocketAddr) -> Self {
        self.local = Address::Ip(local);
        self
    }

    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source = Some(source);
        self
    }

    /// The relay endpoint exactly as the server returned it.
    pub fn relay_address(&self) -> Option<SocketAddr> {
        self.relay
    }

    /// The endpoint to send datagrams to. Servers commonly answer with an
    /// unspecified IP meaning "the address you reached me on".
    pub fn relay_endpoint(&self, server: SocketAddr) -> Option<SocketAddr> {
        self.relay.map(|relay| {
            if relay.ip().is_unspecified() {
                SocketAddr::new(server.ip(), relay.port())
            } else {
                relay
            }
        })
    }
}

impl TunnelVariant for UdpAssociateTunnel {
    fn command(&self) -> TunnelCommand {
        TunnelCommand::UdpAssociate
    }

    fn target_address(&self) -> Address {
        self.local.clone()
    }

    fn bind(&self, socket: &TcpSocket, server: SocketAddr) -> io::Result<()> {
        bind_source(socket, self.source, server)
    }

    fn on_relay_address(&mut self, addr: Address) -> Result<(), SocksError> {
        let relay = addr
            .as_socket_addr()
            .ok_or_else(|| SocksError::RelayAddress(format!("{} is not an IP endpoint", addr)))?;
        if relay.port() == 0 {
            return Err(SocksError::RelayAddress(format!(
                "udp relay {} has no port",
                relay
            )));
        }
        self.relay = Some(relay);
        Ok(())
    }
}
