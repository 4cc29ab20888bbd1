use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::config::{ClientFileConfig, ConfigError};
use crate::socks5::{
    Address, ConnectTunnel, Credentials, HandshakeSession, SocksError, TunnelVariant,
    UdpAssociateTunnel,
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// High-level entry point for opening tunnels through one SOCKS5 server.
///
/// Every call builds a fresh [`HandshakeSession`] on a new TCP connection.
/// Connect and handshake together are bounded by the connect timeout. Nothing
/// is retried or pooled; a failed call is reported as is.
#[derive(Debug, Clone)]
pub struct TunnelClient {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    connect_timeout: Duration,
}

/// A completed UDP ASSOCIATE. The control stream must stay open for as long
/// as the relay is in use.
#[derive(Debug)]
pub struct UdpAssociation {
    pub control: TcpStream,
    /// Where to send encapsulated datagrams.
    pub relay: SocketAddr,
}

impl TunnelClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Build a client from a validated configuration file.
    pub fn from_config(config: &ClientFileConfig) -> Result<Self, ConfigError> {
        let (host, port) = config.server_endpoint()?;
        let mut client = Self::new(host, port).with_connect_timeout(config.connect_timeout);
        if let Some(credentials) = config.credentials()? {
            client = client.with_credentials(credentials);
        }
        Ok(client)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn server(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Connect to the server and run the handshake for `variant`. Returns the
    /// variant, now holding the relay address, and the connected stream.
    pub async fn establish<V: TunnelVariant>(&self, variant: V) -> Result<(V, TcpStream), SocksError> {
        let mut session = HandshakeSession::new(variant);
        if let Some(credentials) = &self.credentials {
            session.set_credentials(credentials.clone())?;
        }

        let attempt = async {
            session.connect(&self.host, self.port).await?;
            session.handshake().await
        };
        tokio::time::timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| SocksError::Timeout(self.connect_timeout))??;

        let (variant, stream) = session.into_parts();
        let stream = stream.ok_or(SocksError::NotConnected)?;
        Ok((variant, stream))
    }

    /// Open a stream tunnel to `target`. The returned stream carries
    /// application data.
    pub async fn connect(&self, target: Address) -> Result<(TcpStream, Option<Address>), SocksError> {
        debug!(%target, "opening connect tunnel");
        let (tunnel, stream) = self.establish(ConnectTunnel::new(target)).await?;
        Ok((stream, tunnel.bound_address().cloned()))
    }

    /// Ask the server for a UDP relay. `local` is the address datagrams will
    /// be sent from, or `None` when it is not known yet.
    pub async fn udp_associate(&self, local: Option<SocketAddr>) -> Result<UdpAssociation, SocksError> {
        let mut tunnel = UdpAssociateTunnel::new();
        if let Some(local) = local {
            tunnel = tunnel.with_local(local);
        }
        let (tunnel, control) = self.establish(tunnel).await?;

        let server = control.peer_addr()?;
        let relay = tunnel
            .relay_endpoint(server)
            .ok_or_else(|| SocksError::RelayAddress("server returned no relay".to_string()))?;
        debug!(%relay, "udp relay ready");
        Ok(UdpAssociation { control, relay })
    }
}
