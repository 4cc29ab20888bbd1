use std::io;
use std::net::SocketAddr;

use tokio::io::AsyncRead;
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, error, trace, warn};

use super::{
    build_request_frame, Address, AuthMethod, Credentials, ReplyParser, Resolver, SocksError,
    SystemResolver, TunnelVariant,
};
use crate::io::{is_expected_close_error, write_frame, IoStream};
use crate::telemetry;

/// Progress of a [`HandshakeSession`].
///
/// `Idle → RequestSent → AuthResolved → ReplyResolved → Complete`, or
/// `Failed` from any point. `Failed` and `Complete` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    RequestSent,
    AuthResolved,
    ReplyResolved,
    Complete,
    Failed,
}

/// One handshake attempt over one socket.
///
/// Credentials and the tunnel variant are fixed before [`handshake`] runs.
/// Any failure is terminal; retrying means building a new session.
///
/// [`handshake`]: HandshakeSession::handshake
pub struct HandshakeSession<V, S = TcpStream> {
    variant: V,
    credentials: Option<Credentials>,
    stream: Option<S>,
    state: SessionState,
}

impl<V: TunnelVariant, S> HandshakeSession<V, S> {
    pub fn new(variant: V) -> Self {
        Self {
            variant,
            credentials: None,
            stream: None,
            state: SessionState::Idle,
        }
    }

    /// Set the credentials offered in the handshake. Only allowed before the
    /// handshake has started.
    pub fn set_credentials(&mut self, credentials: Credentials) -> Result<(), SocksError> {
        if self.state != SessionState::Idle {
            return Err(SocksError::InvalidState(self.state));
        }
        debug!("socks5 client set auth");
        self.credentials = Some(credentials);
        Ok(())
    }

    /// Use an already connected stream.
    pub fn attach(&mut self, stream: S) -> Result<(), SocksError> {
        self.ensure_attachable()?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn variant(&self) -> &V {
        &self.variant
    }

    pub fn variant_mut(&mut self) -> &mut V {
        &mut self.variant
    }

    pub fn stream_mut(&mut self) -> Option<&mut S> {
        self.stream.as_mut()
    }

    pub fn into_parts(self) -> (V, Option<S>) {
        (self.variant, self.stream)
    }

    pub fn into_stream(self) -> Option<S> {
        self.stream
    }

    fn ensure_attachable(&self) -> Result<(), SocksError> {
        if self.state != SessionState::Idle || self.stream.is_some() {
            return Err(SocksError::InvalidState(self.state));
        }
        Ok(())
    }
}

impl<V: TunnelVariant> HandshakeSession<V, TcpStream> {
    /// Resolve and connect to the SOCKS5 server using the system resolver.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), SocksError> {
        self.connect_with(&SystemResolver, host, port).await
    }

    /// Resolve `host:port`, run the variant's bind hook on a fresh socket and
    /// connect. Any failure leaves the session `Failed`.
    pub async fn connect_with<R>(
        &mut self,
        resolver: &R,
        host: &str,
        port: u16,
    ) -> Result<(), SocksError>
    where
        R: Resolver + ?Sized,
    {
        self.ensure_attachable()?;
        debug!(host, port, "socks5 client connect");

        match self.connect_server(resolver, host, port).await {
            Ok(stream) => {
                debug!(peer = ?stream.peer_addr().ok(), "socks5 client connected");
                self.stream = Some(stream);
                Ok(())
            }
            Err(source) => {
                error!(host, port, error = %source, "socks5 client connect failed");
                self.state = SessionState::Failed;
                Err(SocksError::ServerUnreachable {
                    addr: format!("{}:{}", host, port),
                    source,
                })
            }
        }
    }

    async fn connect_server<R>(&self, resolver: &R, host: &str, port: u16) -> io::Result<TcpStream>
    where
        R: Resolver + ?Sized,
    {
        let addr = resolver
            .resolve(host, port)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"))?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        self.variant.bind(&socket, addr)?;
        socket.connect(addr).await
    }

    /// Use a std socket whose connection is established or still in progress.
    /// It is switched to non-blocking mode and registered with the runtime.
    pub fn attach_std(&mut self, stream: std::net::TcpStream) -> Result<(), SocksError> {
        self.ensure_attachable()?;
        stream.set_nonblocking(true)?;
        self.stream = Some(TcpStream::from_std(stream)?);
        Ok(())
    }
}

impl<V: TunnelVariant, S: IoStream> HandshakeSession<V, S> {
    /// Send the pipelined request and consume the server's reply.
    ///
    /// On success the variant has received the relay address and the stream
    /// is positioned at the start of tunnel data.
    pub async fn handshake(&mut self) -> Result<(), SocksError> {
        if self.state != SessionState::Idle {
            return Err(SocksError::InvalidState(self.state));
        }
        if self.stream.is_none() {
            return Err(SocksError::NotConnected);
        }

        debug!("socks5 client handshake");
        telemetry::record_handshake_start();

        match self.run().await {
            Ok(()) => {
                self.state = SessionState::Complete;
                telemetry::record_handshake_success();
                Ok(())
            }
            Err(err) => {
                let failed_in = self.state;
                self.state = SessionState::Failed;
                telemetry::record_handshake_failure();
                if is_peer_close(&err) {
                    warn!(state = ?failed_in, error = %err, "socks5 server closed connection");
                } else {
                    error!(state = ?failed_in, error = %err, "socks5 client handshake failed");
                }
                Err(err)
            }
        }
    }

    async fn run(&mut self) -> Result<(), SocksError> {
        let command = self.variant.command();
        let target = self.variant.target_address();
        let frame = build_request_frame(self.credentials.as_ref(), command, &target)?;

        let stream = self.stream.as_mut().ok_or(SocksError::NotConnected)?;

        debug!(?command, %target, len = frame.len(), "socks5 client write request");
        trace!(target: "socks5_tunnel::wire_dump", direction = "tx", hex = %hex::encode(frame.request()));
        write_frame(stream, frame.as_bytes()).await?;
        telemetry::record_frame_out(frame.len());
        self.state = SessionState::RequestSent;

        debug!("socks5 client read response");
        let mut parser = ReplyParser::new(stream, frame.method());
        let result = read_response(&mut parser, &mut self.state).await;
        telemetry::record_reply_in(parser.bytes_read());

        let relay = result?;
        self.variant.on_relay_address(relay)
    }
}

/// The server went away mid-handshake rather than answering badly.
fn is_peer_close(err: &SocksError) -> bool {
    match err {
        SocksError::ShortRead(_) | SocksError::ShortWrite => true,
        SocksError::Io(e) => is_expected_close_error(e),
        _ => false,
    }
}

/// Drive the parser through every phase, advancing `state` as each one
/// resolves.
async fn read_response<R: AsyncRead + Unpin>(
    parser: &mut ReplyParser<'_, R>,
    state: &mut SessionState,
) -> Result<Address, SocksError> {
    if parser.read_method_selection().await? == AuthMethod::UsernamePassword {
        parser.read_auth_status().await?;
        debug!("socks5 client auth done");
    }
    *state = SessionState::AuthResolved;

    let atype = parser.read_reply_header().await?;
    *state = SessionState::ReplyResolved;

    parser.read_reply_address(atype).await
}
