//! Client side of the SOCKS5 tunnel handshake.
//!
//! The greeting, the optional username/password sub-negotiation and the
//! tunnel request are sent to the server in one write. The server's answers
//! are then consumed phase by phase by [`ReplyParser`], and the bound relay
//! address is handed to the [`TunnelVariant`] that asked for the tunnel.

mod addr;
mod frame;
mod reply;
mod resolver;
mod session;
mod variant;

use std::fmt;
use std::io;

use thiserror::Error;

use crate::protocol::{
    AUTH_VERSION, CMD_CONNECT, CMD_FWD_UDP, CMD_UDP_ASSOCIATE, MAX_FIELD_LEN, METHOD_NO_AUTH,
    METHOD_USERPASS, SOCKS_VERSION,
};

pub use addr::{reply_body_len, Address};
pub use frame::{build_request_frame, offered_method, RequestFrame};
pub use reply::ReplyParser;
pub use resolver::{Resolver, SystemResolver};
pub use session::{HandshakeSession, SessionState};
pub use variant::{ConnectTunnel, TunnelVariant, UdpAssociateTunnel, UdpOverTcpTunnel};

#[derive(Debug, Error)]
pub enum SocksError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("socks5 server {addr} unreachable: {source}")]
    ServerUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection closed before the request frame was fully written")]
    ShortWrite,
    #[error("connection closed while reading {0}")]
    ShortRead(Phase),
    #[error("protocol version mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ProtocolVersionMismatch { expected: u8, actual: u8 },
    #[error("server selected an authentication method that was not offered: {0:#04x}")]
    UnsupportedMethodSelected(u8),
    #[error("authentication rejected (status {0:#04x})")]
    AuthenticationRejected(u8),
    #[error("tunnel rejected: {0}")]
    TunnelRejected(ReplyStatus),
    #[error("unsupported address type {0:#04x}")]
    UnsupportedAddressType(u8),
    #[error("domain name is {0} bytes, limit is 255")]
    AddressTooLong(usize),
    #[error("{field} is {len} bytes, limit is 255")]
    CredentialTooLong { field: &'static str, len: usize },
    #[error("no socket attached to the session")]
    NotConnected,
    #[error("operation not allowed in session state {0:?}")]
    InvalidState(SessionState),
    #[error("relay address rejected: {0}")]
    RelayAddress(String),
    #[error("handshake timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl SocksError {
    /// True when the server sent bytes that violate the protocol, as opposed
    /// to transport failures or local misuse.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SocksError::ProtocolVersionMismatch { .. }
                | SocksError::UnsupportedMethodSelected(_)
                | SocksError::UnsupportedAddressType(_)
        )
    }

    /// The reply status carried by a rejected tunnel request.
    pub fn reply_status(&self) -> Option<ReplyStatus> {
        match self {
            SocksError::TunnelRejected(status) => Some(*status),
            _ => None,
        }
    }
}

/// A single read unit of the server's response, used to tag short reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    MethodSelection,
    Authentication,
    Reply,
    ReplyAddress,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::MethodSelection => "method selection",
            Phase::Authentication => "authentication status",
            Phase::Reply => "tunnel reply",
            Phase::ReplyAddress => "reply address",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth,
    UsernamePassword,
    Other(u8),
}

impl AuthMethod {
    pub fn as_u8(self) -> u8 {
        match self {
            AuthMethod::NoAuth => METHOD_NO_AUTH,
            AuthMethod::UsernamePassword => METHOD_USERPASS,
            AuthMethod::Other(code) => code,
        }
    }
}

impl From<u8> for AuthMethod {
    fn from(code: u8) -> Self {
        match code {
            METHOD_NO_AUTH => AuthMethod::NoAuth,
            METHOD_USERPASS => AuthMethod::UsernamePassword,
            other => AuthMethod::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelCommand {
    /// Stream connect.
    Connect,
    /// UDP relay on a separate datagram socket.
    UdpAssociate,
    /// UDP datagrams carried over the TCP control stream.
    ForwardUdp,
}

impl TunnelCommand {
    pub fn as_u8(self) -> u8 {
        match self {
            TunnelCommand::Connect => CMD_CONNECT,
            TunnelCommand::UdpAssociate => CMD_UDP_ASSOCIATE,
            TunnelCommand::ForwardUdp => CMD_FWD_UDP,
        }
    }
}

/// The `REP` field of a tunnel reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Succeeded,
    GeneralFailure,
    ConnectionNotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
    Unassigned(u8),
}

impl ReplyStatus {
    pub fn code(self) -> u8 {
        match self {
            ReplyStatus::Succeeded => 0x00,
            ReplyStatus::GeneralFailure => 0x01,
            ReplyStatus::ConnectionNotAllowed => 0x02,
            ReplyStatus::NetworkUnreachable => 0x03,
            ReplyStatus::HostUnreachable => 0x04,
            ReplyStatus::ConnectionRefused => 0x05,
            ReplyStatus::TtlExpired => 0x06,
            ReplyStatus::CommandNotSupported => 0x07,
            ReplyStatus::AddressTypeNotSupported => 0x08,
            ReplyStatus::Unassigned(code) => code,
        }
    }
}

impl From<u8> for ReplyStatus {
    fn from(code: u8) -> Self {
        match code {
            0x00 => ReplyStatus::Succeeded,
            0x01 => ReplyStatus::GeneralFailure,
            0x02 => ReplyStatus::ConnectionNotAllowed,
            0x03 => ReplyStatus::NetworkUnreachable,
            0x04 => ReplyStatus::HostUnreachable,
            0x05 => ReplyStatus::ConnectionRefused,
            0x06 => ReplyStatus::TtlExpired,
            0x07 => ReplyStatus::CommandNotSupported,
            0x08 => ReplyStatus::AddressTypeNotSupported,
            other => ReplyStatus::Unassigned(other),
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReplyStatus::Succeeded => "succeeded",
            ReplyStatus::GeneralFailure => "general server failure",
            ReplyStatus::ConnectionNotAllowed => "connection not allowed by ruleset",
            ReplyStatus::NetworkUnreachable => "network unreachable",
            ReplyStatus::HostUnreachable => "host unreachable",
            ReplyStatus::ConnectionRefused => "connection refused",
            ReplyStatus::TtlExpired => "TTL expired",
            ReplyStatus::CommandNotSupported => "command not supported",
            ReplyStatus::AddressTypeNotSupported => "address type not supported",
            ReplyStatus::Unassigned(_) => "unassigned status",
        };
        write!(f, "{} ({:#04x})", text, self.code())
    }
}

/// Username/password pair for the RFC 1929 sub-negotiation.
///
/// Both fields are always present; a session without credentials holds
/// `None` instead. Each field is limited to 255 bytes because its length is
/// sent as a single byte.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl Credentials {
    pub fn new(
        username: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> Result<Self, SocksError> {
        let username = username.into();
        let password = password.into();
        if username.len() > MAX_FIELD_LEN {
            return Err(SocksError::CredentialTooLong {
                field: "username",
                len: username.len(),
            });
        }
        if password.len() > MAX_FIELD_LEN {
            return Err(SocksError::CredentialTooLong {
                field: "password",
                len: password.len(),
            });
        }
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &[u8] {
        &self.username
    }

    pub fn password(&self) -> &[u8] {
        &self.password
    }

    /// Size of the `{VER, ULEN, UNAME, PLEN, PASSWD}` sub-negotiation block.
    pub(crate) fn encoded_len(&self) -> usize {
        3 + self.username.len() + self.password.len()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"***")
            .finish()
    }
}

/// Version byte expected in each response phase.
pub(crate) fn expected_version(phase: Phase) -> u8 {
    match phase {
        Phase::Authentication => AUTH_VERSION,
        _ => SOCKS_VERSION,
    }
}
