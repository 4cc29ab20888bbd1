use tokio::io::AsyncRead;
use tracing::{debug, trace};

use super::{
    expected_version, reply_body_len, Address, AuthMethod, Phase, ReplyStatus, SocksError,
};
use crate::io::read_exact_phase;
use crate::protocol::{
    AUTH_REPLY_LEN, AUTH_SUCCESS, METHOD_REPLY_LEN, REPLY_HEADER_LEN, REPLY_SUCCESS,
};

/// Reads the server's side of a pipelined handshake.
///
/// The phases must be consumed in order: method selection, the credential
/// status when `UsernamePassword` was selected, the reply header, then the
/// bound address. Every read is exact; nothing past the bound address is
/// consumed, so the stream can carry tunnel data afterwards.
pub struct ReplyParser<'a, R> {
    reader: &'a mut R,
    offered: AuthMethod,
    bytes_read: usize,
}

impl<'a, R: AsyncRead + Unpin> ReplyParser<'a, R> {
    /// `offered` is the one method advertised in the greeting.
    pub fn new(reader: &'a mut R, offered: AuthMethod) -> Self {
        Self {
            reader,
            offered,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Run every phase and return the bound relay address.
    pub async fn parse(mut self) -> Result<Address, SocksError> {
        if self.read_method_selection().await? == AuthMethod::UsernamePassword {
            self.read_auth_status().await?;
        }
        let atype = self.read_reply_header().await?;
        self.read_reply_address(atype).await
    }

    /// `{VER, METHOD}`. The server must pick the method that was offered.
    pub async fn read_method_selection(&mut self) -> Result<AuthMethod, SocksError> {
        let mut buf = [0u8; METHOD_REPLY_LEN];
        self.read(&mut buf, Phase::MethodSelection).await?;
        check_version(Phase::MethodSelection, buf[0])?;

        let selected = AuthMethod::from(buf[1]);
        if selected != self.offered {
            return Err(SocksError::UnsupportedMethodSelected(buf[1]));
        }
        debug!(method = ?selected, "socks5 method selected");
        Ok(selected)
    }

    /// `{VER, STATUS}` of the username/password sub-negotiation.
    pub async fn read_auth_status(&mut self) -> Result<(), SocksError> {
        let mut buf = [0u8; AUTH_REPLY_LEN];
        self.read(&mut buf, Phase::Authentication).await?;
        check_version(Phase::Authentication, buf[0])?;

        if buf[1] != AUTH_SUCCESS {
            return Err(SocksError::AuthenticationRejected(buf[1]));
        }
        debug!("socks5 authentication accepted");
        Ok(())
    }

    /// `{VER, REP, RSV, ATYP}`. Returns the address type of the bound address.
    pub async fn read_reply_header(&mut self) -> Result<u8, SocksError> {
        let mut buf = [0u8; REPLY_HEADER_LEN];
        self.read(&mut buf, Phase::Reply).await?;
        trace!(target: "socks5_tunnel::wire_dump", direction = "rx", hex = %hex::encode(buf));
        check_version(Phase::Reply, buf[0])?;

        if buf[1] != REPLY_SUCCESS {
            return Err(SocksError::TunnelRejected(ReplyStatus::from(buf[1])));
        }
        Ok(buf[3])
    }

    /// `{ADDR, PORT}` for an IPv4 or IPv6 bound address.
    pub async fn read_reply_address(&mut self, atype: u8) -> Result<Address, SocksError> {
        let len = reply_body_len(atype)?;
        let mut buf = [0u8; 18];
        let body = &mut buf[..len];
        self.read(body, Phase::ReplyAddress).await?;
        let addr = Address::decode_reply(atype, body)?;
        debug!(relay = %addr, "socks5 reply address");
        Ok(addr)
    }

    async fn read(&mut self, buf: &mut [u8], phase: Phase) -> Result<(), SocksError> {
        read_exact_phase(&mut *self.reader, buf, phase).await?;
        self.bytes_read += buf.len();
        Ok(())
    }
}

fn check_version(phase: Phase, actual: u8) -> Result<(), SocksError> {
    let expected = expected_version(phase);
    if actual != expected {
        return Err(SocksError::ProtocolVersionMismatch { expected, actual });
    }
    Ok(())
}
