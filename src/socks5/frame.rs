use bytes::{BufMut, Bytes, BytesMut};

use super::{Address, AuthMethod, Credentials, SocksError, TunnelCommand};
use crate::protocol::{AUTH_VERSION, RESERVED, SOCKS_VERSION};

/// The pipelined client request: greeting, optional credentials and tunnel
/// request, sent to the server as one buffer.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    bytes: Bytes,
    method: AuthMethod,
    request_offset: usize,
}

impl RequestFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The single method advertised in the greeting.
    pub fn method(&self) -> AuthMethod {
        self.method
    }

    /// The tunnel request part only. Never contains credentials, so it is
    /// safe to log.
    pub fn request(&self) -> &[u8] {
        &self.bytes[self.request_offset..]
    }
}

pub fn offered_method(credentials: Option<&Credentials>) -> AuthMethod {
    match credentials {
        Some(_) => AuthMethod::UsernamePassword,
        None => AuthMethod::NoAuth,
    }
}

/// Build the outbound frame.
///
/// The credential block is appended right after the greeting without
/// waiting for the server to pick `UsernamePassword`, and the tunnel request
/// follows in the same buffer. Exactly one method is offered.
pub fn build_request_frame(
    credentials: Option<&Credentials>,
    command: TunnelCommand,
    target: &Address,
) -> Result<RequestFrame, SocksError> {
    let method = offered_method(credentials);
    let auth_len = credentials.map_or(0, Credentials::encoded_len);
    let mut buf = BytesMut::with_capacity(3 + auth_len + 3 + target.encoded_len());

    buf.put_slice(&[SOCKS_VERSION, 1, method.as_u8()]);

    if let Some(creds) = credentials {
        buf.put_u8(AUTH_VERSION);
        buf.put_u8(creds.username().len() as u8);
        buf.put_slice(creds.username());
        buf.put_u8(creds.password().len() as u8);
        buf.put_slice(creds.password());
    }

    let request_offset = buf.len();
    buf.put_slice(&[SOCKS_VERSION, command.as_u8(), RESERVED]);
    target.encode(&mut buf)?;

    Ok(RequestFrame {
        bytes: buf.freeze(),
        method,
        request_offset,
    })
}
