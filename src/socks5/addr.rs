use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::BufMut;

use super::{Phase, SocksError};
use crate::protocol::{
    ADDR_TYPE_DOMAIN, ADDR_TYPE_IPV4, ADDR_TYPE_IPV6, DOMAIN_LEN_SIZE, IPV4_ADDR_SIZE,
    IPV6_ADDR_SIZE, MAX_FIELD_LEN, PORT_SIZE,
};

/// A SOCKS5 address: an IP endpoint or a domain name with port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl Address {
    pub fn domain(host: impl Into<String>, port: u16) -> Self {
        Address::Domain(host.into(), port)
    }

    /// `0.0.0.0:0`, used when the client has no meaningful address to request.
    pub fn unspecified() -> Self {
        Address::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }

    pub fn port(&self) -> u16 {
        match self {
            Address::Ip(addr) => addr.port(),
            Address::Domain(_, port) => *port,
        }
    }

    pub fn atype(&self) -> u8 {
        match self {
            Address::Ip(SocketAddr::V4(_)) => ADDR_TYPE_IPV4,
            Address::Ip(SocketAddr::V6(_)) => ADDR_TYPE_IPV6,
            Address::Domain(..) => ADDR_TYPE_DOMAIN,
        }
    }

    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Address::Ip(addr) => Some(*addr),
            Address::Domain(..) => None,
        }
    }

    /// Length of the wire form including the type tag: 7, 19 or 4 + name length.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Address::Ip(SocketAddr::V4(_)) => IPV4_ADDR_SIZE + PORT_SIZE,
            Address::Ip(SocketAddr::V6(_)) => IPV6_ADDR_SIZE + PORT_SIZE,
            Address::Domain(host, _) => DOMAIN_LEN_SIZE + host.len() + PORT_SIZE,
        }
    }

    /// Append `{ATYP, ADDR, PORT}` to `buf`. Nothing is written on error.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), SocksError> {
        match self {
            Address::Ip(SocketAddr::V4(addr)) => {
                buf.put_u8(ADDR_TYPE_IPV4);
                buf.put_slice(&addr.ip().octets());
            }
            Address::Ip(SocketAddr::V6(addr)) => {
                buf.put_u8(ADDR_TYPE_IPV6);
                buf.put_slice(&addr.ip().octets());
            }
            Address::Domain(host, _) => {
                if host.len() > MAX_FIELD_LEN {
                    return Err(SocksError::AddressTooLong(host.len()));
                }
                buf.put_u8(ADDR_TYPE_DOMAIN);
                buf.put_u8(host.len() as u8);
                buf.put_slice(host.as_bytes());
            }
        }
        buf.put_u16(self.port());
        Ok(())
    }

    /// Decode the bound address of a tunnel reply.
    ///
    /// `body` is everything after the 4-byte reply header. Replies only ever
    /// carry IP addresses; a domain (or any other tag) is rejected.
    pub fn decode_reply(atype: u8, body: &[u8]) -> Result<Self, SocksError> {
        let expected = reply_body_len(atype)?;
        if body.len() != expected {
            return Err(SocksError::ShortRead(Phase::ReplyAddress));
        }
        let (ip_bytes, port_bytes) = body.split_at(expected - PORT_SIZE);
        let ip = match atype {
            ADDR_TYPE_IPV4 => {
                let mut octets = [0u8; IPV4_ADDR_SIZE];
                octets.copy_from_slice(ip_bytes);
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            _ => {
                let mut octets = [0u8; IPV6_ADDR_SIZE];
                octets.copy_from_slice(ip_bytes);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
        };
        let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
        Ok(Address::Ip(SocketAddr::new(ip, port)))
    }
}

/// Number of bytes that follow the reply header for a given address type.
pub fn reply_body_len(atype: u8) -> Result<usize, SocksError> {
    match atype {
        ADDR_TYPE_IPV4 => Ok(IPV4_ADDR_SIZE + PORT_SIZE),
        ADDR_TYPE_IPV6 => Ok(IPV6_ADDR_SIZE + PORT_SIZE),
        other => Err(SocksError::UnsupportedAddressType(other)),
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Ip(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip(addr) => write!(f, "{}", addr),
            Address::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}
