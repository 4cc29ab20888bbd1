//! Wire constants for the SOCKS5 handshake (RFC 1928 / RFC 1929).

pub const SOCKS_VERSION: u8 = 0x05;
pub const AUTH_VERSION: u8 = 0x01;

pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_USERPASS: u8 = 0x02;

pub const CMD_CONNECT: u8 = 0x01;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;
/// Non-standard command: UDP datagrams forwarded over the TCP control stream.
pub const CMD_FWD_UDP: u8 = 0x05;

pub const RESERVED: u8 = 0x00;

pub const ADDR_TYPE_IPV4: u8 = 0x01;
pub const ADDR_TYPE_DOMAIN: u8 = 0x03;
pub const ADDR_TYPE_IPV6: u8 = 0x04;

pub const REPLY_SUCCESS: u8 = 0x00;
pub const AUTH_SUCCESS: u8 = 0x00;

pub const DOMAIN_LEN_SIZE: usize = 1;
pub const IPV4_ADDR_SIZE: usize = 4;
pub const IPV6_ADDR_SIZE: usize = 16;
pub const PORT_SIZE: usize = 2;
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// `{VER, METHOD}` from the server greeting.
pub const METHOD_REPLY_LEN: usize = 2;
/// `{VER, STATUS}` from the credential sub-negotiation.
pub const AUTH_REPLY_LEN: usize = 2;
/// `{VER, REP, RSV, ATYP}` preceding the bound address.
pub const REPLY_HEADER_LEN: usize = 4;
