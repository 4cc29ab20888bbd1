use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::socks5::{Phase, SocksError};

/// Byte stream a handshake can run over: a TCP stream, a TLS stream, an
/// in-memory duplex in tests.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin {}
impl<T: AsyncRead + AsyncWrite + Unpin> IoStream for T {}

/// Check if an error represents the peer closing the connection.
pub fn is_expected_close_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

/// Fill `buf` completely or fail. EOF before the buffer is full is reported
/// as a short read of `phase`.
pub async fn read_exact_phase<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    phase: Phase,
) -> Result<(), SocksError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SocksError::ShortRead(phase)),
        Err(e) => Err(SocksError::Io(e)),
    }
}

/// Write the whole frame and flush. Partial writes are resumed until the
/// frame is out; a write that makes no progress is a short write.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> Result<(), SocksError> {
    match writer.write_all(frame).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::WriteZero => return Err(SocksError::ShortWrite),
        Err(e) => return Err(SocksError::Io(e)),
    }
    writer.flush().await?;
    Ok(())
}
