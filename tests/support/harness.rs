//! Scripted SOCKS5 server for integration tests.
//!
//! Each accepted connection reads exactly the number of bytes the client is
//! expected to pipeline, records them, writes the canned reply and then
//! follows the configured [`AfterReply`] behaviour. Because the reply is only
//! sent once the whole request has arrived, a client that waits for the
//! method selection before sending the rest of its frame stalls.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the server does once the reply has been written.
#[derive(Clone, Copy, Debug)]
pub enum AfterReply {
    /// Echo tunnel data until the client closes.
    Echo,
    /// Keep the connection open without sending anything.
    Hold,
    /// Close the connection.
    Close,
}

#[derive(Clone, Debug)]
pub struct Script {
    pub expect_len: usize,
    pub reply: Vec<u8>,
    pub after: AfterReply,
}

impl Script {
    pub fn new(expect_len: usize, reply: impl Into<Vec<u8>>) -> Self {
        Self {
            expect_len,
            reply: reply.into(),
            after: AfterReply::Echo,
        }
    }

    pub fn then(mut self, after: AfterReply) -> Self {
        self.after = after;
        self
    }
}

/// Handle to a running scripted server. Dropping it cancels the accept loop.
pub struct ScriptedServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ScriptedServer {
    pub async fn spawn(script: Script) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            let received = received.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = listener.accept() => {
                            let Ok((stream, peer)) = result else { break };
                            debug!(%peer, "scripted server accepted");
                            tokio::spawn(serve(
                                stream,
                                script.clone(),
                                received.clone(),
                                shutdown.clone(),
                            ));
                        }
                    }
                }
            }
        });

        Ok(Self {
            addr,
            received,
            shutdown,
            task: Some(task),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Request frames received so far, one per connection.
    pub async fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().await.clone()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.shutdown.cancel();
            task.abort();
        }
    }
}

async fn serve(
    mut stream: TcpStream,
    script: Script,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    shutdown: CancellationToken,
) {
    let mut request = vec![0u8; script.expect_len];
    if stream.read_exact(&mut request).await.is_err() {
        return;
    }
    received.lock().await.push(request);

    if stream.write_all(&script.reply).await.is_err() {
        return;
    }

    match script.after {
        AfterReply::Close => {}
        AfterReply::Hold => shutdown.cancelled().await,
        AfterReply::Echo => {
            let mut buf = [0u8; 1024];
            loop {
                let n = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    n = stream.read(&mut buf) => match n {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    },
                };
                if stream.write_all(&buf[..n]).await.is_err() {
                    return;
                }
            }
        }
    }
}
