//! Outbound connection to the authorization service.
//!
//! # Responsibilities
//! - Hold the TCP stream for one authorization attempt
//! - Connect lazily on the first write, bounded by the connect timeout
//! - Close the socket when the owning context drops its handle
//!
//! # Design Decisions
//! - The context owns the only strong handle; pending operations keep a
//!   `Weak` so an operation never outlives the context that started it

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Bytes requested per read.
const READ_CHUNK: usize = 4096;

type Slot = Arc<Mutex<Option<TcpStream>>>;

/// Handle to the auth connection, owned by the context.
#[derive(Debug)]
pub struct AuthConnection {
    addr: SocketAddr,
    stream: Slot,
}

impl AuthConnection {
    pub(super) fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stream: Arc::default(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(super) fn downgrade(&self) -> StreamRef {
        StreamRef {
            addr: self.addr,
            stream: Arc::downgrade(&self.stream),
        }
    }
}

impl Drop for AuthConnection {
    fn drop(&mut self) {
        tracing::trace!(addr = %self.addr, "releasing authorization connection");
    }
}

/// Weak reference used by a pending operation.
#[derive(Debug, Clone)]
pub(super) struct StreamRef {
    addr: SocketAddr,
    stream: Weak<Mutex<Option<TcpStream>>>,
}

impl StreamRef {
    fn upgrade(&self) -> io::Result<Slot> {
        self.stream
            .upgrade()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }

    /// Write `data`, connecting first if needed.
    pub(super) async fn write(&self, data: Bytes, connect_timeout: Duration) -> io::Result<()> {
        let slot = self.upgrade()?;
        let mut guard = slot.lock().await;

        if guard.is_none() {
            let stream = match timeout(connect_timeout, TcpStream::connect(self.addr)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", self.addr),
                    ))
                }
            };
            stream.set_nodelay(true)?;
            tracing::debug!(addr = %self.addr, "connected to authorization host");
            *guard = Some(stream);
        }

        match guard.as_mut() {
            Some(stream) => stream.write_all(&data).await,
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    /// Read the next chunk. An empty chunk means end of stream.
    pub(super) async fn read(&self) -> io::Result<Bytes> {
        let slot = self.upgrade()?;
        let mut guard = slot.lock().await;
        let stream = guard.as_mut().ok_or(io::ErrorKind::NotConnected)?;

        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        stream.read_buf(&mut buf).await?;
        Ok(buf.freeze())
    }
}
