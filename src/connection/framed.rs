// src/connection/framed.rs

//! A framed TCP connection split into a reading half, owned by the dispatcher,
//! and a writer task fed through a FIFO.
//!
//! The FIFO is the connection's sequencer: text replies, file transfers and the
//! final close are queued in submission order and executed one at a time by the
//! writer task, so a connection's writes and its close never interleave even
//! though every connection shares the same runtime threads.

use crate::core::AccessError;
use crate::core::protocol::{WireCodec, WireFrame};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identifier of a connection within one listener. Allocated monotonically.
pub type ConnectionId = u32;

/// Size of each raw chunk of a streamed file.
pub const FILE_CHUNK_SIZE: usize = 16 * 1024;

/// Notifications posted from a connection back to its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The writer task finished and the socket is shut down.
    Closed(ConnectionId),
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    File(PathBuf),
    Close,
}

/// A cloneable, non-owning handle to a connection.
///
/// Every operation re-checks liveness; using a handle after the connection has
/// closed returns `AccessError::ConnectionClosed` instead of touching the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Queues one text frame.
    pub fn write(&self, text: impl Into<String>) -> Result<(), AccessError> {
        self.enqueue(Outbound::Text(text.into()))
    }

    /// Queues a file transfer: a header frame followed by the raw bytes.
    pub fn write_file(&self, path: impl Into<PathBuf>) -> Result<(), AccessError> {
        self.enqueue(Outbound::File(path.into()))
    }

    fn enqueue(&self, item: Outbound) -> Result<(), AccessError> {
        if !self.is_alive() {
            return Err(AccessError::ConnectionClosed);
        }
        self.tx.send(item).map_err(|_| AccessError::ConnectionClosed)
    }

    /// Closes the connection. Frames queued before the call are still flushed.
    /// Only the first call has any effect.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            debug!("Closing connection {} ({})", self.id, self.peer);
            self.cancel.cancel();
            // The writer may already be gone after a write failure.
            let _ = self.tx.send(Outbound::Close);
        }
    }
}

/// The reading side of a connection, driven by exactly one dispatcher task.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    reader: FramedRead<OwnedReadHalf, WireCodec>,
}

impl Connection {
    /// Splits `stream` into a `Connection` and the `ConnectionWriter` that must
    /// be spawned to service it. `events` receives `Closed(id)` once the writer ends.
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        max_frame_length: usize,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> (Self, ConnectionWriter) {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let handle = ConnectionHandle {
            id,
            peer,
            alive: alive.clone(),
            cancel: cancel.clone(),
            tx,
        };
        let writer = ConnectionWriter {
            id,
            sink: FramedWrite::new(write_half, WireCodec::new(max_frame_length)),
            rx,
            alive,
            cancel,
            events,
        };
        let connection = Self {
            handle,
            reader: FramedRead::new(read_half, WireCodec::new(max_frame_length)),
        };
        (connection, writer)
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    /// Reads the next inbound frame. Returns `ConnectionClosed` on EOF or once
    /// the connection has been closed from either side.
    pub async fn read_frame(&mut self) -> Result<String, AccessError> {
        if !self.handle.is_alive() {
            return Err(AccessError::ConnectionClosed);
        }
        tokio::select! {
            biased;
            _ = self.handle.cancel.cancelled() => Err(AccessError::ConnectionClosed),
            frame = self.reader.next() => match frame {
                Some(Ok(frame)) => Ok(frame),
                Some(Err(e)) => Err(e),
                None => Err(AccessError::ConnectionClosed),
            },
        }
    }

    pub fn write(&self, text: impl Into<String>) -> Result<(), AccessError> {
        self.handle.write(text)
    }

    pub fn close(&self) {
        self.handle.close()
    }
}

/// Executes queued writes for one connection, in order, then shuts the socket.
#[derive(Debug)]
pub struct ConnectionWriter {
    id: ConnectionId,
    sink: FramedWrite<OwnedWriteHalf, WireCodec>,
    rx: mpsc::UnboundedReceiver<Outbound>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionWriter {
    pub async fn run(mut self) {
        while let Some(item) = self.rx.recv().await {
            let result = match item {
                Outbound::Text(text) => self.sink.send(WireFrame::Text(text)).await,
                Outbound::File(path) => self.send_file(&path).await,
                Outbound::Close => break,
            };
            if let Err(e) = result {
                if e.is_normal_disconnect() {
                    debug!("Connection {} went away during write: {}", self.id, e);
                } else {
                    warn!("Write failed on connection {}: {}", self.id, e);
                }
                break;
            }
        }

        // Covers exits that did not go through `ConnectionHandle::close`.
        self.alive.store(false, Ordering::Release);
        self.cancel.cancel();
        self.rx.close();

        if let Err(e) = self.sink.get_mut().shutdown().await {
            debug!("Socket shutdown for connection {} failed: {}", self.id, e);
        }
        let _ = self.events.send(ConnectionEvent::Closed(self.id));
    }

    /// Sends the header frame, then streams the file in fixed-size chunks, each
    /// written only after the previous one completes.
    async fn send_file(&mut self, path: &Path) -> Result<(), AccessError> {
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.sink.send(WireFrame::FileHeader { name, size }).await?;

        let mut buf = vec![0u8; FILE_CHUNK_SIZE];
        let mut remaining = size;
        while remaining > 0 {
            let want = remaining.min(FILE_CHUNK_SIZE as u64) as usize;
            let n = file.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("{} was truncated during transfer", path.display()),
                )
                .into());
            }
            self.sink.get_mut().write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }
        self.sink.get_mut().flush().await?;
        debug!("Sent {} ({} bytes) on connection {}", path.display(), size, self.id);
        Ok(())
    }
}
