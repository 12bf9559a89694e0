// ABOUTME: Capability-based duplex byte stream abstraction, not an inheritance hierarchy
// ABOUTME: Two providers: a TCP socket and an in-memory loopback pair used by tests

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

const READ_CHUNK_SIZE: usize = 4096;

/// Any duplex byte channel a [`crate::engine::FramingEngine`] can drive.
///
/// Deliberately capability-based rather than inheritance-based: a type plugs
/// in by providing these four operations, with no assumption of atomicity
/// beyond "bytes delivered in order". `read_available` may return an empty
/// vector to mean "nothing to read right now" without that implying the
/// stream is closed; callers should also check [`ByteStream::is_open`].
pub trait ByteStream: Send + Sync + 'static {
    /// Writes `bytes` to the stream, returning once the write completes.
    fn write(&self, bytes: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Returns whatever bytes are currently available, blocking until at
    /// least one byte arrives or the stream closes. An empty result paired
    /// with `is_open() == false` means the peer closed the connection.
    fn read_available(&self) -> impl Future<Output = io::Result<Vec<u8>>> + Send;

    /// Whether the stream is still expected to produce or accept bytes.
    fn is_open(&self) -> bool;

    /// Marks the stream closed. Does not guarantee in-flight I/O is aborted.
    fn close(&self);
}

/// A [`ByteStream`] backed by a real `tokio::net::TcpStream`.
///
/// The read and write halves are split so a writer and the drive loop's
/// reader never block on each other's lock.
pub struct TcpByteStream {
    read_half: AsyncMutex<OwnedReadHalf>,
    write_half: AsyncMutex<OwnedWriteHalf>,
    open: AtomicBool,
}

impl TcpByteStream {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            read_half: AsyncMutex::new(read_half),
            write_half: AsyncMutex::new(write_half),
            open: AtomicBool::new(true),
        }
    }

    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        Ok(Self::new(stream))
    }
}

impl ByteStream for TcpByteStream {
    async fn write(&self, bytes: Bytes) -> io::Result<()> {
        let mut half = self.write_half.lock().await;
        half.write_all(&bytes).await?;
        half.flush().await
    }

    async fn read_available(&self) -> io::Result<Vec<u8>> {
        let mut half = self.read_half.lock().await;
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let n = half.read(&mut buf).await?;
        if n == 0 {
            self.open.store(false, Ordering::Relaxed);
        }
        buf.truncate(n);
        Ok(buf)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

/// An in-memory duplex stream, used to drive [`crate::engine::FramingEngine`]
/// in tests without a real socket. Construct a connected pair with
/// [`LoopbackByteStream::pair`].
pub struct LoopbackByteStream {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    open: Arc<AtomicBool>,
}

impl LoopbackByteStream {
    /// Builds two ends of an in-memory duplex channel; writes on one side
    /// become available to read on the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        (
            Self {
                tx: tx_a,
                rx: AsyncMutex::new(rx_b),
                open: open.clone(),
            },
            Self {
                tx: tx_b,
                rx: AsyncMutex::new(rx_a),
                open,
            },
        )
    }
}

impl ByteStream for LoopbackByteStream {
    async fn write(&self, bytes: Bytes) -> io::Result<()> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "loopback peer closed"))
    }

    async fn read_available(&self) -> io::Result<Vec<u8>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(bytes) => Ok(bytes),
            None => {
                self.open.store(false, Ordering::Relaxed);
                Ok(Vec::new())
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}
