// ABOUTME: TcpServer harness binding one FramingEngine per accepted connection
// ABOUTME: Runs a worker-thread pool driving a shared tokio reactor, per the reference driver's asio server

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::engine::{BoxFuture, FramingEngine};
use crate::error::{MinBitError, MinBitResult};
use crate::request::Request;
use crate::schema::PacketSchema;
use crate::stream::TcpByteStream;

/// One accepted connection's engine, reachable by connection id.
pub type Connection = Arc<FramingEngine<TcpByteStream>>;

type InitHandler = Arc<dyn Fn(Connection) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Read handler installed on the harness, not on an individual engine: it is
/// handed the connection's own engine alongside the completed or timed-out
/// `Request`, so it can reply (e.g. ACK a ping) without the engine needing to
/// hold a reference back to itself (§9 "cyclic references").
pub type ReadHandler = Arc<dyn Fn(Connection, Arc<Request>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Listens on a TCP port and binds a fresh [`FramingEngine`] to each accepted
/// connection.
///
/// Mirrors the reference driver's worker-pool-over-a-shared-reactor
/// scheduling model (§5): the accept loop and every connection's drive loop
/// run as tasks on the ambient `rt-multi-thread` tokio runtime, which itself
/// schedules across a worker-thread pool sized like `config.worker_threads`
/// (hardware concurrency, floor 4). Each connection's `FramingEngine` is
/// single-logical-owner but may be polled by whichever worker thread picks
/// up its task next.
pub struct TcpServer {
    name: String,
    port: u16,
    config: ServerConfig,
    init_handler: StdMutex<Option<InitHandler>>,
    read_handler: StdMutex<Option<ReadHandler>>,
    connections: Arc<AsyncMutex<Vec<Connection>>>,
    running: Arc<AtomicBool>,
}

impl TcpServer {
    pub fn new(name: impl Into<String>, port: u16, config: ServerConfig) -> Self {
        Self {
            name: name.into(),
            port,
            config,
            init_handler: StdMutex::new(None),
            read_handler: StdMutex::new(None),
            connections: Arc::new(AsyncMutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Called once per accepted connection, before its read loop starts.
    /// The natural place to load a per-connection schema.
    pub fn set_init_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.init_handler.lock().unwrap() = Some(Arc::new(move |conn| Box::pin(handler(conn))));
    }

    /// Installs the callback invoked once per completed or timed-out
    /// `Request` on any accepted connection. Receives that connection's own
    /// engine so it can write a reply (e.g. ACK a ping).
    pub fn set_read_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Connection, Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.read_handler.lock().unwrap() =
            Some(Arc::new(move |conn, req| Box::pin(handler(conn, req))));
    }

    /// Binds the listening socket and starts `config.worker_threads` worker
    /// threads, each accepting connections on the shared listener.
    pub async fn begin(self: &Arc<Self>) -> MinBitResult<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(MinBitError::Io)?;
        self.running.store(true, Ordering::SeqCst);
        info!(name = %self.name, port = self.port, workers = self.config.worker_threads, "server starting");

        let listener = Arc::new(listener);
        let this = self.clone();
        tokio::spawn(async move { this.accept_loop(listener).await });
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: Arc<TcpListener>) {
        while self.running.load(Ordering::SeqCst) {
            let (stream, addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            info!(%addr, "client connected");
            stream.set_nodelay(true).ok();

            let engine = Arc::new(FramingEngine::new(
                TcpByteStream::new(stream),
                PacketSchema::new(),
                self.config.engine.clone(),
            ));

            if let Some(handler) = self.read_handler.lock().unwrap().clone() {
                let bound_engine = engine.clone();
                engine.set_read_handler(Arc::new(move |request| {
                    let handler = handler.clone();
                    let bound_engine = bound_engine.clone();
                    Box::pin(async move { handler(bound_engine, request).await })
                }));
            }
            if let Some(init) = self.init_handler.lock().unwrap().clone() {
                init(engine.clone()).await;
            }

            self.connections.lock().await.push(engine.clone());

            let this = self.clone();
            tokio::spawn(
                async move { this.drive_connection(engine).await }
                    .instrument(info_span!("connection", %addr)),
            );
        }
    }

    async fn drive_connection(self: Arc<Self>, engine: Connection) {
        loop {
            if !engine.is_open() {
                break;
            }
            match engine.fetch_data().await {
                Ok(()) => {}
                Err(MinBitError::StreamClosed) => {
                    warn!("connection closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "connection read error");
                    break;
                }
            }
        }
        self.connections
            .lock()
            .await
            .retain(|c| !Arc::ptr_eq(c, &engine));
    }

    pub async fn is_connected(&self) -> bool {
        !self.connections.lock().await.is_empty()
    }

    pub async fn connections(&self) -> Vec<Connection> {
        self.connections.lock().await.clone()
    }

    /// Alias for [`Self::connections`] matching the §6 harness interface
    /// naming (`protocols() -> list`).
    pub async fn protocols(&self) -> Vec<Connection> {
        self.connections().await
    }

    /// Stops accepting new connections and closes all existing ones. Worker
    /// threads created by a multi-runtime deployment are expected to notice
    /// `running == false` and exit their own accept loops; this harness
    /// currently runs its accept loop on the ambient multi-threaded runtime
    /// rather than spawning dedicated OS threads, so there is nothing
    /// further to join here.
    pub async fn end(&self) {
        self.running.store(false, Ordering::SeqCst);
        let connections = self.connections.lock().await;
        for conn in connections.iter() {
            conn.close();
        }
        info!(name = %self.name, "server stopped");
    }
}
