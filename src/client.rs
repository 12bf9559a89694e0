// ABOUTME: TcpClient harness: connects to a host:port and drives one FramingEngine by polling
// ABOUTME: Mirrors the reference firmware client's dedicated poll loop over fetch_data()

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::ClientConfig;
use crate::engine::{BoxFuture, FramingEngine};
use crate::error::{MinBitError, MinBitResult};
use crate::request::Request;
use crate::schema::PacketSchema;
use crate::stream::TcpByteStream;

/// One client's engine, bound to the connected socket.
pub type Connection = Arc<FramingEngine<TcpByteStream>>;

/// Read handler installed on the harness. Receives the client's own engine
/// alongside the completed or timed-out `Request`, mirroring
/// [`crate::server::ReadHandler`] so a handler can reply without the engine
/// holding a reference back to itself.
pub type ReadHandler = Arc<dyn Fn(Connection, Arc<Request>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Connects to a single peer and drives one [`FramingEngine`] with a
/// dedicated polling task.
///
/// Unlike [`crate::server::TcpServer`], which services many connections
/// across a worker pool, a `TcpClient` owns exactly one connection and one
/// poll task, per §4.5/§5: the reference firmware client runs one I/O thread
/// ticking `fetch_data()` on a short interval, plus whatever application
/// threads submit writes via the engine directly.
pub struct TcpClient {
    name: String,
    config: ClientConfig,
    schema: StdMutex<PacketSchema>,
    read_handler: StdMutex<Option<ReadHandler>>,
    engine: AsyncMutex<Option<Connection>>,
    poll_task: AsyncMutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl TcpClient {
    pub fn new(name: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            name: name.into(),
            config,
            schema: StdMutex::new(PacketSchema::new()),
            read_handler: StdMutex::new(None),
            engine: AsyncMutex::new(None),
            poll_task: AsyncMutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the schema the engine will be constructed with. Must be called
    /// before [`Self::begin`]; a schema set afterward only takes effect on
    /// the next `begin()`/reconnect, not the live engine (use
    /// [`crate::engine::FramingEngine::set_schema`] directly for that).
    pub fn set_schema(&self, schema: PacketSchema) {
        *self.schema.lock().unwrap() = schema;
    }

    /// Installs the callback invoked once per completed or timed-out
    /// `Request` on this client's connection.
    pub fn set_read_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Connection, Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.read_handler.lock().unwrap() =
            Some(Arc::new(move |conn, req| Box::pin(handler(conn, req))));
    }

    /// Connects to `host:port`, constructs the engine, and spawns the poll
    /// task that calls `fetch_data()` every `config.poll_interval`.
    pub async fn begin(self: &Arc<Self>, host: &str, port: u16) -> MinBitResult<()> {
        let stream = TcpByteStream::connect((host, port))
            .await
            .map_err(MinBitError::Io)?;
        let schema = self.schema.lock().unwrap().clone();
        let engine = Arc::new(FramingEngine::new(stream, schema, self.config.engine.clone()));

        if let Some(handler) = self.read_handler.lock().unwrap().clone() {
            let bound_engine = engine.clone();
            engine.set_read_handler(Arc::new(move |request| {
                let handler = handler.clone();
                let bound_engine = bound_engine.clone();
                Box::pin(async move { handler(bound_engine, request).await })
            }));
        }
        *self.engine.lock().await = Some(engine);
        self.running.store(true, Ordering::SeqCst);

        info!(name = %self.name, %host, port, "client connected");

        let span = info_span!("client", name = %self.name);
        let this = self.clone();
        let handle = tokio::spawn(async move { this.poll_loop().await }.instrument(span));
        *self.poll_task.lock().await = Some(handle);
        Ok(())
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let engine = self.engine.lock().await.clone();
            let Some(engine) = engine else { break };
            match engine.fetch_data().await {
                Ok(()) => {}
                Err(MinBitError::StreamClosed) => {
                    warn!("server closed connection");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "client poll error");
                    break;
                }
            }
        }
    }

    /// Stops polling, closes the stream, and joins the poll task.
    pub async fn end(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(engine) = self.engine.lock().await.take() {
            engine.close();
        }
        if let Some(handle) = self.poll_task.lock().await.take() {
            let _ = handle.await;
        }
        info!(name = %self.name, "client stopped");
    }

    pub async fn is_open(&self) -> bool {
        match self.engine.lock().await.as_ref() {
            Some(engine) => engine.is_open(),
            None => false,
        }
    }

    /// The engine bound to the current connection, if `begin()` has been
    /// called and not yet `end()`ed.
    pub async fn protocol(&self) -> Option<Connection> {
        self.engine.lock().await.clone()
    }
}
