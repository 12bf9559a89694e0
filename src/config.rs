// ABOUTME: Layered configuration for FramingEngine and the server/client harnesses
// ABOUTME: Captures the differing defaults the reference driver and firmware endpoints use

use std::time::Duration;

use crate::codec::Endianness;

/// How accumulated writes are flushed to the underlying stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every field write triggers its own `send_all()`. Used by resource-poor
    /// endpoints, or where latency matters more than write-call overhead.
    /// Unsafe with more than one concurrent writer on the same engine: see
    /// [`FramingEngine::send_all`](crate::engine::FramingEngine::send_all).
    Immediate,
    /// Writes accumulate in the write buffer until an explicit `send_all()`.
    Bulk,
}

/// Per-engine configuration: wire endianness, write batching, and the
/// timeout applied to the oldest outstanding outgoing request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub endianness: Endianness,
    pub write_mode: WriteMode,
    pub request_timeout: Duration,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            endianness: Endianness::Big,
            write_mode: WriteMode::Immediate,
            request_timeout: Duration::from_millis(1000),
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Harness-level configuration for the accepting side of a connection.
///
/// Defaults mirror the reference VR driver: request timeout 500ms,
/// `Immediate` write mode (the driver process is resource-rich and trades
/// write-call overhead for lower latency), worker pool sized to hardware
/// concurrency with a floor of 4.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::new()
                .with_request_timeout(Duration::from_millis(500))
                .with_write_mode(WriteMode::Immediate),
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .max(4),
        }
    }
}

/// Harness-level configuration for the connecting side.
///
/// Defaults mirror the reference firmware: request timeout 1000ms, `Bulk`
/// write mode (the microcontroller is resource-poor and benefits from
/// batching a full packet into one write), polled at a 5ms interval.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub engine: EngineConfig,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::new()
                .with_request_timeout(Duration::from_millis(1000))
                .with_write_mode(WriteMode::Bulk),
            poll_interval: Duration::from_millis(5),
        }
    }
}
