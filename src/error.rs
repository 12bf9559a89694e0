// ABOUTME: MinBiT error types covering stream, characterization, codec and schema-load failures
// ABOUTME: Provides structured error reporting with automatic conversion from underlying I/O errors

use std::io;
use thiserror::Error;

/// Errors raised by the MinBiT framing engine, codec, and harnesses.
///
/// Only covers conditions the engine actually surfaces to a caller as a
/// `Result`. An unknown header, a missing schema length entry, and a
/// timed-out outgoing request are all real failure modes (§7), but per the
/// engine's "never abort, resync and continue" policy they're logged and
/// delivered through the read handler (the timed-out or discarded
/// `Request`'s own `status`), not returned here — see
/// `FramingEngine::characterize_packet` and `check_for_timeouts`.
#[derive(Debug, Error)]
pub enum MinBitError {
    /// I/O error from the underlying byte stream (read, write, accept, connect).
    #[error("stream I/O error: {0}")]
    Io(#[from] io::Error),

    /// A caller asked `Codec` to read more bytes than are currently reserved for it.
    #[error("buffer underflow: requested {requested} bytes, {available} available")]
    BufferUnderflow { requested: usize, available: usize },

    /// The peer's stream closed while a read or write was outstanding.
    #[error("stream closed unexpectedly")]
    StreamClosed,

    /// A schema JSON document failed to parse or validate.
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
}

/// Result type alias for MinBiT operations.
pub type MinBitResult<T> = Result<T, MinBitError>;
