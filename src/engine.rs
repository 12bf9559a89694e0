// ABOUTME: FramingEngine, the inbound/outbound state machine at the heart of MinBiT
// ABOUTME: Characterizes inbound packets against a schema, pairs responses to outgoing requests, times out stale ones

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

use crate::codec::{self, Endianness, Quat, Vec3};
use crate::config::{EngineConfig, WriteMode};
use crate::error::{MinBitError, MinBitResult};
use crate::request::{Direction, Request, Status};
use crate::schema::PacketSchema;
use crate::stream::ByteStream;

/// A boxed, `'static` future, used so the read handler can be an arbitrary
/// async closure without making [`FramingEngine`] generic over it.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked once per completed or timed-out [`Request`].
///
/// Installed with [`FramingEngine::set_read_handler`]. Invoked with the
/// engine's mutex released, so the handler may call back into the engine
/// (e.g. to read payload bytes, or to `write_request` a reply) without
/// deadlocking.
pub type ReadHandler = Arc<dyn Fn(Arc<Request>) -> BoxFuture<'static, ()> + Send + Sync>;

struct EngineState {
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    unsent_requests: VecDeque<Arc<Request>>,
    outgoing_requests: VecDeque<Arc<Request>>,
    current_request: Option<Arc<Request>>,
    reserved_bytes: usize,
}

impl EngineState {
    fn new() -> Self {
        Self {
            read_buffer: BytesMut::with_capacity(4096),
            write_buffer: BytesMut::with_capacity(256),
            unsent_requests: VecDeque::new(),
            outgoing_requests: VecDeque::new(),
            current_request: None,
            reserved_bytes: 0,
        }
    }

    /// Flushing is always total: any partially-parsed bytes at the head of
    /// `read_buffer` can no longer be trusted once we give up on the current
    /// header, so `reserved_bytes` must fall back to zero with it (see
    /// invariant 4: `reserved_bytes > 0` implies a live, terminal-dispatch
    /// current request, which a flush just destroyed).
    fn flush(&mut self) {
        self.read_buffer.clear();
        self.reserved_bytes = 0;
    }
}

/// Outcome of one `characterize_packet` attempt.
enum Characterize {
    /// Not enough data yet, or nothing left to do this cycle.
    NeedMoreData,
    /// A request reached `Complete` and is ready for handler dispatch.
    Completed(Arc<Request>),
}

/// The core MinBiT state machine, bound to one duplex [`ByteStream`].
///
/// One `FramingEngine` per connection. All mutable framing state lives
/// behind a single `tokio::sync::Mutex`; each [`Request`] additionally owns
/// its own mutex for the fields a handler inspects, so a handler can read a
/// request's status without contending with the engine's lock.
pub struct FramingEngine<S: ByteStream> {
    stream: S,
    schema: StdRwLock<Arc<PacketSchema>>,
    config: EngineConfig,
    state: Mutex<EngineState>,
    read_handler: StdMutex<Option<ReadHandler>>,
}

impl<S: ByteStream> FramingEngine<S> {
    pub fn new(stream: S, schema: PacketSchema, config: EngineConfig) -> Self {
        Self {
            stream,
            schema: StdRwLock::new(Arc::new(schema)),
            config,
            state: Mutex::new(EngineState::new()),
            read_handler: StdMutex::new(None),
        }
    }

    pub fn set_read_handler(&self, handler: ReadHandler) {
        *self.read_handler.lock().unwrap() = Some(handler);
    }

    pub fn endianness(&self) -> Endianness {
        self.config.endianness
    }

    pub fn schema(&self) -> Arc<PacketSchema> {
        self.schema.read().unwrap().clone()
    }

    /// Replaces the schema in place. Injected rather than a process-wide
    /// global (§9 design notes), and swappable post-construction so a
    /// server's `init_handler` can load a per-connection schema right after
    /// accept.
    pub fn set_schema(&self, schema: PacketSchema) {
        *self.schema.write().unwrap() = Arc::new(schema);
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    /// The underlying stream, for tests that need to read what a peer engine
    /// wrote without a full harness in between.
    pub(crate) fn stream(&self) -> &S {
        &self.stream
    }

    pub fn close(&self) {
        self.stream.close();
    }

    pub async fn reserved_bytes(&self) -> usize {
        self.state.lock().await.reserved_bytes
    }

    pub async fn read_buffer_len(&self) -> usize {
        self.state.lock().await.read_buffer.len()
    }

    pub async fn write_buffer_len(&self) -> usize {
        self.state.lock().await.write_buffer.len()
    }

    pub async fn num_outgoing_requests(&self) -> usize {
        self.state.lock().await.outgoing_requests.len()
    }

    // ---- outbound path (§4.3) ----

    /// Constructs an Outgoing [`Request`], enqueues it, and writes its header
    /// byte into the write buffer. Under `WriteMode::Immediate`, flushes
    /// immediately.
    pub async fn write_request(&self, header: u8) -> MinBitResult<Arc<Request>> {
        let request = Arc::new(Request::new(header, Direction::Outgoing));
        {
            let mut state = self.state.lock().await;
            state.unsent_requests.push_back(request.clone());
            state.write_buffer.extend_from_slice(&[header]);
        }
        if self.config.write_mode == WriteMode::Immediate {
            self.send_all().await?;
        }
        Ok(request)
    }

    pub async fn write_byte(&self, value: u8) -> MinBitResult<()> {
        self.append(move |buf| codec::encode_u8(buf, value)).await
    }

    pub async fn write_bytes(&self, bytes: &[u8]) -> MinBitResult<()> {
        let owned = bytes.to_vec();
        self.append(move |buf| buf.extend_from_slice(&owned)).await
    }

    pub async fn write_i16(&self, value: i16) -> MinBitResult<()> {
        let endianness = self.config.endianness;
        self.append(move |buf| codec::encode_i16(buf, value, endianness))
            .await
    }

    pub async fn write_f32(&self, value: f32) -> MinBitResult<()> {
        let endianness = self.config.endianness;
        self.append(move |buf| codec::encode_f32(buf, value, endianness))
            .await
    }

    pub async fn write_u64(&self, value: u64) -> MinBitResult<()> {
        let endianness = self.config.endianness;
        self.append(move |buf| codec::encode_u64(buf, value, endianness))
            .await
    }

    pub async fn write_vec3(&self, value: Vec3) -> MinBitResult<()> {
        let endianness = self.config.endianness;
        self.append(move |buf| codec::encode_vec3(buf, value, endianness))
            .await
    }

    pub async fn write_quat(&self, value: Quat) -> MinBitResult<()> {
        let endianness = self.config.endianness;
        self.append(move |buf| codec::encode_quat(buf, value, endianness))
            .await
    }

    async fn append(&self, f: impl FnOnce(&mut BytesMut)) -> MinBitResult<()> {
        {
            let mut state = self.state.lock().await;
            f(&mut state.write_buffer);
        }
        if self.config.write_mode == WriteMode::Immediate {
            self.send_all().await?;
        }
        Ok(())
    }

    /// Drains `unsent_requests` into `outgoing_requests` (starting each
    /// one's timeout clock), then flushes the entire write buffer to the
    /// stream in a single call. The two steps happen under the same lock
    /// acquisition as the buffer swap, so the promotion is atomic with
    /// respect to any concurrent `characterize_packet` run; only the actual
    /// stream write happens outside the lock.
    ///
    /// `WriteMode::Immediate` calls this after every field write, which is
    /// safe with a single writer but can reorder field writes across
    /// concurrent callers on the same engine; it is retained for
    /// compatibility with resource-poor endpoints and should not be used
    /// with concurrent writers (see design notes).
    pub async fn send_all(&self) -> MinBitResult<()> {
        let to_write = {
            let mut state = self.state.lock().await;
            while let Some(request) = state.unsent_requests.pop_front() {
                request.start();
                state.outgoing_requests.push_back(request);
            }
            if state.write_buffer.is_empty() {
                return Ok(());
            }
            state.write_buffer.split().freeze()
        };
        self.stream.write(to_write).await.map_err(|e| {
            error!(error = %e, "send_all: write failed");
            MinBitError::Io(e)
        })
    }

    // ---- inbound path (§4.4) ----

    /// Appends freshly-arrived bytes to the read buffer, then runs
    /// `characterize_packet` to exhaustion, dispatching each completed
    /// request to the read handler as it commits. Finally checks the oldest
    /// outgoing request for a timeout. Characterization always runs before
    /// the timeout check within one cycle, so a response whose last byte
    /// arrives in the same cycle as its deadline wins the race
    /// deterministically (§8 boundary behavior).
    pub async fn on_bytes_received(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            let mut state = self.state.lock().await;
            state.read_buffer.extend_from_slice(bytes);
        }

        loop {
            let outcome = {
                let mut state = self.state.lock().await;
                self.characterize_packet(&mut state)
            };
            match outcome {
                Characterize::Completed(request) => {
                    self.dispatch(request).await;
                    let mut state = self.state.lock().await;
                    Self::clear_request(&mut state);
                }
                Characterize::NeedMoreData => break,
            }
        }

        self.check_for_timeouts().await;
    }

    /// Reads whatever is currently available from the stream and feeds it
    /// through [`Self::on_bytes_received`]. Runs the timeout check even when
    /// nothing new arrived, so a silent peer still produces a timely
    /// `TimedOut` dispatch (S4). Used by the client harness's poll loop.
    pub async fn fetch_data(&self) -> MinBitResult<()> {
        if !self.stream.is_open() {
            return Err(MinBitError::StreamClosed);
        }
        let bytes = self.stream.read_available().await?;
        if bytes.is_empty() {
            if !self.stream.is_open() {
                return Err(MinBitError::StreamClosed);
            }
            self.check_for_timeouts().await;
        } else {
            self.on_bytes_received(&bytes).await;
        }
        Ok(())
    }

    fn characterize_packet(&self, state: &mut EngineState) -> Characterize {
        // 1. Guard: the previous payload hasn't been fully consumed yet.
        if state.reserved_bytes > 0 {
            return Characterize::NeedMoreData;
        }

        // 2. Hunt for a header if nothing is currently being framed.
        if state.current_request.is_none() {
            let Some(&header) = state.read_buffer.first() else {
                return Characterize::NeedMoreData;
            };

            let schema = self.schema.read().unwrap().clone();

            // Ambiguous header tie-break: incoming wins over a pending
            // outgoing response (§4.4 edge cases).
            if schema.is_incoming_header(header) {
                state.current_request = Some(Arc::new(Request::new(header, Direction::Incoming)));
            } else if let Some(front) = state.outgoing_requests.front() {
                front.set_response_header(header);
                state.current_request = Some(front.clone());
            } else {
                warn!(header, "unknown header with no pending outgoing; flushing read buffer");
                state.flush();
                return Characterize::NeedMoreData;
            }

            let request = state.current_request.as_ref().unwrap().clone();
            let expected_length = match request.direction() {
                Direction::Incoming => schema.resolve_incoming(request.header()),
                Direction::Outgoing => {
                    schema.resolve_outgoing(request.header(), request.response_header())
                }
            };
            match expected_length {
                Some(length) => request.set_expected_length(length),
                None => {
                    warn!(
                        header = request.header(),
                        direction = ?request.direction(),
                        "no schema length for characterized header; discarding and flushing"
                    );
                    state.current_request = None;
                    state.flush();
                    return Characterize::NeedMoreData;
                }
            }
        }

        let request = state.current_request.as_ref().unwrap().clone();

        // 3. Idempotent early exit: already dispatched, awaiting clear_request.
        if request.status() == Status::Complete {
            return Characterize::NeedMoreData;
        }

        // 4. Size resolution.
        if request.status() != Status::Characterized {
            let expected_length = request.expected_length();
            if expected_length >= 0 {
                let payload_length = expected_length as usize;
                request.set_packet_parameters(payload_length, 1 + payload_length);
            } else {
                if state.read_buffer.len() < 2 {
                    return Characterize::NeedMoreData;
                }
                let payload_length = state.read_buffer[1] as usize;
                request.set_packet_parameters(payload_length, 2 + payload_length);
            }
            request.set_status(Status::Characterized);
        }

        // 5. Wait for the full packet to arrive.
        if state.read_buffer.len() < request.total_packet_length() {
            return Characterize::NeedMoreData;
        }

        // 6. Commit.
        state.read_buffer.advance(1);
        if request.expected_length() == -1 {
            state.read_buffer.advance(1);
        }
        request.set_status(Status::Complete);
        state.reserved_bytes += request.payload_length();

        trace!(
            id = request.id(),
            header = request.header(),
            payload_length = request.payload_length(),
            "characterized packet"
        );

        Characterize::Completed(request)
    }

    /// Nulls `current_request` and, if it was Outgoing, pops it from the
    /// front of `outgoing_requests` (where it must be, by FIFO pairing).
    fn clear_request(state: &mut EngineState) {
        if let Some(request) = state.current_request.take() {
            if request.is_outgoing() {
                if let Some(front) = state.outgoing_requests.front() {
                    if Arc::ptr_eq(front, &request) {
                        state.outgoing_requests.pop_front();
                    }
                }
            }
        }
    }

    async fn dispatch(&self, request: Arc<Request>) {
        let handler = self.read_handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(request).await;
        } else {
            debug!(id = request.id(), "no read handler installed; dropping completed request");
        }
    }

    /// Checks only the oldest outgoing request (FIFO assumption: a blocked
    /// head implies the line is stuck, not that later requests overtook
    /// it). On timeout, flushes the read buffer wholesale: any partial bytes
    /// buffered belonged to the timed-out exchange and can't be reliably
    /// reinterpreted. This is destructive to anything else queued up behind
    /// it; retained for compatibility with the reference implementation.
    async fn check_for_timeouts(&self) {
        let timed_out = {
            let mut state = self.state.lock().await;
            let Some(front) = state.outgoing_requests.front().cloned() else {
                return;
            };
            let Some(sent_time) = front.sent_time() else {
                return;
            };
            if sent_time.elapsed() <= self.config.request_timeout {
                return;
            }

            front.set_status(Status::TimedOut);
            if let Some(current) = state.current_request.as_ref() {
                if Arc::ptr_eq(current, &front) {
                    state.current_request = None;
                }
            }
            state.outgoing_requests.pop_front();
            state.flush();
            front
        };

        error!(
            id = timed_out.id(),
            header = timed_out.header(),
            "outgoing request timed out"
        );
        self.dispatch(timed_out).await;
    }

    // ---- payload reads, available to the handler (decrement reserved_bytes) ----

    pub async fn read_bytes(&self, len: usize) -> MinBitResult<Bytes> {
        let mut state = self.state.lock().await;
        if state.read_buffer.len() < len {
            return Err(MinBitError::BufferUnderflow {
                requested: len,
                available: state.read_buffer.len(),
            });
        }
        let bytes = state.read_buffer.split_to(len).freeze();
        state.reserved_bytes = state.reserved_bytes.saturating_sub(len);
        Ok(bytes)
    }

    pub async fn read_u8(&self) -> MinBitResult<u8> {
        let bytes = self.read_bytes(1).await?;
        codec::decode_u8(&bytes)
    }

    pub async fn read_i16(&self) -> MinBitResult<i16> {
        let bytes = self.read_bytes(2).await?;
        codec::decode_i16(&bytes, self.config.endianness)
    }

    pub async fn read_f32(&self) -> MinBitResult<f32> {
        let bytes = self.read_bytes(4).await?;
        codec::decode_f32(&bytes, self.config.endianness)
    }

    pub async fn read_u64(&self) -> MinBitResult<u64> {
        let bytes = self.read_bytes(8).await?;
        codec::decode_u64(&bytes, self.config.endianness)
    }

    pub async fn read_vec3(&self) -> MinBitResult<Vec3> {
        let bytes = self.read_bytes(12).await?;
        codec::decode_vec3(&bytes, self.config.endianness)
    }

    pub async fn read_quat(&self) -> MinBitResult<Quat> {
        let bytes = self.read_bytes(16).await?;
        codec::decode_quat(&bytes, self.config.endianness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::LoopbackByteStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn engine_with_reference_schema(
        stream: LoopbackByteStream,
        config: EngineConfig,
    ) -> FramingEngine<LoopbackByteStream> {
        FramingEngine::new(stream, PacketSchema::reference_imu_schema(), config)
    }

    #[tokio::test]
    async fn fixed_length_packet_completes_after_header_and_payload() {
        let (a, b) = LoopbackByteStream::pair();
        let engine = engine_with_reference_schema(a, EngineConfig::new());

        let received: Arc<StdMutex<Vec<Arc<Request>>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        engine.set_read_handler(Arc::new(move |request| {
            let received = received_clone.clone();
            Box::pin(async move {
                received.lock().unwrap().push(request);
            })
        }));

        b.write(Bytes::from_static(&[0x01])).await.unwrap();
        let bytes = engine.stream.read_available().await.unwrap();
        engine.on_bytes_received(&bytes).await;

        let requests = received.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header(), 0x01);
        assert_eq!(requests[0].status(), Status::Complete);
        assert_eq!(requests[0].payload_length(), 0);
    }

    #[tokio::test]
    async fn variable_length_packet_resolves_payload_from_length_byte() {
        let (a, b) = LoopbackByteStream::pair();
        let schema = PacketSchema::new().with_incoming_by_request(0x10, -1);
        let engine = FramingEngine::new(a, schema, EngineConfig::new());

        let seen_len = Arc::new(AtomicUsize::new(0));
        let seen_len_clone = seen_len.clone();
        engine.set_read_handler(Arc::new(move |request| {
            let seen_len = seen_len_clone.clone();
            Box::pin(async move {
                seen_len.store(request.payload_length(), Ordering::SeqCst);
            })
        }));

        b.write(Bytes::from_static(&[0x10, 0x03, 0xAA, 0xBB, 0xCC]))
            .await
            .unwrap();
        let bytes = engine.stream.read_available().await.unwrap();
        engine.on_bytes_received(&bytes).await;

        assert_eq!(seen_len.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unknown_header_with_no_pending_outgoing_flushes_buffer() {
        let (a, _b) = LoopbackByteStream::pair();
        let engine = engine_with_reference_schema(a, EngineConfig::new());

        engine.on_bytes_received(&[0xFF, 0xFF, 0xFF]).await;
        assert_eq!(engine.read_buffer_len().await, 0);
        assert_eq!(engine.reserved_bytes().await, 0);
    }

    #[tokio::test]
    async fn reserved_bytes_block_reparsing_until_payload_is_read() {
        let (a, b) = LoopbackByteStream::pair();
        let engine = Arc::new(engine_with_reference_schema(a, EngineConfig::new()));

        let held: Arc<StdMutex<Option<Arc<Request>>>> = Arc::new(StdMutex::new(None));
        let held_clone = held.clone();
        engine.set_read_handler(Arc::new(move |request| {
            let held = held_clone.clone();
            Box::pin(async move {
                *held.lock().unwrap() = Some(request);
            })
        }));

        // IMU_STEP payload (8 bytes) followed immediately by a PING header.
        let mut packet = vec![0x03];
        packet.extend_from_slice(&1_000_000u64.to_be_bytes());
        packet.push(0x01);
        b.write(Bytes::from(packet)).await.unwrap();
        let bytes = engine.stream.read_available().await.unwrap();
        engine.on_bytes_received(&bytes).await;

        // The handler never read the step payload, so reserved_bytes still
        // guards it and the trailing PING has not been characterized yet.
        assert_eq!(engine.reserved_bytes().await, 8);
        assert_eq!(engine.read_buffer_len().await, 9); // 8 payload + 1 PING header

        engine.read_u64().await.unwrap();
        assert_eq!(engine.reserved_bytes().await, 0);

        engine.on_bytes_received(&[]).await;
        let last = held.lock().unwrap().clone().unwrap();
        assert_eq!(last.header(), 0x01);
    }

    #[tokio::test]
    async fn ambiguous_header_resolves_as_incoming() {
        let (a, b) = LoopbackByteStream::pair();
        // Schema where 0x01 is both a known incoming request and (via a
        // prior outgoing write) an awaited response header.
        let engine = engine_with_reference_schema(a, EngineConfig::new());

        let outgoing = engine.write_request(0x01).await.unwrap();
        engine.send_all().await.unwrap();
        let _ = b.read_available().await.unwrap(); // drain what we sent to ourselves' peer

        let seen_direction = Arc::new(StdMutex::new(None));
        let seen_direction_clone = seen_direction.clone();
        engine.set_read_handler(Arc::new(move |request| {
            let seen_direction = seen_direction_clone.clone();
            Box::pin(async move {
                *seen_direction.lock().unwrap() = Some(request.direction());
            })
        }));

        b.write(Bytes::from_static(&[0x01])).await.unwrap();
        let bytes = engine.stream.read_available().await.unwrap();
        engine.on_bytes_received(&bytes).await;

        assert_eq!(*seen_direction.lock().unwrap(), Some(Direction::Incoming));
        // The outgoing request is still pending: incoming won the tie-break.
        assert_eq!(outgoing.status(), Status::Waiting);
    }

    #[tokio::test]
    async fn outgoing_request_times_out_and_is_removed_from_queue() {
        let (a, _b) = LoopbackByteStream::pair();
        let config = EngineConfig::new().with_request_timeout(Duration::from_millis(20));
        let engine = engine_with_reference_schema(a, config);

        let fired = Arc::new(StdMutex::new(None));
        let fired_clone = fired.clone();
        engine.set_read_handler(Arc::new(move |request| {
            let fired = fired_clone.clone();
            Box::pin(async move {
                *fired.lock().unwrap() = Some(request);
            })
        }));

        let request = engine.write_request(0x01).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.on_bytes_received(&[]).await;

        assert_eq!(request.status(), Status::TimedOut);
        assert_eq!(engine.num_outgoing_requests().await, 0);
        let dispatched = fired.lock().unwrap().clone().unwrap();
        assert_eq!(dispatched.id(), request.id());
    }
}
