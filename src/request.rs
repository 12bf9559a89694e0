// ABOUTME: Request lifecycle record for one framed exchange, shared between engine and handler
// ABOUTME: Status advances monotonically Waiting -> Characterized -> (Complete | TimedOut)

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;

static NEXT_ID: AtomicI64 = AtomicI64::new(1);

/// Direction of a [`Request`] relative to this endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Initiated by the peer.
    Incoming,
    /// Initiated by this endpoint, awaiting a response.
    Outgoing,
}

/// Lifecycle status of a [`Request`].
///
/// Advances one-way: `Waiting < Characterized < (Complete | TimedOut)`.
/// `Complete` and `TimedOut` are both terminal; neither transitions to the
/// other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Waiting,
    Characterized,
    Complete,
    TimedOut,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Complete | Status::TimedOut)
    }
}

#[derive(Debug)]
struct Mutable {
    status: Status,
    response_header: u8,
    expected_length: i16,
    payload_length: usize,
    total_packet_length: usize,
    sent_time: Option<Instant>,
}

/// A single framed exchange: one header byte's worth of request/response
/// bookkeeping, tracked from the moment a header is sent or observed through
/// to completion or timeout.
///
/// `id`, `header`, and `direction` are immutable for the life of the
/// request. Everything else lives behind its own mutex so a handler can
/// inspect or wait on a request without contending with the engine's own
/// lock.
#[derive(Debug)]
pub struct Request {
    id: i64,
    header: u8,
    direction: Direction,
    inner: Mutex<Mutable>,
}

impl Request {
    pub(crate) fn new(header: u8, direction: Direction) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            header,
            direction,
            inner: Mutex::new(Mutable {
                status: Status::Waiting,
                response_header: 0,
                expected_length: -1,
                payload_length: 0,
                total_packet_length: 0,
                sent_time: None,
            }),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn header(&self) -> u8 {
        self.header
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction == Direction::Outgoing
    }

    pub fn status(&self) -> Status {
        self.inner.lock().unwrap().status
    }

    pub fn response_header(&self) -> u8 {
        self.inner.lock().unwrap().response_header
    }

    pub fn expected_length(&self) -> i16 {
        self.inner.lock().unwrap().expected_length
    }

    pub fn payload_length(&self) -> usize {
        self.inner.lock().unwrap().payload_length
    }

    pub fn total_packet_length(&self) -> usize {
        self.inner.lock().unwrap().total_packet_length
    }

    pub fn sent_time(&self) -> Option<Instant> {
        self.inner.lock().unwrap().sent_time
    }

    /// Records `sent_time = now`. Called exactly once, when an outgoing
    /// request is promoted from `unsent_requests` to `outgoing_requests`.
    pub(crate) fn start(&self) {
        self.inner.lock().unwrap().sent_time = Some(Instant::now());
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.inner.lock().unwrap().status = status;
    }

    pub(crate) fn set_response_header(&self, header: u8) {
        self.inner.lock().unwrap().response_header = header;
    }

    pub(crate) fn set_expected_length(&self, length: i16) {
        self.inner.lock().unwrap().expected_length = length;
    }

    pub(crate) fn set_packet_parameters(&self, payload_length: usize, total_packet_length: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.payload_length = payload_length;
        inner.total_packet_length = total_packet_length;
    }

    /// Blocks (asynchronously) until this request reaches a terminal status,
    /// polling every `poll_interval`. No signaling is required: terminal
    /// transitions are one-way, so a poll can never miss one permanently.
    pub async fn wait(&self, poll_interval: Duration) -> Status {
        loop {
            let status = self.status();
            if status.is_terminal() {
                return status;
            }
            sleep(poll_interval).await;
        }
    }

    /// [`Request::wait`] with the contract's default 5ms poll interval.
    pub async fn wait_default(&self) -> Status {
        self.wait(Duration::from_millis(5)).await
    }
}
