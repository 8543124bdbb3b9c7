//! # Packet Queue - Thread-Safe Demux-to-Decode Buffer
//!
//! This module is the hand-off point between the container read loop and
//! the decode/playback loop:
//! - Strict FIFO delivery (no reordering, no priority)
//! - Blocking and non-blocking dequeue
//! - Byte-total accounting for backpressure and diagnostics
//! - One-way stop that unblocks every waiter at once
//! - Flush for seek discontinuities and teardown
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌─────────────┐    ┌──────────┐
//! │ Demuxer  │───►│ PacketQueue │───►│ Decoder  │
//! │ Thread   │    │             │    │ Thread   │
//! └──────────┘    └─────────────┘    └──────────┘
//! ```
//!
//! The canonical shape is one producer and one consumer, but the protocol
//! is symmetric and holds for any number of either. The consumer side is
//! frequently a real-time audio callback, which is why the blocking
//! dequeue has no implicit timeout: the callback parks until data arrives
//! or the session is stopped.
//!
//! The queue is constructed explicitly and shared via [`Arc`] between the
//! producer and consumer contexts. There is no global instance; shutdown
//! from any source (signal, UI event, end of stream) funnels through
//! [`PacketQueue::stop`] on the shared handle.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::packet::Packet;

// ============================================================================
// Payload
// ============================================================================

/// Anything the queue can account for by byte length.
///
/// The queue never inspects payload contents; the length feeds the
/// `byte_total` bookkeeping used for capacity decisions and diagnostics.
pub trait Payload {
    /// Accountable size of this payload in bytes.
    fn byte_len(&self) -> usize;
}

// ============================================================================
// Errors
// ============================================================================

/// Dequeue-side errors.
///
/// An empty queue is deliberately NOT represented here: a non-blocking
/// dequeue on an empty queue is a normal negative result (`Ok(None)`),
/// not a failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has been stopped and will never yield another packet.
    /// Terminal for the consumer loop.
    #[error("packet queue stopped")]
    Stopped,
    /// Payload duplication failed while building a packet.
    #[error("packet storage allocation failed")]
    AllocationFailed,
}

/// Enqueue-side rejection. Hands the packet back to the caller: ownership
/// only transfers to the queue on a successful push.
#[derive(Debug, Error)]
pub enum PushError<T> {
    /// The queue has been stopped; the producer should exit its read loop.
    #[error("packet queue stopped")]
    Stopped(T),
    /// The configured byte capacity is exhausted (rejecting policy only).
    #[error("packet queue over byte capacity")]
    Full(T),
}

impl<T> PushError<T> {
    /// Recover the packet that was not accepted.
    pub fn into_inner(self) -> T {
        match self {
            Self::Stopped(packet) | Self::Full(packet) => packet,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// What `push` does when a packet would take `byte_total` past the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Hand the packet back immediately (`PushError::Full`).
    Reject,
    /// Park the producer until the consumer drains enough bytes.
    Block,
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Byte-total high-water mark. `None` means unbounded, which matches
    /// the classic player behavior where the read loop can outrun the
    /// decoder without limit.
    pub max_bytes: Option<usize>,
    /// Producer behavior above the high-water mark.
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_bytes: None,
            overflow: OverflowPolicy::Reject,
        }
    }
}

// ============================================================================
// Packet Queue
// ============================================================================

/// Everything the mutex guards. No field is read or written outside a
/// critical section.
struct Inner<T> {
    packets: VecDeque<T>,
    /// Always equals `packets.len()`; kept explicit so depth is an O(1)
    /// field read wherever the lock is already held.
    count: usize,
    /// Always equals the sum of queued payload lengths.
    byte_total: usize,
    /// Monotonic: once true, never false again for this instance.
    stopped: bool,

    // Lifetime counters for diagnostics.
    pushed: u64,
    popped: u64,
    flushed: u64,
    rejected: u64,
}

impl<T: Payload> Inner<T> {
    fn take_head(&mut self) -> Option<T> {
        let packet = self.packets.pop_front()?;
        self.count -= 1;
        self.byte_total -= packet.byte_len();
        self.popped += 1;
        debug_assert_eq!(self.count, self.packets.len());
        Some(packet)
    }
}

/// Thread-safe FIFO packet queue between a demux thread and a
/// decode/playback thread.
pub struct PacketQueue<T = Packet> {
    config: QueueConfig,
    inner: Mutex<Inner<T>>,
    /// Consumers park here waiting for data (or stop).
    ready: Condvar,
    /// Producers park here waiting for space (blocking overflow policy).
    space: Condvar,
}

impl<T: Payload> Default for PacketQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T: Payload> PacketQueue<T> {
    /// Create a queue with the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                packets: VecDeque::with_capacity(32),
                count: 0,
                byte_total: 0,
                stopped: false,
                pushed: 0,
                popped: 0,
                flushed: 0,
                rejected: 0,
            }),
            ready: Condvar::new(),
            space: Condvar::new(),
        }
    }

    /// Create a queue with no capacity limit.
    pub fn unbounded() -> Self {
        Self::new(QueueConfig::default())
    }

    // ========================================================================
    // Producer API (Demux Thread)
    // ========================================================================

    /// Append a packet at the tail and wake one waiting consumer.
    ///
    /// Fails with [`PushError::Stopped`] once the queue has been stopped,
    /// handing the packet back without touching any queue state. With a
    /// byte cap configured, the rejecting policy fails with
    /// [`PushError::Full`] and the blocking policy parks the producer
    /// until the consumer drains enough bytes. Unbounded queues never
    /// block the producer.
    pub fn push(&self, packet: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();

        if inner.stopped {
            return Err(PushError::Stopped(packet));
        }

        if let Some(max_bytes) = self.config.max_bytes {
            let len = packet.byte_len();
            match self.config.overflow {
                OverflowPolicy::Reject => {
                    // The cap is a high-water mark, not a hard limit: an
                    // oversize packet is still admitted when the queue is
                    // empty so the stream can always make progress.
                    if inner.count > 0 && inner.byte_total + len > max_bytes {
                        inner.rejected += 1;
                        warn!(
                            byte_total = inner.byte_total,
                            packet_len = len,
                            max_bytes,
                            "packet rejected over byte capacity"
                        );
                        return Err(PushError::Full(packet));
                    }
                }
                OverflowPolicy::Block => {
                    while inner.count > 0 && inner.byte_total + len > max_bytes {
                        self.space.wait(&mut inner);
                        if inner.stopped {
                            return Err(PushError::Stopped(packet));
                        }
                    }
                }
            }
        }

        inner.byte_total += packet.byte_len();
        inner.packets.push_back(packet);
        inner.count += 1;
        inner.pushed += 1;
        debug_assert_eq!(inner.count, inner.packets.len());

        self.ready.notify_one();
        Ok(())
    }

    // ========================================================================
    // Consumer API (Decode/Playback Thread)
    // ========================================================================

    /// Take the head packet without blocking.
    ///
    /// `Ok(None)` means the queue is currently empty; `Err(Stopped)` means
    /// it will never yield again. Stop takes priority over draining:
    /// packets still queued at stop time are not delivered, because
    /// shutdown has to be immediate for responsiveness.
    pub fn try_pop(&self) -> Result<Option<T>, QueueError> {
        let mut inner = self.inner.lock();
        if inner.stopped {
            return Err(QueueError::Stopped);
        }
        let packet = inner.take_head();
        if packet.is_some() {
            self.space.notify_one();
        }
        Ok(packet)
    }

    /// Take the head packet, parking the calling thread until one arrives
    /// or the queue is stopped.
    ///
    /// No timeout by design: real-time audio callbacks rely on indefinite
    /// blocking, with [`stop`](Self::stop) as the only cancellation.
    pub fn pop_blocking(&self) -> Result<T, QueueError> {
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped {
                return Err(QueueError::Stopped);
            }
            if let Some(packet) = inner.take_head() {
                self.space.notify_one();
                return Ok(packet);
            }
            // Releases the lock while parked, reacquires before the
            // predicate is re-checked. Spurious wakeups just loop.
            self.ready.wait(&mut inner);
        }
    }

    /// Bounded-wait variant of [`pop_blocking`](Self::pop_blocking).
    ///
    /// `Ok(None)` means the deadline elapsed on an empty queue.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<T>, QueueError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped {
                return Err(QueueError::Stopped);
            }
            if let Some(packet) = inner.take_head() {
                self.space.notify_one();
                return Ok(Some(packet));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.ready.wait_for(&mut inner, remaining);
        }
    }

    // ========================================================================
    // Control API
    // ========================================================================

    /// Stop the queue: every subsequent push is rejected and every blocked
    /// consumer and producer is woken to observe shutdown.
    ///
    /// One-way and idempotent. Broadcasts rather than signaling one
    /// waiter, since all of them need to unblock, not just the next in
    /// line.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if !inner.stopped {
            inner.stopped = true;
            debug!(
                len = inner.count,
                byte_total = inner.byte_total,
                "packet queue stopped"
            );
        }
        self.ready.notify_all();
        self.space.notify_all();
    }

    /// Discard every queued packet and reset the accounting to zero.
    ///
    /// Dropping the packets releases their buffers. Stop state is not
    /// touched; flushing is for discontinuities (seek) and teardown, not
    /// shutdown. Returns the number of packets discarded.
    pub fn flush(&self) -> usize {
        let mut inner = self.inner.lock();
        let discarded = inner.count;
        inner.packets.clear();
        inner.count = 0;
        inner.byte_total = 0;
        inner.flushed += discarded as u64;

        // Space just opened up for blocked producers.
        self.space.notify_all();

        if discarded > 0 {
            debug!(discarded, "packet queue flushed");
        }
        discarded
    }

    // ========================================================================
    // Status API
    // ========================================================================

    /// Number of packets currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().count == 0
    }

    /// Sum of queued payload lengths in bytes.
    pub fn byte_total(&self) -> usize {
        self.inner.lock().byte_total
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Consistent snapshot of depth and lifetime counters.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            len: inner.count,
            byte_total: inner.byte_total,
            stopped: inner.stopped,
            pushed: inner.pushed,
            popped: inner.popped,
            flushed: inner.flushed,
            rejected: inner.rejected,
        }
    }
}

/// Queue statistics.
///
/// `flushed` and `rejected` make data loss observable to diagnostics
/// without changing the pop contract.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub byte_total: usize,
    pub stopped: bool,
    pub pushed: u64,
    pub popped: u64,
    pub flushed: u64,
    pub rejected: u64,
}

// ============================================================================
// Packet Iterator
// ============================================================================

/// Blocking iterator over a shared queue: yields packets until the queue
/// is stopped.
pub struct PacketIter<T = Packet> {
    queue: Arc<PacketQueue<T>>,
}

impl<T: Payload> PacketIter<T> {
    pub fn new(queue: Arc<PacketQueue<T>>) -> Self {
        Self { queue }
    }
}

impl<T: Payload> Iterator for PacketIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_blocking().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
