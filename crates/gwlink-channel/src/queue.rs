//! Authorization-gated priority send queue.
//!
//! Two lanes: a bounded priority heap for application traffic and an
//! unbounded FIFO for pre-auth handshake frames. Until the channel is
//! marked authorized, `take` serves only the auth lane; application
//! messages accumulate (or report `Busy` once the heap is full past
//! the enqueue timeout).

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::message::{Disposition, OutboundMessage};

/// Heap entry ordered by priority, then enqueue order within a band.
struct Ranked(OutboundMessage);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: higher priority first, earlier seq first within a band.
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

struct Inner {
    main: BinaryHeap<Ranked>,
    auth: VecDeque<OutboundMessage>,
    authorized: bool,
    shutdown: bool,
    next_seq: u64,
}

pub struct SendQueue {
    inner: Mutex<Inner>,
    /// Signalled when a message becomes takeable or the queue is woken.
    available: Condvar,
    /// Signalled when heap space frees up.
    space: Condvar,
    capacity: usize,
    enqueue_timeout: Duration,
}

impl SendQueue {
    pub fn new(capacity: usize, enqueue_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                main: BinaryHeap::with_capacity(capacity),
                auth: VecDeque::new(),
                authorized: false,
                shutdown: false,
                next_seq: 0,
            }),
            available: Condvar::new(),
            space: Condvar::new(),
            capacity,
            enqueue_timeout,
        }
    }

    /// Offer an application message, waiting up to the enqueue timeout
    /// for heap space. On `Busy` or `Rejected` the message's handler
    /// has already fired.
    pub fn enqueue(&self, mut msg: OutboundMessage) -> Disposition {
        let deadline = Instant::now() + self.enqueue_timeout;
        let mut inner = lock(&self.inner);
        loop {
            if inner.shutdown {
                drop(inner);
                msg.complete(Disposition::Rejected);
                return Disposition::Rejected;
            }
            if inner.main.len() < self.capacity {
                msg.seq = inner.next_seq;
                inner.next_seq += 1;
                trace!(priority = msg.priority, len = msg.payload.len(), "queued");
                inner.main.push(Ranked(msg));
                self.available.notify_one();
                return Disposition::Queued;
            }
            let now = Instant::now();
            if now >= deadline {
                drop(inner);
                debug!("send queue full past enqueue timeout");
                msg.complete(Disposition::Busy);
                return Disposition::Busy;
            }
            let (guard, _) = wait_timeout(&self.space, inner, deadline - now);
            inner = guard;
        }
    }

    /// Queue a handshake message ahead of all application traffic.
    /// The auth lane is unbounded and ignores the authorization gate.
    pub fn enqueue_auth(&self, mut msg: OutboundMessage) {
        let mut inner = lock(&self.inner);
        msg.seq = inner.next_seq;
        inner.next_seq += 1;
        inner.auth.push_back(msg);
        self.available.notify_one();
    }

    /// Block until a message is takeable, the token is cancelled or the
    /// queue shuts down. While unauthorized only the auth lane drains;
    /// once authorized only the main heap does.
    pub fn take(&self, cancel: &CancelToken) -> Option<OutboundMessage> {
        let mut inner = lock(&self.inner);
        loop {
            if inner.shutdown || cancel.is_cancelled() {
                return None;
            }
            if !inner.authorized {
                if let Some(msg) = inner.auth.pop_front() {
                    return Some(msg);
                }
            } else if let Some(Ranked(msg)) = inner.main.pop() {
                self.space.notify_one();
                return Some(msg);
            }
            // Bounded wait so a cancel that races the notify is still seen.
            let (guard, _) = wait_timeout(&self.available, inner, Duration::from_millis(250));
            inner = guard;
        }
    }

    /// Open the main heap for draining once the handshake completes.
    ///
    /// Any handshake messages still queued are abandoned: the gateway has
    /// already answered, so retransmitting them would only confuse it.
    /// Abandoned messages complete with `Pending`.
    pub fn mark_authorized(&self) {
        let abandoned = {
            let mut inner = lock(&self.inner);
            inner.authorized = true;
            inner.auth.drain(..).collect::<Vec<OutboundMessage>>()
        };
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "abandoning queued handshake traffic");
        }
        self.available.notify_all();
        for msg in abandoned {
            msg.complete(Disposition::Pending);
        }
    }

    pub fn is_authorized(&self) -> bool {
        lock(&self.inner).authorized
    }

    /// Drop the authorization gate and drain both lanes, completing
    /// every drained message with `Pending`. Called on every
    /// disconnect; the queue keeps accepting new traffic afterwards.
    pub fn reset(&self) {
        let drained = {
            let mut inner = lock(&self.inner);
            inner.authorized = false;
            let mut drained: Vec<OutboundMessage> =
                inner.main.drain().map(|Ranked(msg)| msg).collect();
            drained.extend(inner.auth.drain(..));
            drained
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "send queue reset, draining unsent");
        }
        self.space.notify_all();
        for msg in drained {
            msg.complete(Disposition::Pending);
        }
    }

    /// Final shutdown: wake blocked takers and reject all queued and
    /// future traffic.
    pub fn shutdown(&self) {
        let drained = {
            let mut inner = lock(&self.inner);
            inner.shutdown = true;
            let mut drained: Vec<OutboundMessage> =
                inner.main.drain().map(|Ranked(msg)| msg).collect();
            drained.extend(inner.auth.drain(..));
            drained
        };
        self.available.notify_all();
        self.space.notify_all();
        for msg in drained {
            msg.complete(Disposition::Rejected);
        }
    }

    /// Wake blocked takers so they re-check their cancel token.
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        let inner = lock(&self.inner);
        inner.main.len() + inner.auth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn wait_timeout<'a, T>(
    condvar: &Condvar,
    guard: std::sync::MutexGuard<'a, T>,
    timeout: Duration,
) -> (std::sync::MutexGuard<'a, T>, bool) {
    match condvar.wait_timeout(guard, timeout) {
        Ok((guard, result)) => (guard, result.timed_out()),
        Err(poisoned) => {
            let (guard, result) = poisoned.into_inner();
            (guard, result.timed_out())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn msg(tag: &'static str, priority: u8) -> OutboundMessage {
        OutboundMessage::new(Bytes::from_static(tag.as_bytes()), priority)
    }

    fn short_queue(capacity: usize) -> SendQueue {
        SendQueue::new(capacity, Duration::from_millis(50))
    }

    #[test]
    fn take_blocks_until_authorized() {
        let queue = Arc::new(short_queue(4));
        assert_eq!(queue.enqueue(msg("a", 16)), Disposition::Queued);

        let cancel = CancelToken::new();
        let taker = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            thread::spawn(move || queue.take(&cancel))
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!taker.is_finished(), "unauthorized main traffic must not drain");

        queue.mark_authorized();
        let taken = taker.join().expect("taker panicked").expect("message");
        assert_eq!(taken.payload, Bytes::from_static(b"a"));
    }

    #[test]
    fn auth_lane_bypasses_gate_and_outranks_main() {
        let queue = short_queue(4);
        queue.enqueue(msg("data", 96));
        queue.enqueue_auth(msg("hello", 127));
        let cancel = CancelToken::new();
        let first = queue.take(&cancel).expect("auth message");
        assert_eq!(first.payload, Bytes::from_static(b"hello"));
    }

    #[test]
    fn authorization_abandons_leftover_handshake_messages() {
        let queue = short_queue(4);
        let cancel = CancelToken::new();
        queue.enqueue_auth(msg("auth-1", 127));
        let abandoned = Arc::new(AtomicUsize::new(0));
        let seen = abandoned.clone();
        queue.enqueue_auth(OutboundMessage::with_handler(
            Bytes::from_static(b"auth-2"),
            127,
            Box::new(move |d| {
                assert_eq!(d, Disposition::Pending);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        let first = queue.take(&cancel).expect("handshake message");
        assert_eq!(first.payload, Bytes::from_static(b"auth-1"));

        // The gateway answered before auth-2 went out: granting
        // authorization must abandon it, not replay it later.
        queue.mark_authorized();
        assert_eq!(abandoned.load(Ordering::SeqCst), 1);
        queue.enqueue(msg("app", 16));
        let next = queue.take(&cancel).expect("application message");
        assert_eq!(next.payload, Bytes::from_static(b"app"));
        assert!(queue.is_empty());
    }

    #[test]
    fn priority_then_fifo_within_band() {
        let queue = short_queue(8);
        queue.enqueue(msg("n1", 16));
        queue.enqueue(msg("n2", 16));
        queue.enqueue(msg("flash", 96));
        queue.enqueue(msg("bg", 0));
        queue.mark_authorized();
        let cancel = CancelToken::new();
        let order: Vec<Bytes> = (0..4)
            .map(|_| queue.take(&cancel).expect("message").payload)
            .collect();
        assert_eq!(
            order,
            vec![
                Bytes::from_static(b"flash"),
                Bytes::from_static(b"n1"),
                Bytes::from_static(b"n2"),
                Bytes::from_static(b"bg"),
            ]
        );
    }

    #[test]
    fn full_queue_reports_busy_and_fires_handler() {
        let queue = short_queue(1);
        assert_eq!(queue.enqueue(msg("a", 16)), Disposition::Queued);

        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        let busy = OutboundMessage::with_handler(
            Bytes::from_static(b"b"),
            16,
            Box::new(move |d| {
                assert_eq!(d, Disposition::Busy);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(queue.enqueue(busy), Disposition::Busy);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enqueue_succeeds_when_space_frees_within_timeout() {
        let queue = Arc::new(SendQueue::new(1, Duration::from_secs(2)));
        queue.mark_authorized();
        assert_eq!(queue.enqueue(msg("a", 16)), Disposition::Queued);

        let drainer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                let cancel = CancelToken::new();
                queue.take(&cancel)
            })
        };
        assert_eq!(queue.enqueue(msg("b", 16)), Disposition::Queued);
        assert!(drainer.join().expect("drainer panicked").is_some());
    }

    #[test]
    fn reset_drains_with_pending_and_drops_authorization() {
        let queue = short_queue(4);
        queue.mark_authorized();
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        queue.enqueue(OutboundMessage::with_handler(
            Bytes::from_static(b"a"),
            16,
            Box::new(move |d| {
                assert_eq!(d, Disposition::Pending);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        queue.reset();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
        assert!(!queue.is_authorized());
    }

    #[test]
    fn shutdown_rejects_queued_and_future_traffic() {
        let queue = short_queue(4);
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        queue.enqueue(OutboundMessage::with_handler(
            Bytes::from_static(b"a"),
            16,
            Box::new(move |d| {
                assert_eq!(d, Disposition::Rejected);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        queue.shutdown();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(queue.enqueue(msg("b", 16)), Disposition::Rejected);
        let cancel = CancelToken::new();
        assert!(queue.take(&cancel).is_none());
    }

    #[test]
    fn cancelled_take_returns_none() {
        let queue = Arc::new(short_queue(4));
        let cancel = CancelToken::new();
        let taker = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            thread::spawn(move || queue.take(&cancel))
        };
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
        queue.wake_all();
        assert!(taker.join().expect("taker panicked").is_none());
    }
}
