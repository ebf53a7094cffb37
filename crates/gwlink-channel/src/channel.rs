//! Channel handle and connector state machine.
//!
//! `Channel::spawn` starts one connector thread. The connector owns
//! the lifecycle: it tears down stale cycles, waits for link
//! availability, connects through the transport, and babysits a live
//! connection (watchdog and heartbeats). Each successful connect
//! spawns a sender and a receiver thread tied together by a
//! [`CancelToken`] and a shared one-shot failure flag.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use gwlink_frame::{priority, Frame, FrameConfig};
use gwlink_transport::{Link, Transport};
use tracing::{debug, error, info, warn};

use crate::auth::{AuthPolicy, PreAuthSender};
use crate::cancel::CancelToken;
use crate::config::ChannelConfig;
use crate::control::ControlMessage;
use crate::manager::ChannelManager;
use crate::message::{Disposition, OutboundMessage, SendHandler};
use crate::queue::SendQueue;
use crate::state::{ChannelState, LoopState, State};
use crate::{receiver, sender};

/// Live resources for one connection cycle.
struct Cycle {
    link: Link,
    cancel: CancelToken,
    sender: JoinHandle<()>,
    receiver: JoinHandle<()>,
    attempt: u64,
}

pub(crate) struct Shared {
    name: String,
    transport: Arc<dyn Transport>,
    manager: Arc<dyn ChannelManager>,
    auth: Arc<dyn AuthPolicy>,
    config: ChannelConfig,
    state: State,
    pub(crate) queue: SendQueue,
    authorized: AtomicBool,
    shutdown: AtomicBool,
    sender_state: Mutex<LoopState>,
    receiver_state: Mutex<LoopState>,
    last_good_read: Mutex<Instant>,
    next_heartbeat: Mutex<Instant>,
    heartbeat_seq: AtomicU64,
}

impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Report the current connection and worker-loop states upward.
    pub(crate) fn status_change(&self) {
        let connection = self.state.get();
        let sender = *lock(&self.sender_state);
        let receiver = *lock(&self.receiver_state);
        self.manager
            .status_change(&self.name, connection, sender, receiver);
    }

    pub(crate) fn set_sender_state(&self, value: LoopState) {
        *lock(&self.sender_state) = value;
        self.status_change();
    }

    pub(crate) fn set_receiver_state(&self, value: LoopState) {
        *lock(&self.receiver_state) = value;
        self.status_change();
    }

    /// Record wire liveness for the flat-line watchdog.
    pub(crate) fn touch_watchdog(&self) {
        *lock(&self.last_good_read) = Instant::now();
    }

    fn watchdog_expired(&self) -> bool {
        self.transport.detects_flat_line()
            && lock(&self.last_good_read).elapsed() > self.config.flat_line_after
    }

    /// One-shot failure report for a connection cycle. The first
    /// reporter wins and triggers a reset; later reports from the same
    /// cycle are ignored.
    pub(crate) fn fail_cycle(&self, failed: &AtomicBool, attempt: u64) {
        if failed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.state.failure(attempt) {
            info!(channel = %self.name, "connection cycle failed, scheduling reconnect");
        }
    }

    /// Open the authorization gate and notify the manager.
    pub(crate) fn authorization_granted(&self, frame: Option<&Frame>) {
        self.authorized.store(true, Ordering::SeqCst);
        self.queue.mark_authorized();
        info!(channel = %self.name, "channel authorized");
        self.manager.authorization_succeeded(&self.name, frame);
    }

    /// Route an inbound frame: to the manager once authorized, to the
    /// auth policy before that.
    pub(crate) fn handle_inbound(&self, frame: Frame, failed: &AtomicBool, attempt: u64) {
        if self.is_authorized() {
            if !self.manager.deliver(&self.name, frame) {
                warn!(channel = %self.name, "inbound frame not consumed, dropping");
            }
            return;
        }
        match self.auth.on_frame(&frame) {
            crate::auth::AuthEvent::Authorized => self.authorization_granted(Some(&frame)),
            crate::auth::AuthEvent::Failed => {
                warn!(channel = %self.name, "authorization failed, resetting connection");
                self.fail_cycle(failed, attempt);
            }
            crate::auth::AuthEvent::Pending => {}
        }
    }

    fn maybe_heartbeat(&self) {
        let Some(interval) = self.config.heartbeat_interval else {
            return;
        };
        if !self.is_authorized() {
            return;
        }
        let mut next = lock(&self.next_heartbeat);
        if Instant::now() < *next {
            return;
        }
        *next = Instant::now() + interval;
        drop(next);

        let sequence = self.heartbeat_seq.fetch_add(1, Ordering::SeqCst);
        match ControlMessage::heartbeat(sequence).to_bytes() {
            Ok(bytes) => {
                debug!(channel = %self.name, sequence, "queueing heartbeat");
                self.queue
                    .enqueue(OutboundMessage::new(bytes, priority::CTRL));
            }
            Err(err) => warn!(channel = %self.name, error = %err, "heartbeat serialization failed"),
        }
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.config.max_payload_size,
            read_timeout: Some(self.config.read_timeout),
            write_timeout: Some(self.config.read_timeout),
        }
    }

    /// Attempt one connection. On success the sender/receiver threads
    /// are running and handshake traffic (if any) is queued.
    fn connect(self: &Arc<Self>) -> Option<Cycle> {
        let link = match self.transport.connect() {
            Ok(link) => link,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "connect failed");
                return None;
            }
        };
        if let Err(err) = link.set_read_timeout(Some(self.config.read_timeout)) {
            warn!(channel = %self.name, error = %err, "could not set read timeout");
            return None;
        }
        if let Err(err) = link.set_write_timeout(Some(self.config.read_timeout)) {
            warn!(channel = %self.name, error = %err, "could not set write timeout");
            return None;
        }
        let write_link = match link.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "could not clone link");
                return None;
            }
        };
        let read_link = match link.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "could not clone link");
                return None;
            }
        };

        let cancel = CancelToken::new();
        let failed = Arc::new(AtomicBool::new(false));
        let attempt = self.state.attempt();
        self.authorized.store(false, Ordering::SeqCst);
        self.touch_watchdog();
        *lock(&self.next_heartbeat) = Instant::now();

        let sender = {
            let shared = Arc::clone(self);
            let cancel = cancel.clone();
            let failed = Arc::clone(&failed);
            thread::Builder::new()
                .name(format!("{}-sender", self.name))
                .spawn(move || sender::run(shared, write_link, cancel, failed, attempt))
        };
        let sender = match sender {
            Ok(handle) => handle,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "could not spawn sender");
                let _ = link.shutdown();
                return None;
            }
        };

        let receiver = {
            let shared = Arc::clone(self);
            let cancel = cancel.clone();
            let failed = Arc::clone(&failed);
            thread::Builder::new()
                .name(format!("{}-receiver", self.name))
                .spawn(move || receiver::run(shared, read_link, cancel, failed, attempt))
        };
        let receiver = match receiver {
            Ok(handle) => handle,
            Err(err) => {
                warn!(channel = %self.name, error = %err, "could not spawn receiver");
                cancel.cancel();
                self.queue.wake_all();
                let _ = link.shutdown();
                let _ = sender.join();
                return None;
            }
        };

        if self.auth.requires_handshake() {
            self.auth.on_connect(&PreAuthSender::new(&self.queue));
        } else {
            self.authorization_granted(None);
        }

        info!(channel = %self.name, transport = self.transport.name(), "connected");
        Some(Cycle {
            link,
            cancel,
            sender,
            receiver,
            attempt,
        })
    }

    /// Tear down a live cycle: cancel and join the workers, then close
    /// the link and reset the queue (unsent messages complete with
    /// `Pending`).
    fn teardown(&self, cycle: &mut Option<Cycle>) {
        let Some(cycle) = cycle.take() else {
            return;
        };
        debug!(channel = %self.name, attempt = cycle.attempt, "tearing down connection cycle");
        cycle.cancel.cancel();
        self.queue.wake_all();
        if cycle.sender.join().is_err() {
            error!(channel = %self.name, "sender thread panicked");
        }
        if cycle.receiver.join().is_err() {
            error!(channel = %self.name, "receiver thread panicked");
        }
        let _ = cycle.link.shutdown();
        self.queue.reset();
        self.authorized.store(false, Ordering::SeqCst);
        *lock(&self.sender_state) = LoopState::Pending;
        *lock(&self.receiver_state) = LoopState::Pending;
    }

    /// Connector state machine. Runs until shutdown or an
    /// unrecoverable error.
    fn run(self: &Arc<Self>) {
        let mut cycle: Option<Cycle> = None;
        while !self.is_shut_down() {
            match self.state.get() {
                ChannelState::Disabled => {
                    self.teardown(&mut cycle);
                    self.status_change();
                    self.state.wait_for_change(self.config.burp_interval);
                }
                ChannelState::Stale => {
                    self.teardown(&mut cycle);
                    self.status_change();
                    self.state.set(ChannelState::LinkWait);
                }
                ChannelState::LinkWait => {
                    self.status_change();
                    if self.manager.is_any_link_up() {
                        self.state.set(ChannelState::Disconnected);
                    } else {
                        self.state.wait_for_change(self.config.burp_interval);
                    }
                }
                ChannelState::Disconnected => {
                    self.status_change();
                    if !self.manager.is_any_link_up() {
                        self.state.set(ChannelState::LinkWait);
                        continue;
                    }
                    match self.connect() {
                        Some(live) => {
                            cycle = Some(live);
                            self.state.set(ChannelState::Connected);
                        }
                        None => self.state.set(ChannelState::Connecting),
                    }
                }
                ChannelState::Connecting => {
                    self.status_change();
                    self.state.wait_for_change(self.config.retry_interval);
                    if self.is_shut_down() || self.state.get() != ChannelState::Connecting {
                        continue;
                    }
                    if !self.manager.is_any_link_up() {
                        self.state.set(ChannelState::LinkWait);
                        continue;
                    }
                    if let Some(live) = self.connect() {
                        cycle = Some(live);
                        self.state.set(ChannelState::Connected);
                    }
                }
                ChannelState::Connected => {
                    self.status_change();
                    let attempt = match &cycle {
                        Some(cycle) => cycle.attempt,
                        // Connected without a cycle cannot happen from
                        // this loop; force a teardown pass.
                        None => {
                            self.state.reset();
                            continue;
                        }
                    };
                    while self.state.get() == ChannelState::Connected && !self.is_shut_down() {
                        if self.watchdog_expired() {
                            warn!(channel = %self.name, "flat line detected");
                            self.state.failure(attempt);
                            break;
                        }
                        self.maybe_heartbeat();
                        self.state.wait_for_change(self.config.burp_interval);
                    }
                }
                ChannelState::Exception => break,
            }
        }
        self.teardown(&mut cycle);
        self.queue.shutdown();
        self.status_change();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle to one gateway channel.
///
/// Dropping the handle shuts the channel down: queued messages are
/// completed with `Rejected` and all threads are joined.
pub struct Channel {
    shared: Arc<Shared>,
    connector: Option<JoinHandle<()>>,
}

impl Channel {
    /// Start a channel over `transport`, reporting to `manager` and
    /// authorizing through `auth`.
    pub fn spawn(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        manager: Arc<dyn ChannelManager>,
        auth: Arc<dyn AuthPolicy>,
        config: ChannelConfig,
    ) -> Self {
        let name = name.into();
        let queue = SendQueue::new(config.queue_capacity, config.enqueue_timeout);
        let shared = Arc::new(Shared {
            state: State::new(config.enabled),
            queue,
            name: name.clone(),
            transport,
            manager,
            auth,
            config,
            authorized: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            sender_state: Mutex::new(LoopState::Pending),
            receiver_state: Mutex::new(LoopState::Pending),
            last_good_read: Mutex::new(Instant::now()),
            next_heartbeat: Mutex::new(Instant::now()),
            heartbeat_seq: AtomicU64::new(0),
        });

        let connector = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("{name}-connector"))
                .spawn(move || {
                    let run = panic::catch_unwind(AssertUnwindSafe(|| shared.run()));
                    if run.is_err() {
                        error!(channel = %shared.name, "connector thread panicked");
                        shared.state.set(ChannelState::Exception);
                        shared.queue.shutdown();
                        shared.status_change();
                    }
                })
        };
        let connector = match connector {
            Ok(handle) => Some(handle),
            Err(err) => {
                // Without a connector the channel can only refuse work.
                error!(channel = %name, error = %err, "could not spawn connector");
                shared.state.set(ChannelState::Exception);
                shared.queue.shutdown();
                None
            }
        };

        Self { shared, connector }
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Queue `payload` for transmission. Priorities above the flash
    /// band are clamped; control-band traffic is reserved for the
    /// channel itself. The returned disposition is `Queued`, `Busy` or
    /// `Rejected`; the optional handler later reports the final
    /// outcome.
    pub fn send_request(
        &self,
        payload: impl Into<Bytes>,
        priority: u8,
        handler: Option<SendHandler>,
    ) -> Disposition {
        let priority = priority::clamp_data(priority);
        let msg = match handler {
            Some(handler) => OutboundMessage::with_handler(payload, priority, handler),
            None => OutboundMessage::new(payload, priority),
        };
        self.shared.queue.enqueue(msg)
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.get() == ChannelState::Connected
    }

    pub fn is_authorized(&self) -> bool {
        self.shared.is_authorized()
    }

    /// Messages waiting in the send queue.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Clear operator-disabled intent and start connecting.
    pub fn enable(&self) {
        if self.shared.state.request_enable() {
            info!(channel = %self.name(), "enabled");
        }
    }

    /// Stop connecting and tear down any live connection. Queued
    /// traffic drains with `Pending` on teardown.
    pub fn disable(&self) {
        info!(channel = %self.name(), "disabled");
        self.shared.state.request_disable();
    }

    /// Force a disconnect/reconnect cycle.
    pub fn reset(&self) {
        info!(channel = %self.name(), "reset requested");
        self.shared.state.reset();
    }

    /// Point the channel at a different host. Returns true and resets
    /// the connection if the endpoint actually changed.
    pub fn set_host(&self, host: &str) -> bool {
        if self.shared.transport.set_host(host) {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Point the channel at a different port. Returns true and resets
    /// the connection if the endpoint actually changed.
    pub fn set_port(&self, port: u16) -> bool {
        if self.shared.transport.set_port(port) {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Alert the connector that link availability may have changed,
    /// e.g. after the manager's `is_any_link_up` flipped.
    pub fn link_status_changed(&self) {
        self.shared.state.notify();
    }

    /// Stop the channel and join all its threads.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.state.notify();
        self.shared.queue.wake_all();
        if let Some(connector) = self.connector.take() {
            if connector.join().is_err() {
                error!(channel = %self.shared.name, "connector thread panicked");
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
