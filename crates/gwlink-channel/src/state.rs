//! Connection and worker-loop state tracking.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Connection lifecycle state driven by the connector thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Operator intent: do not connect.
    Disabled,
    /// A live cycle (if any) must be torn down before reconnecting.
    Stale,
    /// Waiting for underlying link availability.
    LinkWait,
    /// Ready to attempt a connection immediately.
    Disconnected,
    /// Last attempt failed; waiting out the retry interval.
    Connecting,
    /// A connection cycle is live.
    Connected,
    /// The connector died unrecoverably.
    Exception,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChannelState::Disabled => "disabled",
            ChannelState::Stale => "stale",
            ChannelState::LinkWait => "link wait",
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Exception => "exception",
        };
        f.write_str(label)
    }
}

/// Worker-loop activity, reported alongside the connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// No cycle is live.
    Pending,
    /// Sender blocked on the queue.
    Taking,
    /// Sender writing a frame.
    Sending,
    /// Receiver blocked on the socket.
    Receiving,
    /// Receiver handing a frame up.
    Delivering,
    /// Loop exited for teardown.
    Interrupted,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoopState::Pending => "pending",
            LoopState::Taking => "taking",
            LoopState::Sending => "sending",
            LoopState::Receiving => "receiving",
            LoopState::Delivering => "delivering",
            LoopState::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

struct StateInner {
    value: ChannelState,
    /// Connection cycle counter; a failure report is honored only if
    /// its attempt matches, so each cycle triggers at most one reset.
    attempt: u64,
    intent_disabled: bool,
}

/// Shared connection state with change notification.
pub(crate) struct State {
    inner: Mutex<StateInner>,
    changed: Condvar,
}

impl State {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                value: if enabled {
                    ChannelState::Stale
                } else {
                    ChannelState::Disabled
                },
                attempt: 0,
                intent_disabled: !enabled,
            }),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn get(&self) -> ChannelState {
        self.lock().value
    }

    pub(crate) fn attempt(&self) -> u64 {
        self.lock().attempt
    }

    pub(crate) fn set(&self, value: ChannelState) {
        let mut inner = self.lock();
        // Disabled intent sticks until an explicit enable.
        if inner.intent_disabled && value != ChannelState::Disabled {
            return;
        }
        inner.value = value;
        self.changed.notify_all();
    }

    /// Force a teardown-and-reconnect, invalidating outstanding
    /// failure reports from the current cycle.
    pub(crate) fn reset(&self) {
        let mut inner = self.lock();
        if inner.intent_disabled {
            return;
        }
        inner.attempt += 1;
        inner.value = ChannelState::Stale;
        self.changed.notify_all();
    }

    /// Honor a failure report only if it belongs to the current cycle.
    pub(crate) fn failure(&self, attempt: u64) -> bool {
        let mut inner = self.lock();
        if inner.intent_disabled || attempt != inner.attempt {
            return false;
        }
        inner.attempt += 1;
        inner.value = ChannelState::Stale;
        self.changed.notify_all();
        true
    }

    pub(crate) fn request_disable(&self) {
        let mut inner = self.lock();
        inner.intent_disabled = true;
        inner.attempt += 1;
        inner.value = ChannelState::Disabled;
        self.changed.notify_all();
    }

    /// Clear disabled intent; returns false if the channel was not
    /// disabled.
    pub(crate) fn request_enable(&self) -> bool {
        let mut inner = self.lock();
        if !inner.intent_disabled {
            return false;
        }
        inner.intent_disabled = false;
        inner.attempt += 1;
        inner.value = ChannelState::Stale;
        self.changed.notify_all();
        true
    }

    pub(crate) fn is_disabled_intent(&self) -> bool {
        self.lock().intent_disabled
    }

    /// Alert other threads that link availability may have changed.
    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }

    /// Wait up to `timeout` for any state change; returns the state
    /// observed on wake.
    pub(crate) fn wait_for_change(&self, timeout: Duration) -> ChannelState {
        let inner = self.lock();
        match self.changed.wait_timeout(inner, timeout) {
            Ok((guard, _)) => guard.value,
            Err(poisoned) => poisoned.into_inner().0.value,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
