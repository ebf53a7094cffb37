//! Tunable timings and limits for a channel.

use std::time::Duration;

use gwlink_frame::DEFAULT_MAX_PAYLOAD;

/// Channel timing and sizing knobs. `Default` carries the production
/// values; tests shrink the intervals.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Socket read timeout; bounds how long the receiver defers a
    /// cancellation check.
    pub read_timeout: Duration,
    /// Wait between failed connection attempts.
    pub retry_interval: Duration,
    /// Idle wait used by the connector when watching for state changes.
    pub burp_interval: Duration,
    /// Watchdog: tear the connection down if no frame arrives for this
    /// long. Only applied on transports that detect flat-lines.
    pub flat_line_after: Duration,
    /// Heartbeat cadence while connected; `None` disables heartbeats.
    pub heartbeat_interval: Option<Duration>,
    /// Bounded capacity of the main send lane.
    pub queue_capacity: usize,
    /// How long `send_request` may wait for queue space before `Busy`.
    pub enqueue_timeout: Duration,
    /// Largest accepted payload, inbound and outbound.
    pub max_payload_size: usize,
    /// Whether the channel starts enabled.
    pub enabled: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            retry_interval: Duration::from_secs(20),
            burp_interval: Duration::from_secs(5),
            flat_line_after: Duration::from_secs(20),
            heartbeat_interval: Some(Duration::from_secs(10)),
            queue_capacity: 20,
            enqueue_timeout: Duration::from_secs(1),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            enabled: true,
        }
    }
}
