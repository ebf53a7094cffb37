//! Channel engine: connection lifecycle, authorization gating and the
//! priority send queue.
//!
//! A [`Channel`] owns one connector thread that drives the connection
//! state machine. Each successful connect spawns a dedicated sender
//! thread (drains the [`SendQueue`]) and receiver thread (decodes
//! frames off the wire). Either loop reports socket failures back to
//! the connector, which tears the cycle down and schedules a retry.
//!
//! Delivery of inbound frames and connectivity decisions are delegated
//! to a [`ChannelManager`] supplied by the embedding application;
//! pre-auth traffic is routed through an [`AuthPolicy`].

pub mod auth;
pub mod cancel;
pub mod channel;
pub mod config;
pub mod control;
pub mod manager;
pub mod message;
pub mod queue;
pub mod state;

mod receiver;
mod sender;

pub use auth::{AuthEvent, AuthPolicy, GatewayAuth, NoAuth, PreAuthSender};
pub use cancel::CancelToken;
pub use channel::Channel;
pub use config::ChannelConfig;
pub use control::ControlMessage;
pub use manager::ChannelManager;
pub use message::{Disposition, OutboundMessage, SendHandler};
pub use queue::SendQueue;
pub use state::{ChannelState, LoopState};
