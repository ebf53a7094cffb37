//! Gateway link channels.
//!
//! gwlink moves opaque payloads between a device and a gateway over
//! unreliable links: checksummed length-delimited framing, a
//! priority send queue gated on authorization, and a per-channel
//! connection state machine with dedicated sender/receiver threads.
//!
//! # Crate Structure
//!
//! - [`transport`] — Connect-capable byte transports (TCP, UDP multicast)
//! - [`frame`] — Double-CRC32 framing with stream resynchronization
//! - [`channel`] — Connection supervision, send queue, authorization

/// Re-export transport types.
pub mod transport {
    pub use gwlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use gwlink_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use gwlink_channel::*;
}
