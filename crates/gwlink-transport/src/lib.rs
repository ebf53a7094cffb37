//! Gateway transport abstraction.
//!
//! A [`Transport`] knows how to establish one connection cycle to the
//! gateway, producing a [`Link`]: the stream handle a channel's sender and
//! receiver loops read and write for the lifetime of that cycle. Every
//! transport — TCP, UDP multicast — implements only these primitives; the
//! connection engine above is transport-generic.

pub mod error;
pub mod link;
pub mod multicast;
pub mod tcp;

pub use error::{Result, TransportError};
pub use link::{Link, Transport};
pub use multicast::MulticastTransport;
pub use tcp::TcpTransport;
