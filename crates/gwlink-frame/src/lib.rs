//! Checksummed, length-delimited framing for the gateway wire protocol.
//!
//! This is the core value-add layer of gwlink. Every message is framed with:
//! - A 4-byte magic sentinel (`FE ED BE EF`) for stream resynchronization
//! - A 4-byte little-endian payload length
//! - A priority byte and three reserved bytes
//! - A CRC32 over the payload, then a CRC32 over the header itself
//!
//! The double checksum lets a receiver tell "corrupt stream, rescan for the
//! next frame start" apart from "valid header, corrupt payload, drop one
//! message and keep the connection".

pub mod codec;
pub mod error;
pub mod priority;
pub mod reader;
pub mod writer;

pub use codec::{
    checksum, decode_frame, encode_frame, scan_frame, DecodeStep, Frame, FrameConfig, FrameHeader,
    FrameVersion, ScanOutcome, DEFAULT_MAX_PAYLOAD, HEADER_DATA_LEN, HEADER_LEN, MAGIC,
};
pub use error::{FrameError, Result};
pub use priority::{AUTH, BACKGROUND, CTRL, FLASH, IMPORTANT, NORMAL, URGENT};
pub use reader::FrameReader;
pub use writer::FrameWriter;
