use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::Crc;
use tracing::warn;

use crate::error::{FrameError, Result};

/// Magic sentinel marking a candidate frame start.
///
/// The leading byte doubles as the header version discriminator; see
/// [`FrameVersion`].
pub const MAGIC: [u8; 4] = [0xFE, 0xED, 0xBE, 0xEF];

/// Header bytes covered by the header checksum:
/// magic (4) + length (4) + priority (1) + reserved (3) + payload CRC (4).
pub const HEADER_DATA_LEN: usize = 16;

/// Full header size: [`HEADER_DATA_LEN`] plus the 4-byte header checksum.
pub const HEADER_LEN: usize = 20;

/// Default maximum payload size: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 0x10_0000;

const CRC32: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// CRC32 (ISO-HDLC) over a byte slice.
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Wire header layout version.
///
/// The first magic byte selects the layout: `0xFE` introduces the full
/// 20-byte header. The layout is versioned so a future terse variant can be
/// added without guessing at frame boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameVersion {
    V1,
}

impl FrameVersion {
    /// The leading wire byte for this version.
    pub fn wire_byte(self) -> u8 {
        match self {
            FrameVersion::V1 => MAGIC[0],
        }
    }
}

/// A framed message: an opaque payload plus its transmission priority.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Application-supplied priority (mirrored from the payload).
    pub priority: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(priority: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            priority,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// The parsed sub-fields of a confirmed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: usize,
    pub priority: u8,
    pub payload_checksum: u32,
}

impl FrameHeader {
    /// Parse the header sub-fields at the start of `buf`.
    ///
    /// Returns `None` if fewer than [`HEADER_LEN`] bytes are available. Does
    /// not verify the header checksum; [`scan_frame`] does that before a
    /// start offset is confirmed.
    pub fn parse(buf: &[u8]) -> Option<FrameHeader> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let payload_len = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
        let priority = buf[8];
        let payload_checksum = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        Some(FrameHeader {
            payload_len,
            priority,
            payload_checksum,
        })
    }

    /// Check the extracted payload bytes against the header's payload CRC.
    pub fn validate_payload(&self, payload: &[u8]) -> bool {
        payload.len() == self.payload_len && checksum(payload) == self.payload_checksum
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers little-endian):
/// ```text
/// ┌────────────┬─────────┬──────────┬──────────┬─────────────┬────────────┬───────────┐
/// │ Magic (4B) │ Length  │ Priority │ Reserved │ Payload CRC │ Header CRC │ Payload   │
/// │ FEEDBEEF   │ (4B LE) │ (1B)     │ (3B = 0) │ (4B LE)     │ (4B LE)    │ (Length)  │
/// └────────────┴─────────┴──────────┴──────────┴─────────────┴────────────┴───────────┘
/// ```
/// The header CRC covers the preceding 16 bytes, magic included.
pub fn encode_frame(priority: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_LEN + payload.len());
    let start = dst.len();
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_u8(priority);
    dst.put_slice(&[0u8; 3]);
    dst.put_u32_le(checksum(payload));
    let header_crc = checksum(&dst[start..start + HEADER_DATA_LEN]);
    dst.put_u32_le(header_crc);
    dst.put_slice(payload);
    Ok(())
}

/// Result of scanning a buffer for a confirmed frame start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A header with a valid checksum starts at `offset`.
    Found { offset: usize },
    /// No confirmed start; the first `discard` bytes can never begin one.
    NeedMoreData { discard: usize },
}

/// Search `buf` for an offset where the magic bytes are confirmed by the
/// header checksum.
///
/// The magic is only a search anchor: a candidate whose header checksum does
/// not match is abandoned and the scan advances a single byte, so a
/// magic-looking sequence inside payload bytes cannot false-positive past
/// the checksum gate. A candidate with fewer than [`HEADER_LEN`] bytes
/// remaining reports "need more data" rather than failure.
pub fn scan_frame(buf: &[u8]) -> ScanOutcome {
    let mut offset = 0;
    while offset + MAGIC.len() <= buf.len() {
        if buf[offset..offset + MAGIC.len()] != MAGIC {
            offset += 1;
            continue;
        }
        if offset + HEADER_LEN > buf.len() {
            // A plausible start; hold it until the rest of the header arrives.
            return ScanOutcome::NeedMoreData { discard: offset };
        }
        let stored =
            u32::from_le_bytes(buf[offset + HEADER_DATA_LEN..offset + HEADER_LEN].try_into().unwrap());
        if checksum(&buf[offset..offset + HEADER_DATA_LEN]) == stored {
            return ScanOutcome::Found { offset };
        }
        offset += 1;
    }
    // The last three bytes may be a magic prefix; everything before them is noise.
    ScanOutcome::NeedMoreData {
        discard: buf.len().saturating_sub(MAGIC.len() - 1),
    }
}

/// One step of deframing an accumulating buffer.
#[derive(Debug)]
pub enum DecodeStep {
    /// A complete, checksum-valid frame was consumed from the buffer.
    Frame(Frame),
    /// No complete frame yet; leading noise (if any) has been discarded.
    NeedMoreData,
    /// A valid header whose payload failed its CRC. The header has been
    /// consumed; the scan resumes at the byte after it, since a corrupt
    /// payload means the declared length itself is untrusted.
    CorruptPayload { declared: usize },
    /// A valid header declaring more than `max` payload bytes. The header
    /// has been consumed; the caller must skip `declared` bytes of stream.
    Oversized { declared: usize, max: usize },
}

/// Drive scan → extract → validate against `src`.
///
/// Consumes leading garbage and, on success, the whole frame. Framing
/// problems are reported as [`DecodeStep`] variants rather than errors:
/// they are recovered locally by the caller, never fatal.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> DecodeStep {
    match scan_frame(&src[..]) {
        ScanOutcome::NeedMoreData { discard } => {
            if discard > 0 {
                src.advance(discard);
            }
            DecodeStep::NeedMoreData
        }
        ScanOutcome::Found { offset } => {
            if offset > 0 {
                warn!(skipped = offset, "resynchronized past stream noise");
                src.advance(offset);
            }
            // scan_frame confirmed HEADER_LEN bytes are present.
            let header = FrameHeader::parse(&src[..]).expect("confirmed header must parse");
            if header.payload_len > max_payload {
                src.advance(HEADER_LEN);
                return DecodeStep::Oversized {
                    declared: header.payload_len,
                    max: max_payload,
                };
            }
            if src.len() < HEADER_LEN + header.payload_len {
                return DecodeStep::NeedMoreData;
            }
            let payload = &src[HEADER_LEN..HEADER_LEN + header.payload_len];
            if checksum(payload) != header.payload_checksum {
                src.advance(HEADER_LEN);
                return DecodeStep::CorruptPayload {
                    declared: header.payload_len,
                };
            }
            src.advance(HEADER_LEN);
            let payload = src.split_to(header.payload_len).freeze();
            DecodeStep::Frame(Frame {
                priority: header.priority,
                payload,
            })
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
