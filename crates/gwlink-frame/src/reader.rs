use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::warn;

use crate::codec::{decode_frame, DecodeStep, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete, checksum-valid frames from any `Read` stream.
///
/// Handles partial reads, resynchronization past stream noise, corrupt
/// payloads (dropped, connection kept) and oversized declared lengths
/// (the exact byte count is skipped across reads) internally — callers
/// always get complete valid frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    /// Remaining bytes of an oversized frame still to be discarded.
    skip: usize,
    corrupt_frames: u64,
    oversized_frames: u64,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            skip: 0,
            corrupt_frames: 0,
            oversized_frames: 0,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Read timeouts on the underlying stream surface as
    /// `FrameError::Io` with `WouldBlock`/`TimedOut`.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if self.skip > 0 {
                let n = self.skip.min(self.buf.len());
                self.buf.advance(n);
                self.skip -= n;
                if self.skip > 0 {
                    self.fill()?;
                    continue;
                }
            }

            match decode_frame(&mut self.buf, self.config.max_payload_size) {
                DecodeStep::Frame(frame) => return Ok(frame),
                DecodeStep::NeedMoreData => self.fill()?,
                DecodeStep::CorruptPayload { declared } => {
                    self.corrupt_frames += 1;
                    warn!(declared, "dropping frame with corrupt payload");
                }
                DecodeStep::Oversized { declared, max } => {
                    self.oversized_frames += 1;
                    warn!(declared, max, "discarding oversized frame");
                    self.skip = declared;
                }
            }
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Frames dropped so far because their payload CRC failed.
    pub fn corrupt_frame_count(&self) -> u64 {
        self.corrupt_frames
    }

    /// Frames skipped so far because their declared length was oversized.
    pub fn oversized_frame_count(&self) -> u64 {
        self.oversized_frames
    }

    /// Bytes currently buffered awaiting more data.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_frame, HEADER_LEN};
    use crate::priority::{CTRL, NORMAL};

    #[test]
    fn read_single_frame() {
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, b"hello", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.priority, NORMAL);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn concrete_scenario_hello_priority_16() {
        // 25-byte frame for b"hello" at priority 16, plus one trailing
        // garbage byte. Exactly one frame out; the garbage byte stays
        // buffered awaiting more data.
        let mut wire = BytesMut::new();
        encode_frame(16, b"hello", &mut wire).unwrap();
        assert_eq!(wire.len(), 25);
        let mut bytes = wire.to_vec();
        bytes.push(0xFF);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.priority, 16);
        assert_eq!(frame.payload.as_ref(), b"hello");
        assert_eq!(reader.buffered(), 1);

        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn read_multiple_frames() {
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, b"one", &mut wire).unwrap();
        encode_frame(CTRL, b"two", &mut wire).unwrap();
        encode_frame(NORMAL, b"three", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        let f3 = reader.read_frame().unwrap();

        assert_eq!((f1.priority, f1.payload.as_ref()), (NORMAL, b"one".as_ref()));
        assert_eq!((f2.priority, f2.payload.as_ref()), (CTRL, b"two".as_ref()));
        assert_eq!(
            (f3.priority, f3.payload.as_ref()),
            (NORMAL, b"three".as_ref())
        );
    }

    #[test]
    fn resynchronizes_past_leading_noise() {
        let mut bytes = vec![0x00, 0x42, 0x99, 0x13, 0x37];
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, b"resync", &mut wire).unwrap();
        bytes.extend_from_slice(&wire);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"resync");
    }

    #[test]
    fn corrupt_payload_is_dropped_and_next_frame_survives() {
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, b"doomed", &mut wire).unwrap();
        wire[HEADER_LEN] ^= 0xFF; // flip a payload byte
        encode_frame(NORMAL, b"kept", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"kept");
        assert_eq!(reader.corrupt_frame_count(), 1);
    }

    #[test]
    fn oversized_frame_skips_exact_byte_count() {
        let oversized = vec![0xAB; 256];
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, &oversized, &mut wire).unwrap();
        encode_frame(NORMAL, b"after", &mut wire).unwrap();

        let cfg = FrameConfig {
            max_payload_size: 64,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"after");
        assert_eq!(reader.oversized_frame_count(), 1);
    }

    #[test]
    fn oversized_skip_spans_reads() {
        // Oversized payload delivered a byte at a time; the skip count must
        // carry across fills.
        let oversized = vec![0xCD; 100];
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, &oversized, &mut wire).unwrap();
        encode_frame(NORMAL, b"tail", &mut wire).unwrap();

        let cfg = FrameConfig {
            max_payload_size: 32,
            ..FrameConfig::default()
        };
        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut reader = FrameReader::with_config(byte_reader, cfg);
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"tail");
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, b"slow", &mut wire).unwrap();

        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, b"truncated-payload", &mut wire).unwrap();
        wire.truncate(HEADER_LEN + 4);

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let reader = WouldBlockReader;
        let mut framed = FrameReader::new(reader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_frame(NORMAL, b"ok", &mut wire).unwrap();

        let reader = InterruptedThenData {
            state: 0,
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
