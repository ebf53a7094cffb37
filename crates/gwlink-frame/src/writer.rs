use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.priority, frame.payload.as_ref())
    }

    /// Encode and send a payload at a priority.
    pub fn send(&mut self, priority: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(priority, payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // A write timeout surfaces as WouldBlock on a blocking
                // socket; report it so the caller can fail the cycle
                // instead of spinning.
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame encoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::priority::NORMAL;
    use crate::reader::FrameReader;

    #[test]
    fn writer_reader_roundtrip() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.send(NORMAL, b"ping").unwrap();
        writer.send(42, b"pong").unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        assert_eq!((f1.priority, f1.payload.as_ref()), (NORMAL, b"ping".as_ref()));
        assert_eq!((f2.priority, f2.payload.as_ref()), (42, b"pong".as_ref()));
    }

    #[test]
    fn rejects_payload_over_configured_max() {
        let cfg = FrameConfig {
            max_payload_size: 8,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Vec::new(), cfg);
        let err = writer.send(NORMAL, &[0u8; 16]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 16, max: 8 }));
    }

    #[test]
    fn zero_byte_write_is_connection_closed() {
        struct ZeroWriter;
        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(NORMAL, b"data").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_pipe() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send(NORMAL, b"over-the-wire").unwrap();
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.priority, NORMAL);
        assert_eq!(frame.payload.as_ref(), b"over-the-wire");
    }
}
