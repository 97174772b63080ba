// Copyright (c) 2026 the galette authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Storage abstraction for sequential binary data reading.
//!
//! The decoder consumes bytes through the [`Stream`] trait so that modules
//! can be parsed out of in-memory buffers and `std::io` readers alike.

use std::fmt;
use std::io;

/// A byte source the module decoder can read from.
pub trait Stream {
    /// Error type for storage-specific failures.
    type Error: fmt::Debug;

    /// Whether the given error signifies a failure to read due to having
    /// reached the end of the stream.
    fn is_eof(err: &Self::Error) -> bool;

    /// Returns the current byte offset into the stream.
    fn offset(&mut self) -> usize;

    /// Reads a single byte from the stream.
    fn read_byte(&mut self) -> Result<u8, Self::Error>;

    /// Reads exactly `buf.len()` bytes into the provided buffer, erroring if
    /// the stream ends first.
    ///
    /// Implementors should override for better performance.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        for byte in buf {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    /// Skip the specified number of bytes in the stream.
    ///
    /// Implementors should override for better performance.
    fn skip_bytes(&mut self, count: usize) -> Result<(), Self::Error> {
        for _ in 0..count {
            self.read_byte()?;
        }
        Ok(())
    }
}

/// Represents attempting to read past the end of an in-memory buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EndOfStream;

/// In-memory implementation of [`Stream`] over anything byte-slice-shaped.
pub struct BytesStream<Bytes: AsRef<[u8]>> {
    bytes: Bytes,
    pos: usize,
}

impl<Bytes: AsRef<[u8]>> BytesStream<Bytes> {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl<Bytes: AsRef<[u8]>> Stream for BytesStream<Bytes> {
    type Error = EndOfStream;

    fn is_eof(_: &Self::Error) -> bool {
        true
    }

    fn offset(&mut self) -> usize {
        self.pos
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let bytes = self.bytes.as_ref();
        if self.pos < bytes.len() {
            let byte = bytes[self.pos];
            self.pos += 1;
            Ok(byte)
        } else {
            Err(EndOfStream)
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        let bytes = self.bytes.as_ref();
        debug_assert!(self.pos <= bytes.len());
        if buf.len() <= bytes.len() - self.pos {
            buf.copy_from_slice(&bytes[self.pos..(self.pos + buf.len())]);
            self.pos += buf.len();
            Ok(())
        } else {
            Err(EndOfStream)
        }
    }

    fn skip_bytes(&mut self, count: usize) -> Result<(), Self::Error> {
        let bytes = self.bytes.as_ref();
        debug_assert!(self.pos <= bytes.len());
        if count <= bytes.len() - self.pos {
            self.pos += count;
            Ok(())
        } else {
            Err(EndOfStream)
        }
    }
}

/// [`Stream`] adapter for `std::io` readers. Tracks the offset itself so
/// that non-seekable readers work too.
pub struct ReaderStream<R: io::Read> {
    reader: R,
    pos: usize,
}

impl<R: io::Read> ReaderStream<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, pos: 0 }
    }
}

impl<R: io::Read> Stream for ReaderStream<R> {
    type Error = io::Error;

    fn is_eof(err: &Self::Error) -> bool {
        err.kind() == io::ErrorKind::UnexpectedEof
    }

    fn offset(&mut self) -> usize {
        self.pos
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.reader.read_exact(buf)?;
        self.pos += buf.len();
        Ok(())
    }
}
