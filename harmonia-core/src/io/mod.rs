// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements composable bit- and byte-level output.
//!
//! All `Stream`s and `Writer`s operating on bytes of data at a time implement the [`WriteBytes`]
//! trait. Likewise, writers operating on bits of data at a time implement the [`WriteBitsLtr`]
//! trait and consume bits from most-significant to least-significant.
//!
//! The sole exception to this rule is [`MediaSinkStream`] which writes to sinks implementing
//! [`MediaSink`] (aka. [`std::io::Write`] + [`std::io::Seek`]).

use std::io;

use crate::errors::Result;

mod bit;
mod media_sink_stream;
mod monitor_stream;

pub use bit::{BitWriterLtr, WriteBitsLtr};
pub use media_sink_stream::MediaSinkStream;
pub use monitor_stream::{Monitor, MonitorWriteStream};

/// `MediaSink` is a composite trait of [`std::io::Write`] and [`std::io::Seek`]. A sink *must*
/// implement this trait to be used by [`MediaSinkStream`].
///
/// Despite requiring the [`std::io::Seek`] trait, seeking is an optional capability that can be
/// queried at runtime.
pub trait MediaSink: io::Write + io::Seek + Send + Sync {
    /// Returns if the sink is seekable. This may be an expensive operation.
    fn is_seekable(&self) -> bool;
}

impl MediaSink for std::fs::File {
    /// Returns if the `std::fs::File` backing the `MediaSink` is seekable.
    ///
    /// Note: This operation involves querying the underlying file descriptor for information and
    /// may be moderately expensive. Therefore it is recommended to cache this value if used often.
    fn is_seekable(&self) -> bool {
        // If the file's metadata is available, and the file is a regular file (i.e., not a FIFO,
        // etc.), then the MediaSink will be seekable. Otherwise assume it is not. Note that
        // metadata() follows symlinks.
        match self.metadata() {
            Ok(metadata) => metadata.is_file(),
            _ => false,
        }
    }
}

impl MediaSink for io::Cursor<Vec<u8>> {
    /// Always returns true since a `io::Cursor<Vec<u8>>` is always seekable.
    fn is_seekable(&self) -> bool {
        true
    }
}

/// `WriteBytes` provides methods to write bytes and little- or big-endian unsigned integers of
/// standard widths to a sink.
pub trait WriteBytes {
    /// Writes a single byte to the sink or returns an error.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Writes two bytes to the sink in the given order or returns an error.
    fn write_double_bytes(&mut self, bytes: [u8; 2]) -> Result<()>;

    /// Writes three bytes to the sink in the given order or returns an error.
    fn write_triple_bytes(&mut self, bytes: [u8; 3]) -> Result<()>;

    /// Writes four bytes to the sink in the given order or returns an error.
    fn write_quad_bytes(&mut self, bytes: [u8; 4]) -> Result<()>;

    /// Writes the entire provided buffer to the sink or returns an error.
    fn write_buf_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Writes a single unsigned byte to the sink or returns an error.
    #[inline(always)]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_byte(value)
    }

    /// Writes an unsigned 16-bit big-endian integer to the sink or returns an error.
    #[inline(always)]
    fn write_be_u16(&mut self, value: u16) -> Result<()> {
        self.write_double_bytes(value.to_be_bytes())
    }

    /// Writes an unsigned 24-bit big-endian integer to the sink or returns an error.
    #[inline(always)]
    fn write_be_u24(&mut self, value: u32) -> Result<()> {
        debug_assert!(value < (1 << 24));
        let buf = value.to_be_bytes();
        self.write_triple_bytes([buf[1], buf[2], buf[3]])
    }

    /// Writes an unsigned 32-bit big-endian integer to the sink or returns an error.
    #[inline(always)]
    fn write_be_u32(&mut self, value: u32) -> Result<()> {
        self.write_quad_bytes(value.to_be_bytes())
    }

    /// Writes an unsigned 32-bit little-endian integer to the sink or returns an error.
    #[inline(always)]
    fn write_le_u32(&mut self, value: u32) -> Result<()> {
        self.write_quad_bytes(value.to_le_bytes())
    }

    /// Gets the position of the sink.
    fn pos(&self) -> u64;
}

impl<'b, W: WriteBytes> WriteBytes for &'b mut W {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (*self).write_byte(byte)
    }

    #[inline(always)]
    fn write_double_bytes(&mut self, bytes: [u8; 2]) -> Result<()> {
        (*self).write_double_bytes(bytes)
    }

    #[inline(always)]
    fn write_triple_bytes(&mut self, bytes: [u8; 3]) -> Result<()> {
        (*self).write_triple_bytes(bytes)
    }

    #[inline(always)]
    fn write_quad_bytes(&mut self, bytes: [u8; 4]) -> Result<()> {
        (*self).write_quad_bytes(bytes)
    }

    #[inline(always)]
    fn write_buf_bytes(&mut self, buf: &[u8]) -> Result<()> {
        (*self).write_buf_bytes(buf)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}

impl WriteBytes for Vec<u8> {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.push(byte);
        Ok(())
    }

    #[inline(always)]
    fn write_double_bytes(&mut self, bytes: [u8; 2]) -> Result<()> {
        self.extend_from_slice(&bytes);
        Ok(())
    }

    #[inline(always)]
    fn write_triple_bytes(&mut self, bytes: [u8; 3]) -> Result<()> {
        self.extend_from_slice(&bytes);
        Ok(())
    }

    #[inline(always)]
    fn write_quad_bytes(&mut self, bytes: [u8; 4]) -> Result<()> {
        self.extend_from_slice(&bytes);
        Ok(())
    }

    #[inline(always)]
    fn write_buf_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.len() as u64
    }
}
