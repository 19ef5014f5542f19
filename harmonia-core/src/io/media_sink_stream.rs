// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;
use std::io::{Seek, Write};

use crate::errors::Result;

use super::{MediaSink, WriteBytes};

/// `MediaSinkStream` is the common writer used to feed a [`MediaSink`]. It provides buffering and
/// absolute position tracking on top of the boxed sink, and byte-accurate seeking for in-place
/// patching of previously written regions.
pub struct MediaSinkStream {
    /// The sink bytes are written to.
    inner: Box<dyn MediaSink>,
    /// The write-back buffer.
    buf: Box<[u8]>,
    /// The number of buffered bytes not yet committed to the sink.
    end: usize,
    /// The absolute position of the stream, including buffered bytes.
    abs_pos: u64,
}

impl MediaSinkStream {
    /// The size of the write-back buffer.
    const BUF_LEN: usize = 32 * 1024;

    pub fn new(inner: Box<dyn MediaSink>) -> MediaSinkStream {
        MediaSinkStream {
            inner,
            buf: vec![0u8; MediaSinkStream::BUF_LEN].into_boxed_slice(),
            end: 0,
            abs_pos: 0,
        }
    }

    /// Returns if the underlying sink is seekable.
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// Commits all buffered bytes to the underlying sink.
    fn commit(&mut self) -> Result<()> {
        if self.end > 0 {
            self.inner.write_all(&self.buf[..self.end])?;
            self.end = 0;
        }
        Ok(())
    }

    /// Commits all buffered bytes and flushes the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        self.commit()?;
        self.inner.flush()?;
        Ok(())
    }

    /// Seeks the stream to the given absolute byte position. All buffered bytes are committed
    /// before repositioning. Returns the new position.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        self.commit()?;
        self.abs_pos = self.inner.seek(io::SeekFrom::Start(pos))?;
        Ok(self.abs_pos)
    }

    /// Flushes the stream and unwraps it, returning the underlying sink.
    pub fn into_inner(mut self) -> Result<Box<dyn MediaSink>> {
        self.flush()?;
        Ok(self.inner)
    }
}

impl WriteBytes for MediaSinkStream {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.end == self.buf.len() {
            self.commit()?;
        }
        self.buf[self.end] = byte;
        self.end += 1;
        self.abs_pos += 1;
        Ok(())
    }

    #[inline(always)]
    fn write_double_bytes(&mut self, bytes: [u8; 2]) -> Result<()> {
        self.write_buf_bytes(&bytes)
    }

    #[inline(always)]
    fn write_triple_bytes(&mut self, bytes: [u8; 3]) -> Result<()> {
        self.write_buf_bytes(&bytes)
    }

    #[inline(always)]
    fn write_quad_bytes(&mut self, bytes: [u8; 4]) -> Result<()> {
        self.write_buf_bytes(&bytes)
    }

    fn write_buf_bytes(&mut self, buf: &[u8]) -> Result<()> {
        if self.end + buf.len() > self.buf.len() {
            self.commit()?;
        }

        // Buffer small writes, pass oversized writes directly to the sink.
        if buf.len() < self.buf.len() {
            self.buf[self.end..self.end + buf.len()].copy_from_slice(buf);
            self.end += buf.len();
        }
        else {
            self.inner.write_all(buf)?;
        }

        self.abs_pos += buf.len() as u64;
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.abs_pos
    }
}
