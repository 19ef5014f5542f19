// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::errors::Result;

use super::WriteBytes;

/// A `Monitor` provides a common interface to examine the operations observed by a
/// [`MonitorWriteStream`].
pub trait Monitor {
    fn process_byte(&mut self, byte: u8);

    #[inline(always)]
    fn process_double_bytes(&mut self, buf: [u8; 2]) {
        self.process_byte(buf[0]);
        self.process_byte(buf[1]);
    }

    #[inline(always)]
    fn process_triple_bytes(&mut self, buf: [u8; 3]) {
        self.process_byte(buf[0]);
        self.process_byte(buf[1]);
        self.process_byte(buf[2]);
    }

    #[inline(always)]
    fn process_quad_bytes(&mut self, buf: [u8; 4]) {
        self.process_byte(buf[0]);
        self.process_byte(buf[1]);
        self.process_byte(buf[2]);
        self.process_byte(buf[3]);
    }

    fn process_buf_bytes(&mut self, buf: &[u8]);
}

/// A `MonitorWriteStream` is a passive stream that observes all operations performed on the inner
/// sink and forwards an immutable reference of the written data to a [`Monitor`].
pub struct MonitorWriteStream<W: WriteBytes, M: Monitor> {
    inner: W,
    monitor: M,
}

impl<W: WriteBytes, M: Monitor> MonitorWriteStream<W, M> {
    pub fn new(inner: W, monitor: M) -> MonitorWriteStream<W, M> {
        MonitorWriteStream { inner, monitor }
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut M {
        &mut self.monitor
    }
}

impl<W: WriteBytes, M: Monitor> WriteBytes for MonitorWriteStream<W, M> {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.inner.write_byte(byte)?;
        self.monitor.process_byte(byte);
        Ok(())
    }

    #[inline(always)]
    fn write_double_bytes(&mut self, bytes: [u8; 2]) -> Result<()> {
        self.inner.write_double_bytes(bytes)?;
        self.monitor.process_double_bytes(bytes);
        Ok(())
    }

    #[inline(always)]
    fn write_triple_bytes(&mut self, bytes: [u8; 3]) -> Result<()> {
        self.inner.write_triple_bytes(bytes)?;
        self.monitor.process_triple_bytes(bytes);
        Ok(())
    }

    #[inline(always)]
    fn write_quad_bytes(&mut self, bytes: [u8; 4]) -> Result<()> {
        self.inner.write_quad_bytes(bytes)?;
        self.monitor.process_quad_bytes(bytes);
        Ok(())
    }

    fn write_buf_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_buf_bytes(buf)?;
        self.monitor.process_buf_bytes(buf);
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.inner.pos()
    }
}
