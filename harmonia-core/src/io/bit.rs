// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::errors::Result;
use crate::io::WriteBytes;

mod private {
    use crate::errors::Result;

    pub trait StoreBitsLtr {
        /// Store `bit_width` bits, low-aligned in `bits`, into the cache. The caller must
        /// guarantee the cache has room for them.
        fn store_bits(&mut self, bit_width: u32, bits: u64);

        /// Get the number of unused bits left in the cache.
        fn num_bits_free(&self) -> u32;

        /// Write the full cache to the sink and reset it.
        fn flush_cache(&mut self) -> Result<()>;
    }
}

/// `WriteBitsLtr` writes bits from most-significant to least-significant.
pub trait WriteBitsLtr: private::StoreBitsLtr {
    /// Writes a single bit or returns an error.
    #[inline(always)]
    fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits_leq64(1, u64::from(bit))
    }

    /// Writes up to 32 bits from the low end of `value` or returns an error. The value must not
    /// contain set bits above `bit_width`.
    #[inline(always)]
    fn write_bits_leq32(&mut self, bit_width: u32, value: u32) -> Result<()> {
        debug_assert!(bit_width <= u32::BITS);
        self.write_bits_leq64(bit_width, u64::from(value))
    }

    /// Writes a signed two's complement integer of up to 32 bits, masking it to `bit_width` bits
    /// first, or returns an error.
    #[inline(always)]
    fn write_bits_leq32_signed(&mut self, bit_width: u32, value: i32) -> Result<()> {
        debug_assert!(bit_width <= u32::BITS);
        self.write_bits_leq64(bit_width, u64::from(value as u32) & mask_leq64(bit_width))
    }

    /// Writes up to 64 bits from the low end of `value` or returns an error. The value must not
    /// contain set bits above `bit_width`.
    fn write_bits_leq64(&mut self, bit_width: u32, value: u64) -> Result<()> {
        debug_assert!(bit_width <= u64::BITS);
        debug_assert!(bit_width == u64::BITS || value < (1 << bit_width));

        if bit_width == 0 {
            return Ok(());
        }

        let free = self.num_bits_free();

        if bit_width < free {
            self.store_bits(bit_width, value);
        }
        else {
            // The cache will be filled exactly. Store the upper part of the value, flush, then
            // store the remainder. The split prevents shifting by 64 bits when the value fits the
            // free space exactly.
            let rem = bit_width - free;

            self.store_bits(free, value >> rem);
            self.flush_cache()?;

            if rem > 0 {
                self.store_bits(rem, value & mask_leq64(rem));
            }
        }

        Ok(())
    }

    /// Writes a signed two's complement integer of up to 64 bits, masking it to `bit_width` bits
    /// first, or returns an error.
    #[inline(always)]
    fn write_bits_leq64_signed(&mut self, bit_width: u32, value: i64) -> Result<()> {
        self.write_bits_leq64(bit_width, (value as u64) & mask_leq64(bit_width))
    }

    /// Writes a unary zeros encoded integer: `num` zero bits followed by a terminating one bit.
    /// Handles runs of arbitrary length.
    fn write_unary_zeros(&mut self, num: u64) -> Result<()> {
        let mut num = num;

        while num >= 64 {
            self.write_bits_leq64(64, 0)?;
            num -= 64;
        }

        self.write_bits_leq64(num as u32 + 1, 1)
    }
}

/// Masks the `idx` least significant bits of a u64.
#[inline(always)]
fn mask_leq64(idx: u32) -> u64 {
    if idx == 64 {
        u64::MAX
    }
    else {
        (1 << idx) - 1
    }
}

/// A `BitWriterLtr` provides an implementation of a `WriteBitsLtr` on top of any byte sink.
///
/// Bits are accumulated in a 64-bit cache, filled from the most-significant bit downwards, and
/// committed to the sink in whole words as the cache fills. [`BitWriterLtr::flush`] pads the
/// pending bits to a byte boundary with zeros and commits them.
pub struct BitWriterLtr<W: WriteBytes> {
    writer: W,
    bits: u64,
    n_bits_used: u32,
}

impl<W: WriteBytes> BitWriterLtr<W> {
    /// Instantiates a new `BitWriterLtr` over the given sink.
    pub fn new(writer: W) -> Self {
        BitWriterLtr { writer, bits: 0, n_bits_used: 0 }
    }

    /// Pads the pending bits to a byte boundary with zero bits and commits them to the sink.
    pub fn flush(&mut self) -> Result<()> {
        let n_bytes = ((self.n_bits_used + 7) / 8) as usize;

        let buf = self.bits.to_be_bytes();
        self.writer.write_buf_bytes(&buf[..n_bytes])?;

        self.bits = 0;
        self.n_bits_used = 0;
        Ok(())
    }

    /// Gets a reference to the underlying sink.
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Unwraps the writer, returning the underlying sink. Any pending bits are discarded; call
    /// [`BitWriterLtr::flush`] first.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: WriteBytes> private::StoreBitsLtr for BitWriterLtr<W> {
    #[inline(always)]
    fn store_bits(&mut self, bit_width: u32, bits: u64) {
        debug_assert!(bit_width <= self.num_bits_free());

        if bit_width > 0 {
            self.bits |= bits << (64 - self.n_bits_used - bit_width);
            self.n_bits_used += bit_width;
        }
    }

    #[inline(always)]
    fn num_bits_free(&self) -> u32 {
        64 - self.n_bits_used
    }

    #[inline(always)]
    fn flush_cache(&mut self) -> Result<()> {
        debug_assert!(self.n_bits_used == 64);

        self.writer.write_buf_bytes(&self.bits.to_be_bytes())?;

        self.bits = 0;
        self.n_bits_used = 0;
        Ok(())
    }
}

impl<W: WriteBytes> WriteBitsLtr for BitWriterLtr<W> {}
