// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC frame header emission.
//!
//! The header is byte aligned throughout: the sync code and descriptor fields pack into whole
//! bytes, the frame number is a whole number of bytes, and the optional block-size and
//! sample-rate trailers are one or two bytes. A CRC-8 of everything before it terminates the
//! header.

use harmonia_core::checksum::Crc8Ccitt;
use harmonia_core::errors::Result;
use harmonia_core::io::{MonitorWriteStream, WriteBytes};

/// `ChannelAssignment` describes the mapping between the subframes of a frame and the channels
/// they belong to. It is also through the `ChannelAssignment` that a decoder is instructed on how
/// to decorrelate stereo channels.
///
/// For LeftSide or RightSide channel assignments, one channel is stored independently while the
/// other stores a difference. The difference is always stored as Left - Right. For the MidSide
/// channel assignment, no channel is stored independently, rather, a Mid (average) channel and a
/// difference channel are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// All channels are independently coded.
    Independent(u32),
    /// Channel 0 is the Left channel, channel 1 is the difference channel.
    LeftSide,
    /// Channel 0 is the difference channel, channel 1 is the Right channel.
    RightSide,
    /// Channel 0 is the Mid channel, channel 1 is the difference channel.
    MidSide,
}

impl ChannelAssignment {
    /// The 4-bit channel assignment field.
    pub fn code(&self) -> u32 {
        match *self {
            ChannelAssignment::Independent(channels) => {
                debug_assert!(channels >= 1 && channels <= 8);
                channels - 1
            }
            ChannelAssignment::LeftSide => 0x8,
            ChannelAssignment::RightSide => 0x9,
            ChannelAssignment::MidSide => 0xa,
        }
    }
}

/// The parameters of one frame header.
pub struct FrameHeader {
    pub block_size: u32,
    pub sample_rate: u32,
    pub channel_assignment: ChannelAssignment,
    pub bits_per_sample: u32,
    pub frame_number: u64,
}

/// Writes a frame header, including the trailing CRC-8, to the given sink. The sink is expected
/// to be byte aligned; the header leaves it byte aligned.
pub fn write_frame_header<W: WriteBytes>(writer: &mut W, header: &FrameHeader) -> Result<()> {
    debug_assert!(header.block_size >= 1 && header.block_size <= 65_535);

    // The header is checksummed with a CRC-8 hash that includes the sync code.
    let mut writer_crc8 = MonitorWriteStream::new(&mut *writer, Crc8Ccitt::new(0));

    // The 14-bit sync code, a reserved zero bit, and the fixed blocking strategy bit.
    writer_crc8.write_be_u16(0xfff8)?;

    let block_size_enc = block_size_code(header.block_size);
    let sample_rate_enc = sample_rate_code(header.sample_rate);

    writer_crc8.write_byte(((block_size_enc << 4) | sample_rate_enc) as u8)?;

    let channels_enc = header.channel_assignment.code();
    let bits_per_sample_enc = bits_per_sample_code(header.bits_per_sample);

    writer_crc8.write_byte(((channels_enc << 4) | (bits_per_sample_enc << 1)) as u8)?;

    // With a fixed blocking strategy the sequence field carries the frame number, which is
    // limited to 31 bits.
    debug_assert!(header.frame_number <= 0x7fff_ffff);
    utf8_encode_be_u64(&mut writer_crc8, header.frame_number)?;

    match block_size_enc {
        0x6 => writer_crc8.write_u8((header.block_size - 1) as u8)?,
        0x7 => writer_crc8.write_be_u16((header.block_size - 1) as u16)?,
        _ => (),
    }

    match sample_rate_enc {
        0xc => writer_crc8.write_u8((header.sample_rate / 1000) as u8)?,
        0xd => writer_crc8.write_be_u16(header.sample_rate as u16)?,
        0xe => writer_crc8.write_be_u16((header.sample_rate / 10) as u16)?,
        _ => (),
    }

    // End of the frame header, pop off and append the CRC-8 checksum.
    let crc8 = writer_crc8.monitor().crc();

    writer.write_u8(crc8)?;

    Ok(())
}

/// The 4-bit block-size code. Common sizes use table codes; anything else defers to an 8- or
/// 16-bit trailer holding `block_size - 1`.
fn block_size_code(block_size: u32) -> u32 {
    match block_size {
        192 => 0x1,
        576 => 0x2,
        1152 => 0x3,
        2304 => 0x4,
        4608 => 0x5,
        256 => 0x8,
        512 => 0x9,
        1024 => 0xa,
        2048 => 0xb,
        4096 => 0xc,
        8192 => 0xd,
        16384 => 0xe,
        32768 => 0xf,
        _ if block_size <= 256 => 0x6,
        _ => 0x7,
    }
}

/// The 4-bit sample-rate code. Common rates use table codes; rates expressible in whole kHz,
/// whole Hz up to 16 bits, or tens of Hz use a trailer; everything else defers to STREAMINFO.
fn sample_rate_code(sample_rate: u32) -> u32 {
    match sample_rate {
        88_200 => 0x1,
        176_400 => 0x2,
        192_000 => 0x3,
        8_000 => 0x4,
        16_000 => 0x5,
        22_050 => 0x6,
        24_000 => 0x7,
        32_000 => 0x8,
        44_100 => 0x9,
        48_000 => 0xa,
        96_000 => 0xb,
        _ if sample_rate % 1000 == 0 && sample_rate / 1000 <= 255 => 0xc,
        _ if sample_rate <= 65_535 => 0xd,
        _ if sample_rate % 10 == 0 && sample_rate / 10 <= 65_535 => 0xe,
        _ => 0x0,
    }
}

/// The 3-bit sample-size code. Only the four depths this encoder accepts are reachable.
fn bits_per_sample_code(bits_per_sample: u32) -> u32 {
    match bits_per_sample {
        8 => 0x1,
        16 => 0x4,
        24 => 0x6,
        32 => 0x7,
        _ => unreachable!(),
    }
}

/// Encodes a big-endian unsigned integer via extended UTF8. In this context, extended UTF8 means
/// the encoded value may be up to 7 bytes for a maximum integer bit width of 36 bits.
fn utf8_encode_be_u64<W: WriteBytes>(writer: &mut W, value: u64) -> Result<()> {
    debug_assert!(value < (1 << 36));

    // A single byte carries values below 0x80 directly.
    if value < 0x80 {
        return writer.write_byte(value as u8);
    }

    // The total width in data bits for each multi-byte sequence length: the leading byte
    // contributes 6 fewer bits for every prefix bit, each continuation byte contributes 6.
    const SEQUENCE: [(u64, u8, u32); 6] = [
        (1 << 11, 0xc0, 1),
        (1 << 16, 0xe0, 2),
        (1 << 21, 0xf0, 3),
        (1 << 26, 0xf8, 4),
        (1 << 31, 0xfc, 5),
        (1 << 36, 0xfe, 6),
    ];

    for &(limit, prefix, n_continuation) in &SEQUENCE {
        if value < limit {
            writer.write_byte(prefix | (value >> (6 * n_continuation)) as u8)?;

            for i in (0..n_continuation).rev() {
                writer.write_byte(0x80 | ((value >> (6 * i)) & 0x3f) as u8)?;
            }

            return Ok(());
        }
    }

    unreachable!()
}
