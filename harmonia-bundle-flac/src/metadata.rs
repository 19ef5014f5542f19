// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC metadata blocks: the STREAMINFO payload, metadata block headers, and the minimal
//! Vorbis-comment block the encoder emits.

use harmonia_core::errors::Result;
use harmonia_core::io::WriteBytes;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataBlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Forbidden,
}

impl MetadataBlockType {
    /// The 7-bit block type field.
    pub fn code(&self) -> u8 {
        match *self {
            MetadataBlockType::StreamInfo => 0,
            MetadataBlockType::Padding => 1,
            MetadataBlockType::Application => 2,
            MetadataBlockType::SeekTable => 3,
            MetadataBlockType::VorbisComment => 4,
            MetadataBlockType::CueSheet => 5,
            MetadataBlockType::Picture => 6,
            MetadataBlockType::Forbidden => 127,
        }
    }
}

pub struct MetadataBlockHeader {
    pub is_last: bool,
    pub block_type: MetadataBlockType,
    pub block_len: u32,
}

impl MetadataBlockHeader {
    /// Writes the block header: the last-block flag, the block type, and a 24-bit length.
    pub fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        writer.write_byte(u8::from(self.is_last) << 7 | self.block_type.code())?;
        writer.write_be_u24(self.block_len)?;
        Ok(())
    }
}

/// The STREAMINFO metadata block.
#[derive(Debug)]
pub struct StreamInfo {
    /// The minimum and maximum number of samples per block of audio. Equal for a fixed blocking
    /// strategy; the final block of a stream is exempt.
    pub block_len_min: u16,
    pub block_len_max: u16,
    /// The minimum and maximum byte length of an encoded frame. Folded in as frames are written;
    /// zero means unknown.
    pub frame_byte_len_min: u32,
    pub frame_byte_len_max: u32,
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The number of channels.
    pub n_channels: u32,
    /// The number of bits per sample of the stream.
    pub bits_per_sample: u32,
    /// The total number of inter-channel samples in the stream.
    pub n_samples: u64,
    /// The MD5 hash of the raw little-endian sample bytes.
    pub md5: [u8; 16],
}

impl StreamInfo {
    /// The byte length of a serialised STREAMINFO block.
    pub const SIZE: u32 = 34;

    /// Folds the byte length of an encoded frame into the frame length bounds.
    pub fn update_frame_sizes(&mut self, frame_len: u32) {
        debug_assert!(frame_len < (1 << 24));

        if self.frame_byte_len_min == 0 || frame_len < self.frame_byte_len_min {
            self.frame_byte_len_min = frame_len;
        }
        if frame_len > self.frame_byte_len_max {
            self.frame_byte_len_max = frame_len;
        }
    }

    /// Serialises the 34-byte big-endian STREAMINFO payload.
    pub fn bytes(&self) -> [u8; 34] {
        debug_assert!(self.n_channels >= 1 && self.n_channels <= 8);
        debug_assert!(self.bits_per_sample >= 4 && self.bits_per_sample <= 32);
        debug_assert!(self.sample_rate < (1 << 20));
        debug_assert!(self.n_samples < (1 << 36));

        let mut buf = [0u8; StreamInfo::SIZE as usize];

        buf[0..2].copy_from_slice(&self.block_len_min.to_be_bytes());
        buf[2..4].copy_from_slice(&self.block_len_max.to_be_bytes());
        buf[4..7].copy_from_slice(&self.frame_byte_len_min.to_be_bytes()[1..4]);
        buf[7..10].copy_from_slice(&self.frame_byte_len_max.to_be_bytes()[1..4]);

        // The sample rate (20 bits), channel count less one (3 bits), sample width less one
        // (5 bits), and inter-channel sample count (36 bits) share byte boundaries; pack them
        // into one 64-bit field.
        let packed = (u64::from(self.sample_rate) << 44)
            | (u64::from(self.n_channels - 1) << 41)
            | (u64::from(self.bits_per_sample - 1) << 36)
            | self.n_samples;

        buf[10..18].copy_from_slice(&packed.to_be_bytes());
        buf[18..34].copy_from_slice(&self.md5);

        buf
    }
}

/// Writes a Vorbis-comment metadata block carrying only the vendor string: the block header,
/// the little-endian vendor length and vendor bytes, and a zero user-comment count.
pub fn write_vorbis_comment_block<W: WriteBytes>(
    writer: &mut W,
    vendor: &str,
    is_last: bool,
) -> Result<()> {
    let header = MetadataBlockHeader {
        is_last,
        block_type: MetadataBlockType::VorbisComment,
        block_len: 4 + vendor.len() as u32 + 4,
    };
    header.write(writer)?;

    writer.write_le_u32(vendor.len() as u32)?;
    writer.write_buf_bytes(vendor.as_bytes())?;
    writer.write_le_u32(0)?;

    Ok(())
}
