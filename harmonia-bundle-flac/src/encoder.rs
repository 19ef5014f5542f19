// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The FLAC stream encoder.

use log::debug;

use harmonia_core::checksum::Crc16Ansi;
use harmonia_core::errors::{
    encode_error, end_of_stream_error, limit_error, unsupported_error, Result,
};
use harmonia_core::io::{BitWriterLtr, MediaSinkStream, MonitorWriteStream, WriteBytes};

use crate::frame::{write_frame_header, ChannelAssignment, FrameHeader};
use crate::metadata::{
    write_vorbis_comment_block, MetadataBlockHeader, MetadataBlockType, StreamInfo,
};
use crate::predict::Sample;
use crate::stereo;
use crate::stereo::StereoMode;
use crate::subframe;
use crate::validate::Validator;

/// The parameters of the input stream.
#[derive(Clone, Copy, Debug)]
pub struct StreamParameters {
    /// The number of channels, 1 to 8.
    pub channels: u32,
    /// The sample width in bits: 8, 16, 24, or 32.
    pub bits_per_sample: u32,
    /// The sample rate in Hz, below 2^20.
    pub sample_rate: u32,
    /// The total number of inter-channel samples that will be delivered, below 2^36.
    pub n_samples: u64,
}

/// `EncoderOptions` is a common set of options all encoders use.
#[derive(Clone, Copy, Debug)]
pub struct EncoderOptions {
    /// The number of samples per channel encoded into each frame. The final frame of a stream
    /// may be shorter.
    pub block_size: u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        EncoderOptions { block_size: 4096 }
    }
}

/// Free Lossless Audio Codec (FLAC) encoder.
///
/// The encoder writes the stream header up front with a placeholder STREAMINFO block, then one
/// frame per delivered block of planar samples. [`FlacEncoder::finish`] seeks back and patches
/// STREAMINFO with the accumulated MD5 and frame size bounds, so the sink must be seekable.
pub struct FlacEncoder {
    params: StreamParameters,
    stream_info: StreamInfo,
    writer: MediaSinkStream,
    validator: Validator,
    frame_number: u64,
    n_samples_written: u64,
    // Decorrelation buffers, allocated once and reused across frames. The side channel of a
    // 32-bit deep stream needs 33 bits and uses the wide buffer.
    mid_buf: Vec<i32>,
    side_buf: Vec<i32>,
    wide_side_buf: Vec<i64>,
}

impl FlacEncoder {
    /// The byte length of the stream prefix rewritten by [`FlacEncoder::finish`]: the `fLaC`
    /// marker, the STREAMINFO block header, and the STREAMINFO payload.
    const HEADER_SIZE: usize = 4 + 4 + StreamInfo::SIZE as usize;

    /// The vendor string written into the Vorbis-comment block.
    const VENDOR: &'static str = concat!("harmonia FLAC ", env!("CARGO_PKG_VERSION"));

    /// Instantiates the encoder and writes the stream header: a placeholder for the region
    /// patched by [`FlacEncoder::finish`], then the Vorbis-comment block.
    pub fn try_new(
        params: &StreamParameters,
        options: &EncoderOptions,
        mut writer: MediaSinkStream,
    ) -> Result<FlacEncoder> {
        if params.channels < 1 || params.channels > 8 {
            return unsupported_error("flac: channel count must be between 1 and 8");
        }

        if !matches!(params.bits_per_sample, 8 | 16 | 24 | 32) {
            return unsupported_error("flac: bits per sample must be 8, 16, 24, or 32");
        }

        if params.sample_rate < 1 || params.sample_rate >= (1 << 20) {
            return unsupported_error("flac: sample rate out of bounds");
        }

        if params.n_samples >= (1 << 36) {
            return unsupported_error("flac: sample count exceeds 36 bits");
        }

        if options.block_size < 16 || options.block_size > 65_535 {
            return encode_error("flac: block size must be between 16 and 65535");
        }

        if !writer.is_seekable() {
            return unsupported_error("flac: sink must support seeking");
        }

        writer.write_buf_bytes(&[0u8; FlacEncoder::HEADER_SIZE])?;
        write_vorbis_comment_block(&mut writer, FlacEncoder::VENDOR, true)?;

        debug!(
            "open flac encoder: rate={} Hz, channels={}, bps={}, block_size={}",
            params.sample_rate, params.channels, params.bits_per_sample, options.block_size
        );

        let stream_info = StreamInfo {
            block_len_min: options.block_size as u16,
            block_len_max: options.block_size as u16,
            frame_byte_len_min: 0,
            frame_byte_len_max: 0,
            sample_rate: params.sample_rate,
            n_channels: params.channels,
            bits_per_sample: params.bits_per_sample,
            n_samples: params.n_samples,
            md5: [0; 16],
        };

        Ok(FlacEncoder {
            params: *params,
            stream_info,
            writer,
            validator: Validator::new(),
            frame_number: 0,
            n_samples_written: 0,
            mid_buf: Vec::new(),
            side_buf: Vec::new(),
            wide_side_buf: Vec::new(),
        })
    }

    /// The stream information accumulated so far.
    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    /// Encodes one block of planar samples as a frame. Every block must be exactly the
    /// configured block size, except the final block of the stream which may be shorter.
    pub fn encode(&mut self, channels: &[&[i32]]) -> Result<()> {
        if channels.len() as u32 != self.params.channels {
            return encode_error("flac: channel count does not match the stream parameters");
        }

        let n_samples = channels[0].len();

        if channels.iter().any(|c| c.len() != n_samples) {
            return encode_error("flac: channels of unequal length");
        }

        if n_samples == 0 {
            return encode_error("flac: empty block");
        }

        let block_size = u64::from(self.stream_info.block_len_max);

        if n_samples as u64 > block_size {
            return encode_error("flac: block exceeds the configured block size");
        }

        // Only the final block may be short, so every block must start on a block boundary.
        if self.n_samples_written % block_size != 0 {
            return encode_error("flac: a short block may only end the stream");
        }

        if self.n_samples_written + n_samples as u64 > self.params.n_samples {
            return encode_error("flac: more samples than the stream declares");
        }

        self.validator.update(channels, self.params.bits_per_sample);

        let frame_len = self.write_frame(channels)?;
        self.stream_info.update_frame_sizes(frame_len);

        self.n_samples_written += n_samples as u64;
        Ok(())
    }

    /// Finalizes the stream: verifies all declared samples were delivered, then seeks back to
    /// the start of the sink and patches STREAMINFO with the final MD5 and frame size bounds.
    /// Returns the flushed sink stream.
    pub fn finish(mut self) -> Result<MediaSinkStream> {
        if self.n_samples_written != self.params.n_samples {
            return end_of_stream_error();
        }

        self.stream_info.md5 = self.validator.md5();

        self.writer.seek(0)?;
        self.writer.write_buf_bytes(b"fLaC")?;

        let header = MetadataBlockHeader {
            is_last: false,
            block_type: MetadataBlockType::StreamInfo,
            block_len: StreamInfo::SIZE,
        };
        header.write(&mut self.writer)?;

        self.writer.write_buf_bytes(&self.stream_info.bytes())?;
        self.writer.flush()?;

        debug!(
            "finish flac stream: frames={}, frame_bytes_min={}, frame_bytes_max={}",
            self.frame_number,
            self.stream_info.frame_byte_len_min,
            self.stream_info.frame_byte_len_max
        );

        Ok(self.writer)
    }

    /// Encodes one frame and returns the exact number of bytes it occupies in the sink.
    fn write_frame(&mut self, channels: &[&[i32]]) -> Result<u32> {
        if self.frame_number > 0x7fff_ffff {
            return limit_error("flac: frame number exceeds 31 bits");
        }

        let bps = self.params.bits_per_sample;
        let wide_side = bps == 32;

        let assignment = if channels.len() == 2 {
            match stereo::choose(channels[0], channels[1]) {
                StereoMode::LeftRight => ChannelAssignment::Independent(2),
                StereoMode::LeftSide => ChannelAssignment::LeftSide,
                StereoMode::SideRight => ChannelAssignment::RightSide,
                StereoMode::MidSide => ChannelAssignment::MidSide,
            }
        }
        else {
            ChannelAssignment::Independent(channels.len() as u32)
        };

        // Derive the decorrelated channels before any part of the frame is written.
        match assignment {
            ChannelAssignment::LeftSide | ChannelAssignment::RightSide => {
                if wide_side {
                    stereo::fill_side_wide(&mut self.wide_side_buf, channels[0], channels[1]);
                }
                else {
                    stereo::fill_side(&mut self.side_buf, channels[0], channels[1]);
                }
            }
            ChannelAssignment::MidSide => {
                stereo::fill_mid(&mut self.mid_buf, channels[0], channels[1]);
                if wide_side {
                    stereo::fill_side_wide(&mut self.wide_side_buf, channels[0], channels[1]);
                }
                else {
                    stereo::fill_side(&mut self.side_buf, channels[0], channels[1]);
                }
            }
            ChannelAssignment::Independent(_) => (),
        }

        let start_pos = self.writer.pos();

        // The whole frame, header and CRC-8 included, is covered by a trailing CRC-16.
        let mut writer_crc16 = MonitorWriteStream::new(&mut self.writer, Crc16Ansi::new(0));

        let header = FrameHeader {
            block_size: channels[0].len() as u32,
            sample_rate: self.params.sample_rate,
            channel_assignment: assignment,
            bits_per_sample: bps,
            frame_number: self.frame_number,
        };

        write_frame_header(&mut writer_crc16, &header)?;

        let mut bw = BitWriterLtr::new(&mut writer_crc16);

        match assignment {
            ChannelAssignment::Independent(_) => {
                for channel in channels {
                    encode_channel(&mut bw, channel, bps)?;
                }
            }
            ChannelAssignment::LeftSide => {
                encode_channel(&mut bw, channels[0], bps)?;
                if wide_side {
                    encode_channel(&mut bw, &self.wide_side_buf, bps + 1)?;
                }
                else {
                    encode_channel(&mut bw, &self.side_buf, bps + 1)?;
                }
            }
            ChannelAssignment::RightSide => {
                if wide_side {
                    encode_channel(&mut bw, &self.wide_side_buf, bps + 1)?;
                }
                else {
                    encode_channel(&mut bw, &self.side_buf, bps + 1)?;
                }
                encode_channel(&mut bw, channels[1], bps)?;
            }
            ChannelAssignment::MidSide => {
                encode_channel(&mut bw, &self.mid_buf, bps)?;
                if wide_side {
                    encode_channel(&mut bw, &self.wide_side_buf, bps + 1)?;
                }
                else {
                    encode_channel(&mut bw, &self.side_buf, bps + 1)?;
                }
            }
        }

        // Pad the subframe bits to a byte boundary, then pop off and append the CRC-16.
        bw.flush()?;

        let crc16 = writer_crc16.monitor().crc();
        writer_crc16.into_inner().write_be_u16(crc16)?;

        self.frame_number += 1;

        Ok((self.writer.pos() - start_pos) as u32)
    }
}

/// Chooses and writes the subframe for one channel.
fn encode_channel<S: Sample, W: WriteBytes>(
    bw: &mut BitWriterLtr<W>,
    samples: &[S],
    sample_size: u32,
) -> Result<()> {
    let choice = subframe::choose(samples, sample_size);
    subframe::write(bw, samples, sample_size, &choice)
}
