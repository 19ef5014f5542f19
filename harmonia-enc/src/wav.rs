// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal RIFF/WAVE PCM reader: enough of the container to feed the encoder planar,
//! sign-extended samples.

use std::fs::File;
use std::io;
use std::io::{BufReader, Read};
use std::path::Path;

use harmonia_core::errors::{end_of_stream_error, unsupported_error, Error, Result};

/// The format of the samples in a WAVE file's data chunk.
#[derive(Clone, Copy, Debug)]
pub struct WavSpec {
    pub n_channels: u32,
    pub bits_per_sample: u32,
    pub sample_rate: u32,
    /// The number of whole inter-channel samples in the data chunk.
    pub n_samples: u64,
}

/// Reads PCM samples from a WAVE file's data chunk.
pub struct WavReader<R: Read> {
    reader: R,
    spec: WavSpec,
    /// Bytes of the data chunk not yet consumed.
    bytes_left: u64,
    buf: Vec<u8>,
}

impl WavReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        WavReader::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> WavReader<R> {
    /// Parses the RIFF preamble and chunks up to the start of the data chunk.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut preamble = [0u8; 12];
        read_exact(&mut reader, &mut preamble)?;

        if &preamble[0..4] != b"RIFF" || &preamble[8..12] != b"WAVE" {
            return unsupported_error("wav: not a RIFF/WAVE file");
        }

        let mut fmt: Option<(WavSpec, u32)> = None;

        loop {
            let mut chunk_header = [0u8; 8];
            read_exact(&mut reader, &mut chunk_header)?;

            let chunk_len = u32::from_le_bytes(chunk_header[4..8].try_into().unwrap());

            match &chunk_header[0..4] {
                b"fmt " => {
                    fmt = Some(read_fmt_chunk(&mut reader, chunk_len)?);
                }
                b"data" => {
                    let (mut spec, block_align) = match fmt {
                        Some(fmt) => fmt,
                        None => return unsupported_error("wav: data chunk precedes fmt chunk"),
                    };

                    spec.n_samples = u64::from(chunk_len) / u64::from(block_align);

                    return Ok(WavReader {
                        reader,
                        spec,
                        bytes_left: u64::from(chunk_len),
                        buf: Vec::new(),
                    });
                }
                _ => {
                    // Skip unknown chunks; chunk bodies are padded to an even length.
                    let skip = u64::from(chunk_len) + u64::from(chunk_len & 1);
                    io::copy(&mut (&mut reader).take(skip), &mut io::sink())?;
                }
            }
        }
    }

    pub fn spec(&self) -> &WavSpec {
        &self.spec
    }

    /// Reads up to `max_frames` inter-channel samples, appending each channel's samples,
    /// sign-extended to 32 bits, to the matching planar buffer. The buffers are cleared first.
    ///
    /// Returns the number of samples read per channel; zero at the end of the data chunk. A data
    /// chunk that ends inside a channel group is an incomplete stream.
    pub fn read_block(&mut self, channels: &mut [Vec<i32>], max_frames: usize) -> Result<usize> {
        let n_channels = self.spec.n_channels as usize;
        let bytes_per_sample = (self.spec.bits_per_sample / 8) as usize;
        let group_len = (n_channels * bytes_per_sample) as u64;

        debug_assert_eq!(channels.len(), n_channels);

        let n_frames = (self.bytes_left / group_len).min(max_frames as u64) as usize;

        if n_frames == 0 {
            if self.bytes_left > 0 {
                // A trailing partial channel group.
                return end_of_stream_error();
            }
            return Ok(0);
        }

        let n_bytes = n_frames * group_len as usize;
        self.buf.resize(n_bytes, 0);

        read_exact(&mut self.reader, &mut self.buf).map_err(|err| match err {
            // The file ended before the data chunk's declared length.
            Error::Unsupported(_) => Error::EndOfStream,
            err => err,
        })?;

        self.bytes_left -= n_bytes as u64;

        for channel in channels.iter_mut() {
            channel.clear();
            channel.reserve(n_frames);
        }

        for (i, group) in self.buf.chunks_exact(bytes_per_sample).enumerate() {
            let sample = match bytes_per_sample {
                // 8-bit WAVE samples are unsigned; re-centre them to signed.
                1 => i32::from(group[0]) - 128,
                2 => i32::from(i16::from_le_bytes([group[0], group[1]])),
                3 => (u32::from_le_bytes([0, group[0], group[1], group[2]]) as i32) >> 8,
                4 => i32::from_le_bytes(group.try_into().unwrap()),
                _ => unreachable!(),
            };

            channels[i % n_channels].push(sample);
        }

        Ok(n_frames)
    }
}

/// Reads exactly `buf.len()` bytes; a clean end of file inside the read is reported as an
/// unsupported (truncated) file.
fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            unsupported_error("wav: unexpected end of file")
        }
        Err(err) => Err(err.into()),
    }
}

fn read_fmt_chunk<R: Read>(reader: &mut R, chunk_len: u32) -> Result<(WavSpec, u32)> {
    if chunk_len < 16 {
        return unsupported_error("wav: malformed fmt chunk");
    }

    let mut body = [0u8; 16];
    read_exact(reader, &mut body)?;

    let format_tag = u16::from_le_bytes(body[0..2].try_into().unwrap());
    let n_channels = u16::from_le_bytes(body[2..4].try_into().unwrap());
    let sample_rate = u32::from_le_bytes(body[4..8].try_into().unwrap());
    let block_align = u16::from_le_bytes(body[12..14].try_into().unwrap());
    let bits_per_sample = u16::from_le_bytes(body[14..16].try_into().unwrap());

    let mut remaining = u64::from(chunk_len) - 16 + u64::from(chunk_len & 1);

    match format_tag {
        // Plain PCM.
        0x0001 => (),
        // WAVE_FORMAT_EXTENSIBLE carrying the PCM sub-format.
        0xfffe => {
            // The extension length field plus the 22-byte extension: the valid bit count, the
            // channel mask, and the sub-format GUID of which the leading two bytes are the
            // format code.
            if remaining < 24 {
                return unsupported_error("wav: malformed extensible fmt chunk");
            }

            let mut extension = [0u8; 24];
            read_exact(reader, &mut extension)?;
            remaining -= 24;

            let sub_format = u16::from_le_bytes(extension[8..10].try_into().unwrap());
            if sub_format != 0x0001 {
                return unsupported_error("wav: only PCM data is supported");
            }
        }
        _ => return unsupported_error("wav: only PCM data is supported"),
    }

    if !matches!(bits_per_sample, 8 | 16 | 24 | 32) {
        return unsupported_error("wav: bits per sample must be 8, 16, 24, or 32");
    }

    if n_channels == 0 {
        return unsupported_error("wav: stream must have at least one channel");
    }

    if u32::from(block_align) != u32::from(n_channels) * u32::from(bits_per_sample) / 8 {
        return unsupported_error("wav: block alignment does not match the sample format");
    }

    // Skip any remaining extension bytes and padding.
    io::copy(&mut reader.take(remaining), &mut io::sink())?;

    let spec = WavSpec {
        n_channels: u32::from(n_channels),
        bits_per_sample: u32::from(bits_per_sample),
        sample_rate,
        n_samples: 0,
    };

    Ok((spec, u32::from(block_align)))
}
