// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lossless round-trip tests: every encoded stream is decoded again by an independent,
//! test-local FLAC reader and compared sample-for-sample against the input. The reader also
//! verifies both frame CRCs and the STREAMINFO accounting along the way.

use std::io;
use std::io::{Cursor, Seek, Write};
use std::sync::{Arc, Mutex};

use harmonia_core::checksum::{Crc16Ansi, Crc8Ccitt};
use harmonia_core::io::{MediaSink, MediaSinkStream, Monitor};

use harmonia_bundle_flac::{EncoderOptions, FlacEncoder, StreamParameters};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// A seekable in-memory sink that can be observed after the encoder is finished.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedSink {
    fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().get_ref().clone()
    }
}

impl io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}

impl io::Seek for SharedSink {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.0.lock().unwrap().seek(pos)
    }
}

impl MediaSink for SharedSink {
    fn is_seekable(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------------------------
// A minimal FLAC stream reader, independent of the encoder's code paths.
// ---------------------------------------------------------------------------------------------

struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn at_byte(buf: &'a [u8], byte_pos: usize) -> Self {
        BitReader { buf, pos: byte_pos * 8 }
    }

    fn read_bits(&mut self, width: u32) -> u64 {
        let mut value = 0;
        for _ in 0..width {
            let bit = (self.buf[self.pos >> 3] >> (7 - (self.pos & 0x7))) & 1;
            value = (value << 1) | u64::from(bit);
            self.pos += 1;
        }
        value
    }

    fn read_signed(&mut self, width: u32) -> i64 {
        let value = self.read_bits(width);
        (value.wrapping_shl(64 - width) as i64).wrapping_shr(64 - width)
    }

    fn read_unary_zeros(&mut self) -> u64 {
        let mut num = 0;
        while self.read_bits(1) == 0 {
            num += 1;
        }
        num
    }

    fn align(&mut self) {
        self.pos = (self.pos + 7) & !0x7;
    }

    fn byte_pos(&self) -> usize {
        assert_eq!(self.pos % 8, 0);
        self.pos / 8
    }
}

struct DecodedStreamInfo {
    block_len_min: u16,
    block_len_max: u16,
    frame_byte_len_min: u32,
    frame_byte_len_max: u32,
    sample_rate: u32,
    n_channels: u32,
    bits_per_sample: u32,
    n_samples: u64,
    md5: [u8; 16],
}

struct DecodedFrame {
    byte_len: u32,
    block_size: u32,
    block_size_code: u32,
    channel_code: u32,
}

struct DecodedStream {
    info: DecodedStreamInfo,
    frames: Vec<DecodedFrame>,
    channels: Vec<Vec<i32>>,
}

fn decode_stream_info(payload: &[u8]) -> DecodedStreamInfo {
    assert_eq!(payload.len(), 34);

    let packed = u64::from_be_bytes(payload[10..18].try_into().unwrap());

    DecodedStreamInfo {
        block_len_min: u16::from_be_bytes(payload[0..2].try_into().unwrap()),
        block_len_max: u16::from_be_bytes(payload[2..4].try_into().unwrap()),
        frame_byte_len_min: u32::from_be_bytes([0, payload[4], payload[5], payload[6]]),
        frame_byte_len_max: u32::from_be_bytes([0, payload[7], payload[8], payload[9]]),
        sample_rate: (packed >> 44) as u32,
        n_channels: ((packed >> 41) & 0x7) as u32 + 1,
        bits_per_sample: ((packed >> 36) & 0x1f) as u32 + 1,
        n_samples: packed & 0xf_ffff_ffff,
        md5: payload[18..34].try_into().unwrap(),
    }
}

fn decode_utf8_u64(reader: &mut BitReader<'_>) -> u64 {
    let first = reader.read_bits(8);

    if first < 0x80 {
        return first;
    }

    let mut n_continuation = 0;
    let mut mask = first;
    while mask & 0x40 != 0 {
        n_continuation += 1;
        mask <<= 1;
    }

    let mut value = first & (0x3f >> n_continuation);
    for _ in 0..n_continuation {
        let byte = reader.read_bits(8);
        assert_eq!(byte & 0xc0, 0x80);
        value = (value << 6) | (byte & 0x3f);
    }

    value
}

fn decode_subframe(reader: &mut BitReader<'_>, n: usize, sample_size: u32) -> Vec<i64> {
    assert_eq!(reader.read_bits(1), 0, "subframe pad bit");
    let coding = reader.read_bits(6);
    assert_eq!(reader.read_bits(1), 0, "wasted bits flag");

    match coding {
        0x00 => vec![reader.read_signed(sample_size); n],
        0x01 => (0..n).map(|_| reader.read_signed(sample_size)).collect(),
        0x08..=0x0c => {
            let order = (coding & 0x7) as usize;

            let mut out: Vec<i64> = (0..order).map(|_| reader.read_signed(sample_size)).collect();

            let method = reader.read_bits(2);
            assert!(method <= 1, "reserved residual method");
            let param_width = if method == 0 { 4 } else { 5 };

            let part_order = reader.read_bits(4) as usize;
            let part_len = n >> part_order;
            assert_eq!(part_len << part_order, n, "partitions must tile the block");

            for j in 0..(1usize << part_order) {
                let k = reader.read_bits(param_width) as u32;
                assert!(k < (1 << param_width) - 1, "escaped partitions are never emitted");

                let count = part_len - if j == 0 { order } else { 0 };

                for _ in 0..count {
                    let folded = (reader.read_unary_zeros() << k) | reader.read_bits(k);
                    let residual = ((folded >> 1) as i64) ^ -((folded & 1) as i64);

                    let i = out.len();
                    let s = |d: usize| out[i - d];
                    let prediction = match order {
                        0 => 0,
                        1 => s(1),
                        2 => 2 * s(1) - s(2),
                        3 => 3 * s(1) - 3 * s(2) + s(3),
                        4 => 4 * s(1) - 6 * s(2) + 4 * s(3) - s(4),
                        _ => unreachable!(),
                    };
                    out.push(residual + prediction);
                }
            }

            assert_eq!(out.len(), n);
            out
        }
        _ => panic!("unexpected subframe coding {}", coding),
    }
}

fn decode_stream(data: &[u8]) -> DecodedStream {
    assert_eq!(&data[0..4], b"fLaC");

    let mut pos = 4;
    let mut info = None;

    // Walk the metadata blocks.
    loop {
        let header = data[pos];
        let block_len =
            u32::from_be_bytes([0, data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;

        if header & 0x7f == 0 {
            info = Some(decode_stream_info(&data[pos + 4..pos + 4 + block_len]));
        }

        pos += 4 + block_len;

        if header & 0x80 != 0 {
            break;
        }
    }

    let info = info.expect("missing STREAMINFO");
    let mut channels: Vec<Vec<i32>> = vec![Vec::new(); info.n_channels as usize];
    let mut frames = Vec::new();

    while pos < data.len() {
        let frame_start = pos;

        // Sync code, reserved bit, and the fixed blocking strategy.
        assert_eq!(data[pos], 0xff);
        assert_eq!(data[pos + 1], 0xf8);

        let mut reader = BitReader::at_byte(data, pos + 2);

        let block_size_code = reader.read_bits(4) as u32;
        let sample_rate_code = reader.read_bits(4) as u32;
        let channel_code = reader.read_bits(4) as u32;
        let bps_code = reader.read_bits(3) as u32;
        assert_eq!(reader.read_bits(1), 0, "reserved header bit");

        let frame_number = decode_utf8_u64(&mut reader);
        assert_eq!(frame_number, frames.len() as u64, "frame numbers are sequential");

        let block_size = match block_size_code {
            0x1 => 192,
            0x2..=0x5 => 576 << (block_size_code - 2),
            0x6 => reader.read_bits(8) as u32 + 1,
            0x7 => reader.read_bits(16) as u32 + 1,
            0x8..=0xf => 256 << (block_size_code - 8),
            _ => panic!("reserved block size code"),
        };

        let sample_rate = match sample_rate_code {
            0x0 => info.sample_rate,
            0x1 => 88_200,
            0x2 => 176_400,
            0x3 => 192_000,
            0x4 => 8_000,
            0x5 => 16_000,
            0x6 => 22_050,
            0x7 => 24_000,
            0x8 => 32_000,
            0x9 => 44_100,
            0xa => 48_000,
            0xb => 96_000,
            0xc => reader.read_bits(8) as u32 * 1000,
            0xd => reader.read_bits(16) as u32,
            0xe => reader.read_bits(16) as u32 * 10,
            _ => panic!("reserved sample rate code"),
        };
        assert_eq!(sample_rate, info.sample_rate);

        let bps = match bps_code {
            0x1 => 8,
            0x4 => 16,
            0x6 => 24,
            0x7 => 32,
            _ => panic!("unexpected sample size code"),
        };
        assert_eq!(bps, info.bits_per_sample);

        reader.align();
        let header_end = reader.byte_pos();

        // CRC-8 covers exactly the header bytes before it.
        let mut crc8 = Crc8Ccitt::new(0);
        crc8.process_buf_bytes(&data[frame_start..header_end]);
        assert_eq!(crc8.crc(), data[header_end], "frame header CRC-8");

        let mut reader = BitReader::at_byte(data, header_end + 1);
        let n = block_size as usize;

        let decoded: Vec<Vec<i64>> = match channel_code {
            0x0..=0x7 => {
                (0..=channel_code).map(|_| decode_subframe(&mut reader, n, bps)).collect()
            }
            0x8 => {
                let left = decode_subframe(&mut reader, n, bps);
                let side = decode_subframe(&mut reader, n, bps + 1);
                let right = left.iter().zip(&side).map(|(&l, &s)| l - s).collect();
                vec![left, right]
            }
            0x9 => {
                let side = decode_subframe(&mut reader, n, bps + 1);
                let right = decode_subframe(&mut reader, n, bps);
                let left = right.iter().zip(&side).map(|(&r, &s)| r + s).collect();
                vec![left, right]
            }
            0xa => {
                let mid = decode_subframe(&mut reader, n, bps);
                let side = decode_subframe(&mut reader, n, bps + 1);

                let mut left = Vec::with_capacity(n);
                let mut right = Vec::with_capacity(n);
                for (&m, &s) in mid.iter().zip(&side) {
                    let m = (m << 1) | (s & 1);
                    left.push((m + s) >> 1);
                    right.push((m - s) >> 1);
                }
                vec![left, right]
            }
            _ => panic!("reserved channel assignment"),
        };

        reader.align();
        let frame_end = reader.byte_pos();

        // CRC-16 covers the whole frame including the CRC-8 and padding, excluding itself.
        let mut crc16 = Crc16Ansi::new(0);
        crc16.process_buf_bytes(&data[frame_start..frame_end]);
        let expected = u16::from_be_bytes([data[frame_end], data[frame_end + 1]]);
        assert_eq!(crc16.crc(), expected, "frame CRC-16");

        pos = frame_end + 2;

        for (channel, samples) in channels.iter_mut().zip(&decoded) {
            channel.extend(samples.iter().map(|&s| i32::try_from(s).unwrap()));
        }

        frames.push(DecodedFrame {
            byte_len: (pos - frame_start) as u32,
            block_size,
            block_size_code,
            channel_code,
        });
    }

    DecodedStream { info, frames, channels }
}

// ---------------------------------------------------------------------------------------------
// Round-trip harness.
// ---------------------------------------------------------------------------------------------

fn encode(params: &StreamParameters, options: &EncoderOptions, channels: &[Vec<i32>]) -> Vec<u8> {
    let sink = SharedSink::default();
    let writer = MediaSinkStream::new(Box::new(sink.clone()));

    let mut encoder = FlacEncoder::try_new(params, options, writer).unwrap();

    let total = channels[0].len();
    let block_size = options.block_size as usize;

    let mut offset = 0;
    while offset < total {
        let len = block_size.min(total - offset);
        let block: Vec<&[i32]> = channels.iter().map(|c| &c[offset..offset + len]).collect();
        encoder.encode(&block).unwrap();
        offset += len;
    }

    encoder.finish().unwrap();
    sink.bytes()
}

/// Encodes the given channels, decodes the result with the test-local reader, and checks the
/// lossless round-trip, the embedded MD5, and the STREAMINFO frame accounting.
fn roundtrip(
    params: &StreamParameters,
    options: &EncoderOptions,
    channels: &[Vec<i32>],
) -> DecodedStream {
    let data = encode(params, options, channels);
    let decoded = decode_stream(&data);

    // Sample-exact reconstruction.
    assert_eq!(decoded.channels, channels);

    // The embedded MD5 matches an independent hash of the raw little-endian sample bytes.
    let bytes_per_sample = (params.bits_per_sample / 8) as usize;
    let mut raw = Vec::new();
    for i in 0..channels[0].len() {
        for channel in channels {
            raw.extend_from_slice(&channel[i].to_le_bytes()[..bytes_per_sample]);
        }
    }
    assert_eq!(decoded.info.md5, md5::compute(&raw).0);

    assert_eq!(decoded.info.n_samples, channels[0].len() as u64);
    assert_eq!(decoded.info.n_channels, params.channels);
    assert_eq!(decoded.info.bits_per_sample, params.bits_per_sample);
    assert_eq!(decoded.info.sample_rate, params.sample_rate);
    assert_eq!(u32::from(decoded.info.block_len_min), options.block_size);
    assert_eq!(u32::from(decoded.info.block_len_max), options.block_size);

    // STREAMINFO frame byte bounds match the measured frame extents exactly.
    let min_len = decoded.frames.iter().map(|f| f.byte_len).min().unwrap();
    let max_len = decoded.frames.iter().map(|f| f.byte_len).max().unwrap();
    assert_eq!(decoded.info.frame_byte_len_min, min_len);
    assert_eq!(decoded.info.frame_byte_len_max, max_len);

    decoded
}

fn gen_samples(rng: &mut SmallRng, bps: u32, n: usize) -> Vec<i32> {
    let hi = 1i64 << (bps - 1);
    (0..n).map(|_| rng.random_range(-hi..hi) as i32).collect()
}

fn params(channels: u32, bps: u32, sample_rate: u32, n_samples: u64) -> StreamParameters {
    StreamParameters { channels, bits_per_sample: bps, sample_rate, n_samples }
}

// ---------------------------------------------------------------------------------------------
// Scenarios.
// ---------------------------------------------------------------------------------------------

#[test]
fn roundtrip_constant_mono() {
    let channels = vec![vec![0x1234; 10]];
    let decoded =
        roundtrip(&params(1, 16, 44_100, 10), &EncoderOptions::default(), &channels);

    assert_eq!(decoded.frames.len(), 1);
    assert_eq!(decoded.frames[0].block_size, 10);
    assert_eq!(decoded.frames[0].block_size_code, 0x6);
}

#[test]
fn roundtrip_ramp() {
    let channels = vec![(0..64).collect()];
    let decoded = roundtrip(&params(1, 16, 44_100, 64), &EncoderOptions::default(), &channels);

    // Strictly smaller than verbatim.
    assert!(decoded.frames[0].byte_len < 64 * 2);
}

#[test]
fn roundtrip_identical_stereo_channels() {
    let mut rng = SmallRng::seed_from_u64(0x0001);

    let left = gen_samples(&mut rng, 16, 128);
    let channels = vec![left.clone(), left];

    let decoded =
        roundtrip(&params(2, 16, 44_100, 128), &EncoderOptions::default(), &channels);

    // Identical channels settle on mid/side with an all-zero side channel.
    assert_eq!(decoded.frames[0].channel_code, 0xa);
}

#[test]
fn roundtrip_short_stereo_block() {
    // A 4-sample stream is too short for any predictor; both subframes fall back to verbatim.
    let channels = vec![vec![9, -7, 1, 4], vec![-3, 3, -3, 3]];
    let decoded = roundtrip(&params(2, 16, 44_100, 4), &EncoderOptions::default(), &channels);

    assert_eq!(decoded.frames.len(), 1);
    assert_eq!(decoded.frames[0].block_size, 4);
    assert_eq!(decoded.frames[0].block_size_code, 0x6);
}

#[test]
fn roundtrip_final_short_frame() {
    let mut rng = SmallRng::seed_from_u64(0x0002);

    let channels = vec![gen_samples(&mut rng, 16, 4096 + 1200)];
    let decoded =
        roundtrip(&params(1, 16, 44_100, 4096 + 1200), &EncoderOptions::default(), &channels);

    assert_eq!(decoded.frames.len(), 2);
    assert_eq!(decoded.frames[0].block_size, 4096);
    assert_eq!(decoded.frames[1].block_size, 1200);

    // The tail takes the uncommon-16-bit block size path.
    assert_eq!(decoded.frames[1].block_size_code, 0x7);
}

#[test]
fn roundtrip_sine_24_bit() {
    // One second of a 1 kHz sine at 48 kHz, 24-bit.
    let channels = vec![(0..48_000)
        .map(|i| {
            let t = f64::from(i) / 48_000.0;
            (0.8 * f64::from(1 << 23) * f64::sin(2.0 * std::f64::consts::PI * 1000.0 * t)) as i32
        })
        .collect::<Vec<i32>>()];

    let decoded =
        roundtrip(&params(1, 24, 48_000, 48_000), &EncoderOptions::default(), &channels);

    // A smooth signal must compress.
    let total: u32 = decoded.frames.iter().map(|f| f.byte_len).sum();
    assert!((total as usize) < 48_000 * 3);
}

#[test]
fn roundtrip_correlated_stereo() {
    let mut rng = SmallRng::seed_from_u64(0x0003);

    let base: Vec<i32> = (0..10_000)
        .map(|i| (2000.0 * f64::sin(f64::from(i) * 2.0 * std::f64::consts::PI * 220.0 / 44_100.0)) as i32)
        .collect();

    let left: Vec<i32> = base.iter().map(|&b| b + rng.random_range(-30..30)).collect();
    let right: Vec<i32> = base.iter().map(|&b| b - rng.random_range(-30..30)).collect();

    roundtrip(&params(2, 16, 44_100, 10_000), &EncoderOptions::default(), &[left, right]);
}

#[test]
fn roundtrip_8_bit() {
    let mut rng = SmallRng::seed_from_u64(0x0004);

    let channels = vec![gen_samples(&mut rng, 8, 3000)];
    roundtrip(&params(1, 8, 8_000, 3000), &EncoderOptions::default(), &channels);
}

#[test]
fn roundtrip_32_bit_stereo() {
    let mut rng = SmallRng::seed_from_u64(0x0005);

    let channels = vec![gen_samples(&mut rng, 32, 5000), gen_samples(&mut rng, 32, 5000)];
    roundtrip(&params(2, 32, 96_000, 5000), &EncoderOptions::default(), &channels);
}

#[test]
fn roundtrip_32_bit_wide_side_channel() {
    // Anticorrelated full-scale channels force a 33-bit side signal through the wide path.
    let mut rng = SmallRng::seed_from_u64(0x0006);

    let left = gen_samples(&mut rng, 32, 4096);
    let right: Vec<i32> = left.iter().map(|&l| l.saturating_neg()).collect();

    roundtrip(&params(2, 32, 192_000, 4096), &EncoderOptions::default(), &[left, right]);
}

#[test]
fn roundtrip_three_channels() {
    let mut rng = SmallRng::seed_from_u64(0x0007);

    let channels: Vec<Vec<i32>> = (0..3).map(|_| gen_samples(&mut rng, 16, 2500)).collect();
    let decoded = roundtrip(&params(3, 16, 32_000, 2500), &EncoderOptions::default(), &channels);

    assert_eq!(decoded.frames[0].channel_code, 2);
}

#[test]
fn roundtrip_silence() {
    let channels = vec![vec![0; 9000], vec![0; 9000]];
    let decoded = roundtrip(&params(2, 16, 44_100, 9000), &EncoderOptions::default(), &channels);

    // Three frames of silence code to almost nothing.
    assert!(decoded.info.frame_byte_len_max < 64);
}

#[test]
fn roundtrip_uncommon_sample_rates() {
    let mut rng = SmallRng::seed_from_u64(0x0008);

    for rate in [44_101, 123_000, 655_350, 655_351] {
        let channels = vec![gen_samples(&mut rng, 16, 1000)];
        roundtrip(&params(1, 16, rate, 1000), &EncoderOptions::default(), &channels);
    }
}

#[test]
fn roundtrip_many_small_frames() {
    // 200 frames of 16 samples: exercises multi-byte UTF-8 frame numbers.
    let mut rng = SmallRng::seed_from_u64(0x0009);

    let channels = vec![gen_samples(&mut rng, 16, 200 * 16)];
    let decoded = roundtrip(
        &params(1, 16, 44_100, 200 * 16),
        &EncoderOptions { block_size: 16 },
        &channels,
    );

    assert_eq!(decoded.frames.len(), 200);
}
