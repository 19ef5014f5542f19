// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// `Validator` computes the MD5 checksum of an audio stream taking into account the
/// peculiarities of FLAC's MD5 validation scheme.
pub struct Validator {
    state: md5::Context,
    buf: Vec<u8>,
}

impl Validator {
    pub fn new() -> Validator {
        Validator { state: md5::Context::new(), buf: Vec::new() }
    }

    /// Processes one block of planar samples and updates the state of the validator.
    pub fn update(&mut self, channels: &[&[i32]], bps: u32) {
        // The MD5 checksum is calculated over interleaved audio samples of the stream's true
        // sample width, as little-endian bytes. The encoder works on planar, sign-extended
        // 32-bit samples exclusively, so each sample is truncated back to its true byte width
        // and interlaced into a byte buffer before being fed to the MD5 algorithm.
        let bytes_per_sample = match bps {
            1..=8 => 1,
            9..=16 => 2,
            17..=24 => 3,
            25..=32 => 4,
            _ => unreachable!(),
        };

        let n_frames = channels.first().map_or(0, |c| c.len());

        self.buf.clear();
        self.buf.reserve(n_frames * channels.len() * bytes_per_sample);

        for i in 0..n_frames {
            for channel in channels {
                let bytes = channel[i].to_le_bytes();
                self.buf.extend_from_slice(&bytes[..bytes_per_sample]);
            }
        }

        self.state.consume(&self.buf);
    }

    /// Finalizes and returns the computed MD5 hash.
    pub fn md5(self) -> [u8; 16] {
        self.state.compute().0
    }
}

impl Default for Validator {
    fn default() -> Self {
        Validator::new()
    }
}
