// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A lossless FLAC encoder.
//!
//! The encoder consumes channel-planar, sign-extended 32-bit samples and produces a conformant
//! FLAC bitstream: a STREAMINFO metadata block carrying the MD5 of the raw sample bytes, a
//! minimal Vorbis-comment block, and a sequence of frames using constant, verbatim, or
//! fixed-prediction subframes with Rice-coded residuals and optional stereo decorrelation.

mod frame;
mod predict;
mod rice;
mod stereo;
mod subframe;
mod validate;

pub mod encoder;
pub mod metadata;

pub use encoder::{EncoderOptions, FlacEncoder, StreamParameters};
pub use metadata::StreamInfo;
