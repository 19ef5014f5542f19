// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subframe selection and emission: each channel of a frame is coded constant, verbatim, or with
//! a fixed predictor and Rice-coded residuals, whichever is estimated smallest.

use harmonia_core::errors::Result;
use harmonia_core::io::{BitWriterLtr, WriteBitsLtr, WriteBytes};

use crate::predict;
use crate::predict::Sample;
use crate::rice;
use crate::rice::RiceConfig;

/// The sample width at and above which fixed-prediction residuals can overflow 32 bits and must
/// be range checked.
const RANGE_CHECK_WIDTH: u32 = 28;

/// The chosen representation of one channel within a frame.
///
/// A `Fixed` choice owns its residual set; it is dropped when the frame write completes.
#[derive(Debug)]
pub enum SubframeChoice {
    /// Every sample in the subframe has the same value.
    Constant,
    /// Samples are stored uncompressed.
    Verbatim,
    /// Samples are coded as warm-ups plus Rice-coded fixed-prediction residuals.
    Fixed { order: u32, residuals: Vec<i32>, rice: RiceConfig },
}

/// Selects the smallest estimated representation for one channel of `sample_size`-bit samples.
pub fn choose<S: Sample>(samples: &[S], sample_size: u32) -> SubframeChoice {
    let n = samples.len();

    if samples.iter().all(|&s| s == samples[0]) {
        return SubframeChoice::Constant;
    }

    // Too short for any predictor to beat its own warm-ups.
    if n <= 4 {
        return SubframeChoice::Verbatim;
    }

    let verbatim_bits = (n as u64) * u64::from(sample_size);

    let order = match predict::best_order(samples, sample_size >= RANGE_CHECK_WIDTH) {
        Some(order) => order,
        None => return SubframeChoice::Verbatim,
    };

    let mut residuals = Vec::new();
    predict::build_residuals(samples, order, &mut residuals);

    let max_param = if sample_size <= 16 { 14 } else { rice::MAX_RICE_PARAM };
    let (rice_bits, config) =
        rice::find_optimal_config(&residuals, order, rice::MAX_PARTITION_ORDER, max_param);

    let fixed_bits = rice_bits + u64::from(order) * u64::from(sample_size);

    if fixed_bits < verbatim_bits {
        SubframeChoice::Fixed { order, residuals, rice: config }
    }
    else {
        SubframeChoice::Verbatim
    }
}

/// Writes one subframe: the subframe header (a zero pad bit, the 6-bit coding type, and a zero
/// wasted-bits flag), then the body of the chosen representation.
pub fn write<S: Sample, W: WriteBytes>(
    bw: &mut BitWriterLtr<W>,
    samples: &[S],
    sample_size: u32,
    choice: &SubframeChoice,
) -> Result<()> {
    match choice {
        SubframeChoice::Constant => {
            bw.write_bits_leq32(8, 0x00)?;
            bw.write_bits_leq64_signed(sample_size, samples[0].as_i64())?;
        }
        SubframeChoice::Verbatim => {
            bw.write_bits_leq32(8, 0x02)?;

            for s in samples {
                bw.write_bits_leq64_signed(sample_size, s.as_i64())?;
            }
        }
        SubframeChoice::Fixed { order, residuals, rice } => {
            bw.write_bits_leq32(8, (8 | order) << 1)?;

            for s in &samples[..*order as usize] {
                bw.write_bits_leq64_signed(sample_size, s.as_i64())?;
            }

            write_residuals(bw, residuals, *order, rice)?;
        }
    }

    Ok(())
}

/// Writes the coded residual section: the 2-bit method, the 4-bit partition order, then each
/// partition's parameter field and Rice-coded residuals.
fn write_residuals<W: WriteBytes>(
    bw: &mut BitWriterLtr<W>,
    residuals: &[i32],
    pred_order: u32,
    config: &RiceConfig,
) -> Result<()> {
    bw.write_bits_leq32(2, config.method.code())?;
    bw.write_bits_leq32(4, config.partition_order)?;

    let part_len = residuals.len() >> config.partition_order;
    let param_width = config.method.param_bit_width();

    let mut next = pred_order as usize;

    for (j, &k) in config.params.iter().enumerate() {
        // The escape parameter is reserved; this encoder never produces it.
        debug_assert!(k < rice::PARAM_ESCAPE);

        bw.write_bits_leq32(param_width, k)?;

        let end = (j + 1) * part_len;

        for &r in &residuals[next..end] {
            let folded = rice::zigzag(r);

            bw.write_unary_zeros(folded >> k)?;
            bw.write_bits_leq64(k, folded & ((1 << k) - 1))?;
        }

        next = end;
    }

    debug_assert_eq!(next, residuals.len());
    Ok(())
}
