// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stereo decorrelation: estimating which of the four channel pairings codes a 2-channel frame
//! smallest, and deriving the mid and side channels.
//!
//! Mid is the average `(L + R) >> 1` and side is the difference `L - R`. A decoder restores the
//! pair by reattaching the bit lost to the average from the parity of the side channel, so the
//! pairing is exactly reversible.

use crate::rice;

/// The four ways of pairing the channels of a stereo frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StereoMode {
    /// Both channels coded independently.
    LeftRight,
    /// The left channel and the difference channel.
    LeftSide,
    /// The difference channel and the right channel.
    SideRight,
    /// The average channel and the difference channel.
    MidSide,
}

/// Estimates the cheapest stereo mode for the given channel pair.
///
/// Rather than running the full subframe search four times, a second-order fixed predictor is
/// evaluated over both channels in a single pass, accumulating the absolute residual sums of the
/// left, right, mid, and side variants. Each sum is converted to an approximate Rice bit cost and
/// the four pairings are compared; later candidates win ties, so a perfectly correlated pair
/// settles on mid/side.
pub fn choose(left: &[i32], right: &[i32]) -> StereoMode {
    debug_assert_eq!(left.len(), right.len());

    let n = left.len();

    let mut sum_left = 0u64;
    let mut sum_right = 0u64;
    let mut sum_mid = 0u64;
    let mut sum_side = 0u64;

    for i in 2..n {
        let l = i64::from(left[i]) - 2 * i64::from(left[i - 1]) + i64::from(left[i - 2]);
        let r = i64::from(right[i]) - 2 * i64::from(right[i - 1]) + i64::from(right[i - 2]);

        sum_left += l.unsigned_abs();
        sum_right += r.unsigned_abs();
        sum_mid += ((l + r) >> 1).unsigned_abs();
        sum_side += (l - r).unsigned_abs();
    }

    let n = n as u64;

    let bits_left = rice::estimate_bits(2 * sum_left, n);
    let bits_right = rice::estimate_bits(2 * sum_right, n);
    let bits_mid = rice::estimate_bits(2 * sum_mid, n);
    let bits_side = rice::estimate_bits(2 * sum_side, n);

    let candidates = [
        (StereoMode::LeftRight, bits_left + bits_right),
        (StereoMode::LeftSide, bits_left + bits_side),
        (StereoMode::SideRight, bits_side + bits_right),
        (StereoMode::MidSide, bits_mid + bits_side),
    ];

    let mut best = candidates[0];
    for &candidate in &candidates[1..] {
        if candidate.1 <= best.1 {
            best = candidate;
        }
    }

    best.0
}

/// Fills `out` with the mid channel `(L + R) >> 1`. The average of two 32-bit samples always
/// fits 32 bits.
pub fn fill_mid(out: &mut Vec<i32>, left: &[i32], right: &[i32]) {
    out.clear();
    out.extend(
        left.iter()
            .zip(right)
            .map(|(&l, &r)| ((i64::from(l) + i64::from(r)) >> 1) as i32),
    );
}

/// Fills `out` with the side channel `L - R` for sample depths up to 31 bits, where the
/// difference fits 32 bits.
pub fn fill_side(out: &mut Vec<i32>, left: &[i32], right: &[i32]) {
    out.clear();
    out.extend(left.iter().zip(right).map(|(&l, &r)| l - r));
}

/// Fills `out` with the side channel `L - R` in wide storage for 32-bit deep streams, where the
/// difference needs 33 bits.
pub fn fill_side_wide(out: &mut Vec<i64>, left: &[i32], right: &[i32]) {
    out.clear();
    out.extend(left.iter().zip(right).map(|(&l, &r)| i64::from(l) - i64::from(r)));
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::{choose, fill_mid, fill_side, fill_side_wide, StereoMode};

    #[test]
    fn verify_identical_channels_pick_mid_side() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let left: Vec<i32> = (0..128).map(|_| rng.random_range(-30_000..30_000)).collect();
        let right = left.clone();

        assert_eq!(choose(&left, &right), StereoMode::MidSide);
    }

    #[test]
    fn verify_uncorrelated_channels_pick_left_right() {
        // The side difference is rougher than either channel, so independent coding wins.
        let left = [0, 100, -200, 300, -400, 500, -600, 700];
        let right = [50, -50, 50, -50, 50, -50, 50, -50];

        assert_eq!(choose(&left, &right), StereoMode::LeftRight);
    }

    #[test]
    fn verify_nearly_identical_channels_pick_mid_side() {
        let mut rng = SmallRng::seed_from_u64(0x77);

        let left: Vec<i32> =
            (0..64).map(|i| (1000.0 * f64::sin(i as f64 / 5.0)) as i32 + rng.random_range(-200..200)).collect();
        let right: Vec<i32> = left.iter().map(|&l| l + rng.random_range(-2..2)).collect();

        assert_eq!(choose(&left, &right), StereoMode::MidSide);
    }

    #[test]
    fn verify_mid_side_reversibility() {
        let mut rng = SmallRng::seed_from_u64(0xfeed);

        let left: Vec<i32> = (0..512).map(|_| rng.random::<i32>()).collect();
        let right: Vec<i32> = (0..512).map(|_| rng.random::<i32>()).collect();

        let mut mid = Vec::new();
        let mut side = Vec::new();
        fill_mid(&mut mid, &left, &right);
        fill_side_wide(&mut side, &left, &right);

        // The inverse transform used by decoders.
        for i in 0..512 {
            let m = (i64::from(mid[i]) << 1) | (side[i] & 1);
            assert_eq!((m + side[i]) >> 1, i64::from(left[i]));
            assert_eq!((m - side[i]) >> 1, i64::from(right[i]));
        }
    }

    #[test]
    fn verify_narrow_side() {
        let left = [1000, -2000, 3000];
        let right = [-500, 700, 2999];

        let mut side = Vec::new();
        fill_side(&mut side, &left, &right);
        assert_eq!(side, &[1500, -2700, 1]);
    }
}
