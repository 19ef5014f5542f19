// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rice coding of prediction residuals: the zigzag fold, the partition-order and parameter
//! search, and the cheap cost estimator used by the stereo chooser.

/// The maximum residual partition order.
pub const MAX_PARTITION_ORDER: u32 = 8;

/// The maximum usable Rice parameter. The all-ones parameter (31 for a 5-bit field) is reserved
/// to escape a partition into plain binary coding, which this encoder never does.
pub const MAX_RICE_PARAM: u32 = 30;

/// The reserved escape parameter.
pub const PARAM_ESCAPE: u32 = 31;

/// The largest Rice parameter encodable in a 4-bit parameter field.
const MAX_RICE_PARAM_FOUR: u32 = 14;

/// `RiceMethod` selects the bit width of the per-partition parameter field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiceMethod {
    /// 4-bit Rice parameters.
    Four,
    /// 5-bit Rice parameters.
    Five,
}

impl RiceMethod {
    /// The 2-bit residual coding method code.
    pub fn code(&self) -> u32 {
        match *self {
            RiceMethod::Four => 0,
            RiceMethod::Five => 1,
        }
    }

    /// The bit width of one parameter field.
    pub fn param_bit_width(&self) -> u32 {
        match *self {
            RiceMethod::Four => 4,
            RiceMethod::Five => 5,
        }
    }
}

/// A `RiceConfig` describes how the residuals of one subframe are partitioned and coded: the
/// parameter field width, the partition order, and one Rice parameter per partition.
#[derive(Debug)]
pub struct RiceConfig {
    pub method: RiceMethod,
    pub partition_order: u32,
    pub params: Vec<u32>,
}

/// Folds a signed residual into an unsigned value, interleaving negative and non-negative inputs.
///
/// Input  => 0  1  2  3  4  5 -1 -2 -3
/// Output => 0  2  4  6  8 10  1  3  5
#[inline(always)]
pub fn zigzag(value: i32) -> u64 {
    // Performed in 64 bits so the left shift cannot discard the sign bit.
    let value = i64::from(value);
    ((value << 1) ^ (value >> 63)) as u64
}

/// Approximate cost in bits of Rice coding a partition of `len` residuals whose zigzag values sum
/// to `sum`, using the parameter `k`.
///
/// Each residual costs `k + 1` bits for the remainder and the quotient terminator, plus its
/// quotient in unary. The summed quotients are approximated by `(sum - len/2) >> k`; the `len/2`
/// term models the truncation of each residual's low bits. The subtraction saturates: a partition
/// whose residuals are all near zero costs no less than its terminator bits.
#[inline(always)]
fn partition_cost(sum: u64, len: u64, k: u32) -> u64 {
    len * u64::from(k + 1) + (sum.saturating_sub(len / 2) >> k)
}

/// Finds the parameter in `0..=max_param` minimising [`partition_cost`]. Returns the parameter
/// and its cost. The lowest parameter wins ties.
fn best_param(sum: u64, len: u64, max_param: u32) -> (u32, u64) {
    let mut best_k = 0;
    let mut best_cost = partition_cost(sum, len, 0);

    for k in 1..=max_param {
        let cost = partition_cost(sum, len, k);
        if cost < best_cost {
            best_k = k;
            best_cost = cost;
        }
    }

    (best_k, best_cost)
}

/// Finds the partition order and per-partition Rice parameters minimising the estimated size of
/// the coded residual section, including the method, partition-order, and parameter fields.
///
/// The first `pred_order` entries of `residuals` are warm-up samples: they are excluded from the
/// first partition at every order. Returns the total estimated bit count and the chosen
/// configuration.
pub fn find_optimal_config(
    residuals: &[i32],
    pred_order: u32,
    max_part_order: u32,
    max_param: u32,
) -> (u64, RiceConfig) {
    debug_assert!(max_param <= MAX_RICE_PARAM);

    let n = residuals.len() as u32;

    // The partition count must divide the block evenly, and the first partition must retain a
    // non-negative residual count after the warm-ups are excluded.
    let mut p_max = max_part_order.min(n.trailing_zeros());
    while p_max > 0 && (n >> p_max) < pred_order {
        p_max -= 1;
    }

    // Partition zigzag sums for every order at once: sums[order] holds 2^order partition sums.
    // Compute the highest order directly, then fold pairs for each lower order.
    let mut sums: Vec<Vec<u64>> = vec![Vec::new(); (p_max + 1) as usize];

    let top_len = (n >> p_max) as usize;
    sums[p_max as usize] = (0..1usize << p_max)
        .map(|j| {
            let lo = if j == 0 { pred_order as usize } else { j * top_len };
            residuals[lo..(j + 1) * top_len].iter().map(|&r| zigzag(r)).sum()
        })
        .collect();

    for order in (0..p_max).rev() {
        let level: Vec<u64> = sums[(order + 1) as usize]
            .chunks_exact(2)
            .map(|pair| pair[0] + pair[1])
            .collect();
        sums[order as usize] = level;
    }

    let mut best: Option<(u64, RiceConfig)> = None;

    for order in 0..=p_max {
        let part_len = u64::from(n >> order);

        let mut params = Vec::with_capacity(1 << order);
        let mut total = 0u64;

        for (j, &sum) in sums[order as usize].iter().enumerate() {
            let len = if j == 0 { part_len - u64::from(pred_order) } else { part_len };
            let (k, cost) = best_param(sum, len, max_param);
            params.push(k);
            total += cost;
        }

        let method = if params.iter().any(|&k| k > MAX_RICE_PARAM_FOUR) {
            RiceMethod::Five
        }
        else {
            RiceMethod::Four
        };

        // The residual section overhead: method code, partition order, one parameter field per
        // partition.
        total += 2 + 4 + u64::from(method.param_bit_width()) * (1 << order);

        // On ties the highest partition order wins.
        if best.as_ref().map_or(true, |(bits, _)| total <= *bits) {
            best = Some((total, RiceConfig { method, partition_order: order, params }));
        }
    }

    best.unwrap()
}

/// Estimates the cost in bits of Rice coding `n` residuals whose absolute values sum to half of
/// `doubled_sum`, without materialising the residuals. Used by the stereo chooser.
pub fn estimate_bits(doubled_sum: u64, n: u64) -> u64 {
    if doubled_sum == 0 {
        // An empty parameter: the coded size of nothing but a 5-bit escape field.
        return 5;
    }

    let k = floor_log2(doubled_sum).saturating_sub(floor_log2(n));
    partition_cost(doubled_sum, n, k)
}

#[inline(always)]
fn floor_log2(value: u64) -> u32 {
    debug_assert!(value > 0);
    63 - value.leading_zeros()
}
