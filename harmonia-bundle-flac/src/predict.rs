// Harmonia
// Copyright (c) 2025 The Project Harmonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed linear prediction: the five polynomial predictors of orders 0 through 4, residual
//! computation, and best-order selection.

/// An integer sample type a subframe can be encoded over. Regular channels use `i32`; the side
/// channel of a 32-bit deep stream carries 33 significant bits and uses `i64`.
pub trait Sample: Copy + PartialEq {
    fn as_i64(self) -> i64;
}

impl Sample for i32 {
    #[inline(always)]
    fn as_i64(self) -> i64 {
        i64::from(self)
    }
}

impl Sample for i64 {
    #[inline(always)]
    fn as_i64(self) -> i64 {
        self
    }
}

/// The maximum fixed predictor order.
pub const MAX_ORDER: u32 = 4;

/// The sum-of-residuals value marking a predictor order whose residuals cannot be represented in
/// 32 bits. Unreachable by any real sum.
const POISONED: u64 = (1 << 49) - 1;

/// The residual of the fixed polynomial predictor of the given order at index `i`. The
/// predictors are `(1 - z^-1)^order`, evaluated in 64 bits:
///
/// order 0: r = s
/// order 1: r = s - s[-1]
/// order 2: r = s - 2 s[-1] + s[-2]
/// order 3: r = s - 3 s[-1] + 3 s[-2] - s[-3]
/// order 4: r = s - 4 s[-1] + 6 s[-2] - 4 s[-3] + s[-4]
#[inline(always)]
fn residual_at<S: Sample>(samples: &[S], order: u32, i: usize) -> i64 {
    let s = |d: usize| samples[i - d].as_i64();

    match order {
        0 => s(0),
        1 => s(0) - s(1),
        2 => s(0) - 2 * s(1) + s(2),
        3 => s(0) - 3 * s(1) + 3 * s(2) - s(3),
        4 => s(0) - 4 * s(1) + 6 * s(2) - 4 * s(3) + s(4),
        _ => unreachable!(),
    }
}

#[inline(always)]
fn in_i32_range(value: i64) -> bool {
    value >= i64::from(i32::MIN) && value <= i64::from(i32::MAX)
}

/// Finds the fixed predictor order in 0..=4 minimising the sum of absolute residuals over the
/// given samples. The lowest order wins ties.
///
/// With `check_range` set (used when the effective sample width is 28 bits or more), an order
/// whose warm-up samples or residuals fall outside 32-bit range is poisoned and cannot be
/// selected; if every order is poisoned, `None` is returned and the caller should code the
/// subframe verbatim.
pub fn best_order<S: Sample>(samples: &[S], check_range: bool) -> Option<u32> {
    let n = samples.len();

    let mut best_order = 0;
    let mut best_sum = u64::MAX;

    for order in 0..=MAX_ORDER.min(n as u32 - 1) {
        let mut sum = 0;
        let mut poisoned = check_range
            && samples[..order as usize].iter().any(|&s| !in_i32_range(s.as_i64()));

        if !poisoned {
            for i in order as usize..n {
                let r = residual_at(samples, order, i);

                if check_range && !in_i32_range(r) {
                    poisoned = true;
                    break;
                }

                sum += r.unsigned_abs();
            }
        }

        if poisoned {
            sum = POISONED;
        }

        if sum < best_sum {
            best_order = order;
            best_sum = sum;
        }
    }

    if best_sum == POISONED {
        None
    }
    else {
        Some(best_order)
    }
}

/// Builds the residual set for the given order into `residuals`: the first `order` entries are
/// the raw warm-up samples, the remainder are prediction residuals.
///
/// The caller must have validated the order with [`best_order`]; every entry is then
/// representable in 32 bits.
pub fn build_residuals<S: Sample>(samples: &[S], order: u32, residuals: &mut Vec<i32>) {
    residuals.clear();
    residuals.reserve(samples.len());

    for s in &samples[..order as usize] {
        residuals.push(s.as_i64() as i32);
    }

    for i in order as usize..samples.len() {
        residuals.push(residual_at(samples, order, i) as i32);
    }
}

#[cfg(test)]
mod tests {
    use super::{best_order, build_residuals};

    #[test]
    fn verify_order_zero_identity() {
        let samples: Vec<i32> = vec![5, -2, 7, 0, -9, 3];

        let mut residuals = Vec::new();
        build_residuals(&samples, 0, &mut residuals);

        assert_eq!(residuals, samples);
    }

    #[test]
    fn verify_warm_up_identity() {
        let samples: Vec<i32> = (0..32).map(|i| (i * i) - 40).collect();

        for order in 0..=4 {
            let mut residuals = Vec::new();
            build_residuals(&samples, order, &mut residuals);

            assert_eq!(residuals.len(), samples.len());
            assert_eq!(&residuals[..order as usize], &samples[..order as usize]);
        }
    }

    #[test]
    fn verify_residual_polynomials() {
        let samples: Vec<i32> = vec![3, 8, 20, 45, 90];

        let mut residuals = Vec::new();

        build_residuals(&samples, 1, &mut residuals);
        assert_eq!(residuals, &[3, 5, 12, 25, 45]);

        build_residuals(&samples, 2, &mut residuals);
        assert_eq!(residuals, &[3, 8, 7, 13, 20]);

        build_residuals(&samples, 3, &mut residuals);
        assert_eq!(residuals, &[3, 8, 20, 6, 7]);

        build_residuals(&samples, 4, &mut residuals);
        assert_eq!(residuals, &[3, 8, 20, 45, 1]);
    }

    #[test]
    fn verify_best_order_ramp() {
        // A perfect ramp is annihilated by the second difference; orders 2 through 4 all reach a
        // zero sum and the lowest of them wins.
        let samples: Vec<i32> = (0..64).collect();
        assert_eq!(best_order(&samples, false), Some(2));
    }

    #[test]
    fn verify_best_order_constant() {
        // A non-zero constant: order 0 sums the samples themselves, all higher orders reach zero.
        let samples = vec![100i32; 64];
        assert_eq!(best_order(&samples, false), Some(1));

        // All-zero input ties every order at zero; the lowest order wins.
        let samples = vec![0i32; 64];
        assert_eq!(best_order(&samples, false), Some(0));
    }

    #[test]
    fn verify_best_order_minimality() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(0x0f0f_f0f0);

        for _ in 0..50 {
            let samples: Vec<i32> = (0..256).map(|_| rng.random_range(-50_000..50_000)).collect();

            let order = best_order(&samples, false).unwrap();

            let sum_for = |order: u32| -> u64 {
                let mut residuals = Vec::new();
                build_residuals(&samples, order, &mut residuals);
                residuals[order as usize..].iter().map(|&r| u64::from(r.unsigned_abs())).sum()
            };

            let best = sum_for(order);
            for other in 0..=4 {
                assert!(best <= sum_for(other));
            }
        }
    }

    #[test]
    fn verify_range_poisoning() {
        // Alternating extremes: order 0 is representable, every higher order overflows i32.
        let samples: Vec<i32> = (0..64)
            .map(|i| if i % 2 == 0 { i32::MAX } else { i32::MIN })
            .collect();

        assert_eq!(best_order(&samples, true), Some(0));
    }

    #[test]
    fn verify_all_orders_poisoned() {
        // A wide side channel whose samples exceed 32-bit range poisons every order: order 0
        // through the residuals, orders 1..=4 through the warm-ups.
        let samples = vec![1i64 << 32; 64];
        assert_eq!(best_order(&samples, true), None);
    }

    #[test]
    fn verify_wide_samples_in_range() {
        // Wide storage with representable values behaves like the narrow path.
        let samples: Vec<i64> = (0..64).collect();
        assert_eq!(best_order(&samples, true), Some(2));
    }
}
