/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pure arithmetic helpers: GCD and LCM over `u64`.
//!
//! These are free functions rather than methods so they can be used and tested
//! independently of the `HyperperiodManager`.  Inputs are task periods in
//! microseconds; realistic periods sit many orders of magnitude below the
//! `u64` range, so the product in [`lcm`] is not range-checked — a wrapped
//! result is reported with a warning and returned as-is, and keeping inputs
//! in range is the caller's contract.

use tracing::warn;

/// Iterative Euclidean GCD.  Always returns `0` when both inputs are `0`.
///
/// The iterative form is preferred over the recursive one because it does not
/// risk a stack overflow for very large inputs.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// LCM with `0` absorbing: `lcm(0, x) == 0`.
///
/// Uses the overflow-safe formulation `(a / gcd(a, b)) * b` — the division
/// happens first, which keeps the intermediate small for related periods.
pub fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return 0;
    }

    let g = gcd(a, b);
    // a / g is exact (g divides a by definition)
    let (value, overflowed) = (a / g).overflowing_mul(b);
    if overflowed {
        warn!(a, b, "LCM wrapped past u64::MAX");
    }
    value
}

/// Reduce a slice of periods to their overall LCM with a left fold.
///
/// Returns `0` for an empty slice.
pub fn lcm_many(periods: &[u64]) -> u64 {
    periods
        .iter()
        .fold(periods.first().copied().unwrap_or(0), |acc, &p| lcm(acc, p))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── gcd ───────────────────────────────────────────────────────────────────

    #[test]
    fn gcd_basic_cases() {
        assert_eq!(gcd(12, 8), 4);
        assert_eq!(gcd(7, 3), 1);
        assert_eq!(gcd(100, 25), 25);
    }

    #[test]
    fn gcd_with_zero() {
        assert_eq!(gcd(0, 5), 5);
        assert_eq!(gcd(5, 0), 5);
        assert_eq!(gcd(0, 0), 0);
    }

    #[test]
    fn gcd_is_idempotent_on_equal_inputs() {
        assert_eq!(gcd(42, 42), 42);
    }

    #[test]
    fn gcd_is_commutative() {
        for (a, b) in [(12, 18), (7, 3), (1_000, 2_500)] {
            assert_eq!(gcd(a, b), gcd(b, a));
        }
    }

    #[test]
    fn gcd_coprime() {
        assert_eq!(gcd(17, 13), 1);
    }

    // ── lcm ───────────────────────────────────────────────────────────────────

    #[test]
    fn lcm_basic_cases() {
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(3, 5), 15);
        assert_eq!(lcm(12, 18), 36);
    }

    #[test]
    fn lcm_with_zero_returns_zero() {
        assert_eq!(lcm(0, 5), 0);
        assert_eq!(lcm(5, 0), 0);
    }

    #[test]
    fn lcm_is_idempotent_on_equal_inputs() {
        assert_eq!(lcm(7, 7), 7);
    }

    #[test]
    fn lcm_is_commutative() {
        for (a, b) in [(4, 6), (1_000, 1_500), (100, 200)] {
            assert_eq!(lcm(a, b), lcm(b, a));
        }
    }

    #[test]
    fn lcm_overflow_does_not_panic() {
        // Two large coprime numbers whose LCM exceeds u64::MAX — the wrapped
        // value comes back and a warning is logged
        let a = u64::MAX / 2 + 1;
        let b = u64::MAX / 2 + 3;
        let _ = lcm(a, b);
    }

    // ── realistic real-time periods (microseconds) ────────────────────────────

    #[test]
    fn lcm_typical_rt_periods_us() {
        // 1 ms, 2 ms, 5 ms, 10 ms — hyperperiod should be 10 ms
        assert_eq!(lcm(1_000, 2_000), 2_000);
        assert_eq!(lcm(2_000, 5_000), 10_000);
        assert_eq!(lcm(5_000, 10_000), 10_000);
    }

    // ── lcm_many ──────────────────────────────────────────────────────────────

    #[test]
    fn lcm_many_empty_returns_zero() {
        assert_eq!(lcm_many(&[]), 0);
    }

    #[test]
    fn lcm_many_single_element() {
        assert_eq!(lcm_many(&[42]), 42);
    }

    #[test]
    fn lcm_many_multiple_periods() {
        assert_eq!(lcm_many(&[1_000, 2_000, 4_000]), 4_000);
        assert_eq!(lcm_many(&[100, 150, 200]), 600);
    }

    #[test]
    fn lcm_many_all_same() {
        assert_eq!(lcm_many(&[5_000, 5_000, 5_000]), 5_000);
    }

    #[test]
    fn lcm_many_divides_into_result() {
        let periods = [1_000, 1_500, 4_000, 6_000];
        let h = lcm_many(&periods);
        for p in periods {
            assert_eq!(h % p, 0, "hyperperiod must be divisible by {p}");
        }
    }
}
