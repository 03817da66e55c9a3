//! Integer arithmetic that never wraps silently.
//!
//! Profiling data is noisy: the summed inclusive values of a node's children
//! can exceed the node's own inclusive value. Converting such a node to
//! exclusive must cap the result at the type's bounds instead of wrapping
//! around to a huge number.

use super::Int;
use super::kind::IntType;

/// Shrink `subtrahend` so that `minuend - subtrahend` stays inside `ty`.
///
/// If the difference would fall below `ty.min()`, the subtrahend becomes
/// `minuend - ty.min()`; if it would rise above `ty.max()`, it becomes
/// `minuend - ty.max()`. Otherwise it is returned unchanged.
pub fn clamp_subtrahend(minuend: i128, subtrahend: i128, ty: IntType) -> i128 {
    match minuend.checked_sub(subtrahend) {
        Some(diff) if diff < ty.min() => minuend.wrapping_sub(ty.min()),
        Some(diff) if diff > ty.max() => minuend.wrapping_sub(ty.max()),
        Some(_) => subtrahend,
        None if subtrahend > 0 => minuend.wrapping_sub(ty.min()),
        None => minuend.wrapping_sub(ty.max()),
    }
}

/// Sum one row of integers of a declared type.
///
/// When the largest magnitude times the row length fits the declared range,
/// the sum is accumulated natively. Otherwise the row is summed in 128 bits;
/// a result outside the declared range is reported as [`IntType::Wide`].
pub fn sum_ints(values: &[i128], ty: IntType) -> Int {
    let peak = values.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0);
    let limit = ty.max().unsigned_abs();
    if peak.saturating_mul(values.len() as u128) <= limit {
        let sum = values.iter().fold(0i128, |acc, &v| ty.wrap(acc + v));
        return Int::new(sum, ty);
    }

    let sum = values.iter().fold(0i128, |acc, &v| acc.saturating_add(v));
    if ty.contains(sum) {
        Int::new(sum, ty)
    } else {
        Int::new(sum, IntType::Wide)
    }
}
