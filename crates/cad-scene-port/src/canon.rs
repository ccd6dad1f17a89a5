// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Float canonicalization for deterministic comparison.
//!
//! The sync core compares view fields against the last value the kernel
//! acknowledged before deciding to send an update. Comparing canonical
//! projections keeps sub-micron jitter from a drag from producing traffic.

/// Canonicalize a float for comparison.
///
/// Truncates to six decimal places and folds `-0.0` into `0.0`.
/// Do NOT use this to mutate stored values; it's a projection for comparison.
///
/// Returns `None` for NaN or Infinity.
pub fn canonicalize_f32(x: f32) -> Option<f32> {
    if !x.is_finite() {
        return None;
    }
    let scaled = x * 1_000_000.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let truncated = (scaled as i64) as f32 / 1_000_000.0;
    if truncated == 0.0 {
        Some(0.0)
    } else {
        Some(truncated)
    }
}

/// Canonicalize a 3-vector for comparison.
pub fn canonicalize_vec3(p: [f32; 3]) -> Option<[f32; 3]> {
    Some([
        canonicalize_f32(p[0])?,
        canonicalize_f32(p[1])?,
        canonicalize_f32(p[2])?,
    ])
}

/// Compare two floats by their canonical projection.
///
/// Non-finite values never compare equal, so they always count as a change.
pub fn same_f32(a: f32, b: f32) -> bool {
    match (canonicalize_f32(a), canonicalize_f32(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Compare two 3-vectors by their canonical projection.
pub fn same_vec3(a: [f32; 3], b: [f32; 3]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| same_f32(*x, *y))
}
