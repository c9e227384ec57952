//! Similarity kernel over dense `f32` vectors.
//!
//! All public functions check dimensions and return
//! [`VectorError::DimensionMismatch`](crate::VectorError::DimensionMismatch)
//! on disagreement. Cosine similarity is defined as `0.0` when either
//! operand has zero norm, so callers never see NaN.
//!
//! The loops are written in chunks of 4 so the compiler can auto-vectorize
//! them in release builds.

use crate::{Result, VectorError};

/// Compute the dot product of two vectors.
///
/// # Example
///
/// ```
/// use kombu_vector::dot;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 5.0, 6.0];
/// assert!((dot(&a, &b).unwrap() - 32.0).abs() < 0.001);
/// ```
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;

    let mut sum = 0.0f32;
    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;
        sum += a[base] * b[base]
            + a[base + 1] * b[base + 1]
            + a[base + 2] * b[base + 2]
            + a[base + 3] * b[base + 3];
    }

    for i in (chunks * 4)..a.len() {
        sum += a[i] * b[i];
    }

    Ok(sum)
}

/// Compute the L2 norm of a vector. Always `>= 0`.
#[inline]
pub fn norm(a: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;
        sum += a[base] * a[base]
            + a[base + 1] * a[base + 1]
            + a[base + 2] * a[base + 2]
            + a[base + 3] * a[base + 3];
    }

    for i in (chunks * 4)..a.len() {
        sum += a[i] * a[i];
    }

    sum.sqrt()
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`; `1` = same direction, `0` = orthogonal,
/// `-1` = opposite. If either operand has zero norm the similarity is
/// defined as `0.0`.
///
/// # Example
///
/// ```
/// use kombu_vector::cosine_similarity;
///
/// let a = [1.0, 0.0];
/// let b = [0.0, 1.0];
/// assert!(cosine_similarity(&a, &b).unwrap().abs() < 0.001);
/// ```
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;

    let (dot, norm_a_sq, norm_b_sq) = dot_and_norms(a, b);
    Ok(cosine_from_parts(dot, norm_a_sq.sqrt(), norm_b_sq.sqrt()))
}

/// Compute cosine distance: `1 - cosine_similarity`, in `[0, 2]`.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    Ok(1.0 - cosine_similarity(a, b)?)
}

/// Combine a dot product with precomputed norms into a cosine similarity.
///
/// Indexes cache per-vector norms (vectors are immutable once inserted),
/// so the hot path computes one dot product and reuses the norms. The
/// zero-norm and clamping rules match [`cosine_similarity`].
#[inline]
pub fn cosine_from_parts(dot: f32, norm_a: f32, norm_b: f32) -> f32 {
    let denom = norm_a * norm_b;
    if denom <= f32::EPSILON {
        return 0.0;
    }

    // Clamp to [-1, 1] to absorb floating point error
    (dot / denom).clamp(-1.0, 1.0)
}

/// Dot product without the dimension check, for hot paths that validate
/// dimensions once at the index boundary.
///
/// Debug builds still assert equal lengths.
#[inline]
pub fn dot_unchecked(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");

    let mut sum = 0.0f32;
    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;
        sum += a[base] * b[base]
            + a[base + 1] * b[base + 1]
            + a[base + 2] * b[base + 2]
            + a[base + 3] * b[base + 3];
    }

    for i in (chunks * 4)..a.len() {
        sum += a[i] * b[i];
    }

    sum
}

/// Compute dot product and squared norms in a single pass.
///
/// Returns `(dot, norm_a_squared, norm_b_squared)`.
#[inline]
fn dot_and_norms(a: &[f32], b: &[f32]) -> (f32, f32, f32) {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;

        dot += a[base] * b[base]
            + a[base + 1] * b[base + 1]
            + a[base + 2] * b[base + 2]
            + a[base + 3] * b[base + 3];

        norm_a += a[base] * a[base]
            + a[base + 1] * a[base + 1]
            + a[base + 2] * a[base + 2]
            + a[base + 3] * a[base + 3];

        norm_b += b[base] * b[base]
            + b[base + 1] * b[base + 1]
            + b[base + 2] * b[base + 2]
            + b[base + 3] * b[base + 3];
    }

    for i in (chunks * 4)..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    (dot, norm_a, norm_b)
}

#[inline]
fn check_dims(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}
