//! Vector averaging and blending primitives.
//!
//! Pure numeric helpers behind the personalization handlers: elementwise
//! averaging, recency-weighted averaging, and multi-source blending.
//! No I/O and no state; every failure mode is a `ShapeError`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShapeError>;

/// Shape mismatch between input vectors, or between vectors and weights.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("weights shorter than vectors: {weights} < {vectors}")]
    WeightsTooShort { weights: usize, vectors: usize },
}

/// Elementwise mean of the non-empty vectors.
///
/// Returns `[]` when nothing remains after dropping empty entries. All
/// surviving vectors must share one dimension.
pub fn average(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    weighted_average(vectors, None)
}

/// Weighted elementwise mean.
///
/// `weights[i]` applies to `vectors[i]`; callers build recency decay as
/// `base^i` with index 0 the most recent entry. Without weights this is
/// `average`. A weights slice shorter than the vector list is rejected —
/// zero-extending would silently erase the oldest signals. Empty vectors are
/// dropped together with their paired weight so the indices stay aligned.
pub fn weighted_average(vectors: &[Vec<f32>], weights: Option<&[f32]>) -> Result<Vec<f32>> {
    if let Some(weights) = weights {
        if weights.len() < vectors.len() {
            return Err(ShapeError::WeightsTooShort {
                weights: weights.len(),
                vectors: vectors.len(),
            });
        }
    }

    let kept: Vec<(&[f32], f32)> = vectors
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_empty())
        .map(|(i, v)| (v.as_slice(), weights.map_or(1.0, |w| w[i])))
        .collect();

    let Some(&(first, _)) = kept.first() else {
        return Ok(Vec::new());
    };

    let dim = first.len();
    let mut total = vec![0.0f32; dim];
    let mut weight_sum = 0.0f32;

    for &(vector, weight) in &kept {
        if vector.len() != dim {
            return Err(ShapeError::DimensionMismatch {
                expected: dim,
                got: vector.len(),
            });
        }
        for (acc, value) in total.iter_mut().zip(vector) {
            *acc += weight * value;
        }
        weight_sum += weight;
    }

    if weight_sum == 0.0 {
        return Ok(Vec::new());
    }

    Ok(total.into_iter().map(|v| v / weight_sum).collect())
}

/// Weighted linear combination of up to three vectors.
///
/// `result[i] = w1*a[i] + w2*b[i] + w3*c[i]`, reading 0 past the end of any
/// shorter (or empty/absent) vector. Output length is the longest input.
/// Total: never fails on numeric input.
pub fn weighted_blend(a: &[f32], b: &[f32], c: &[f32], w1: f32, w2: f32, w3: f32) -> Vec<f32> {
    let dim = a.len().max(b.len()).max(c.len());

    (0..dim)
        .map(|i| {
            w1 * a.get(i).copied().unwrap_or(0.0)
                + w2 * b.get(i).copied().unwrap_or(0.0)
                + w3 * c.get(i).copied().unwrap_or(0.0)
        })
        .collect()
}
