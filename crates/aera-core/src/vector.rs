//! Embedding vector helpers.

use crate::error::{Error, Result};
use crate::models::Vector;

/// Compute cosine similarity between two vectors.
///
/// Fails on a length mismatch. Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::InvalidInput(format!(
            "Vector dimension mismatch: {} != {}",
            a.len(),
            b.len()
        )));
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

    let a_norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let b_norm: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if a_norm == 0.0 || b_norm == 0.0 {
        return Ok(0.0);
    }

    Ok(dot_product / (a_norm * b_norm))
}

/// Reject vectors whose width differs from what the index expects.
pub fn ensure_dimension(vector: &Vector, expected: usize) -> Result<()> {
    let actual = vector.as_slice().len();
    if actual != expected {
        return Err(Error::Embedding(format!(
            "Expected {}-dimensional embedding, got {}",
            expected, actual
        )));
    }
    Ok(())
}
