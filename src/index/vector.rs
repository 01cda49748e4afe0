//! Dense-vector helpers for embedding retrieval.

use std::cmp::Ordering;

use crate::error::AppError;

/// Cosine similarity of two equal-length vectors. A zero-norm side scores 0.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, AppError> {
    if query.len() != candidate.len() {
        return Err(AppError::Index(format!(
            "vector length mismatch: {} != {}",
            query.len(),
            candidate.len()
        )));
    }

    let (mut dot, mut q_sq, mut c_sq) = (0.0f32, 0.0f32, 0.0f32);
    for (q, c) in query.iter().zip(candidate) {
        dot += q * c;
        q_sq += q * q;
        c_sq += c * c;
    }

    let denom = q_sq.sqrt() * c_sq.sqrt();
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

/// `(index, score)` for every candidate, best first.
pub fn rank_descending(query: &[f32], candidates: &[Vec<f32>]) -> Result<Vec<(usize, f32)>, AppError> {
    let mut scores = Vec::with_capacity(candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        scores.push((idx, cosine_similarity(query, candidate)?));
    }
    scores.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
    Ok(scores)
}

/// Little-endian `f32` bytes, as stored in the `embeddings` table.
pub fn to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn from_blob(blob: &[u8]) -> Result<Vec<f32>, AppError> {
    if blob.len() % 4 != 0 {
        return Err(AppError::Index(format!("corrupt embedding blob of {} bytes", blob.len())));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
