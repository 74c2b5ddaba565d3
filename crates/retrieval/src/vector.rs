//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity and top-k ranking over indexed passages.

use crate::index::IndexedPassage;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ, either vector is empty or zero, or a
/// component is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom.is_nan() || denom < 1e-10 {
        return 0.0;
    }

    let score = (dot / denom) as f32;
    if score.is_finite() { score } else { 0.0 }
}

/// Rank passages by cosine similarity to `query`, best first.
///
/// Equal scores are ordered by passage id so the same query against the
/// same index always yields the same sequence.
pub fn rank<'a>(
    passages: &'a [IndexedPassage],
    query: &[f32],
    limit: usize,
) -> Vec<(f32, &'a IndexedPassage)> {
    let mut scored: Vec<(f32, &IndexedPassage)> = passages
        .iter()
        .map(|p| (cosine_similarity(&p.embedding, query), p))
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
    scored.truncate(limit);
    scored
}
