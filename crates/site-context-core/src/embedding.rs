//! Embedding trait and vector similarity.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus [`cosine_similarity`], the scoring function used by the retrieval
//! engine.
//!
//! Concrete HTTP embedders (Gemini, OpenAI, Ollama) live in the
//! `site-context` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// The external embedding collaborator: text in, fixed-length vector out.
///
/// The builder calls it once per chunk and the query service once per
/// query, so both sides must use the same implementation and model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Embed one text. An empty vector is never a valid success.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Only the shared prefix (`min(a.len(), b.len())`) is compared, so
/// mismatched lengths never index out of range. Accumulation is done in
/// `f64`.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal, or either prefix empty or zero-norm
/// - `-1.0` = opposite direction
///
/// Never returns `NaN`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a[..len].iter().zip(&b[..len]) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::MIN_POSITIVE || !denom.is_finite() {
        return 0.0;
    }

    let sim = dot / denom;
    if sim.is_finite() {
        sim.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
