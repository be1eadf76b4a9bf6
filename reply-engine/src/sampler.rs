//! Turning a logits vector into the next token id.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Smallest temperature used when scaling logits.
pub const MIN_TEMPERATURE: f64 = 1e-8;
/// Upper bound on tokens generated for one request.
pub const MAX_NEW_TOKENS: usize = 512;

/// Knobs for one generation call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub max_new_tokens: usize,
    /// Nucleus threshold; `<= 0` selects greedy decoding.
    pub top_p: f64,
    pub temperature: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 40,
            top_p: 0.9,
            temperature: 0.8,
        }
    }
}

impl SamplingParams {
    /// `max_new_tokens` limited to [`MAX_NEW_TOKENS`].
    pub fn token_budget(&self) -> usize {
        self.max_new_tokens.min(MAX_NEW_TOKENS)
    }
}

/// Index of the largest logit; the first one wins on ties. Empty input
/// yields 0.
pub fn greedy(logits: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in logits.iter().enumerate().skip(1) {
        if v > logits[best] {
            best = i;
        }
    }
    best
}

/// `softmax(logits / temperature)`, computed in `f64` after subtracting the
/// maximum. A vanishing sum degrades to a uniform distribution.
pub fn softmax(logits: &[f32], temperature: f64) -> Vec<f64> {
    if logits.is_empty() {
        return Vec::new();
    }
    let temperature = temperature.max(MIN_TEMPERATURE);
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let mut probs: Vec<f64> = logits
        .iter()
        .map(|&l| ((l as f64 - max) / temperature).exp())
        .collect();
    let sum: f64 = probs.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        let uniform = 1.0 / probs.len() as f64;
        probs.iter_mut().for_each(|p| *p = uniform);
        return probs;
    }
    probs.iter_mut().for_each(|p| *p /= sum);
    probs
}

/// Token ids sorted by descending probability (ties by id), truncated to the
/// shortest prefix whose mass reaches `top_p`. The crossing token is
/// included; the prefix is never empty.
pub fn nucleus_candidates(probs: &[f64], top_p: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut cumulative = 0.0;
    let mut cut = order.len();
    for (rank, &id) in order.iter().enumerate() {
        cumulative += probs[id];
        if cumulative >= top_p {
            cut = rank + 1;
            break;
        }
    }
    order.truncate(cut.max(1));
    order
}

/// Temperature-scaled nucleus (top-p) sampling. `top_p <= 0` falls back to
/// [`greedy`].
pub fn nucleus<R: Rng>(logits: &[f32], top_p: f64, temperature: f64, rng: &mut R) -> usize {
    if top_p <= 0.0 || logits.is_empty() {
        return greedy(logits);
    }
    let probs = softmax(logits, temperature);
    let candidates = nucleus_candidates(&probs, top_p);
    let mass: f64 = candidates.iter().map(|&id| probs[id]).sum();

    let draw = rng.gen::<f64>() * mass;
    let mut acc = 0.0;
    for &id in &candidates {
        acc += probs[id];
        if draw < acc {
            return id;
        }
    }
    candidates[0]
}
