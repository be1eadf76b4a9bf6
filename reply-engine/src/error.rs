//! Error type shared by the engine components.

use thiserror::Error;

/// Failures raised by the core engine.
///
/// No-match outcomes (empty memory lookup, no intent, no n-gram continuation)
/// are not errors and are reported as `None` by the stage that produced them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The n-gram order must be at least one.
    #[error("n-gram order must be at least 1, got {0}")]
    InvalidOrder(usize),

    /// Hidden size must split evenly across attention heads.
    #[error("hidden size {dim} is not divisible by {n_heads} attention heads")]
    HeadMismatch { dim: usize, n_heads: usize },

    /// A model dimension was configured as zero.
    #[error("model dimension `{0}` must be non-zero")]
    ZeroDimension(&'static str),

    /// A token id outside the embedding table reached the forward pass.
    #[error("token id {token} is outside the vocabulary of {vocab_size}")]
    TokenOutOfRange { token: usize, vocab_size: usize },

    /// The session has already processed `capacity` positions.
    #[error("context window of {capacity} positions is full")]
    ContextFull { capacity: usize },

    /// A key/value cache slot was written out of order.
    #[error("kv cache expected position {expected}, got {got}")]
    CacheOrder { expected: usize, got: usize },

    /// The configuration document could not be parsed.
    #[error("invalid engine config: {0}")]
    Config(#[from] serde_json::Error),
}
