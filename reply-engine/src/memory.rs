//! Exact-match response memory built from training pairs.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::vocab::normalize;

/// Normalized prompt → replies recorded for it, in training order.
#[derive(Clone, Debug, Default)]
pub struct ResponseMemory {
    replies: HashMap<String, Vec<String>>,
}

impl ResponseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reply for `prompt`. Duplicates are kept and weigh the random
    /// choice in their favour.
    pub fn insert(&mut self, prompt: &str, reply: &str) {
        self.replies
            .entry(normalize(prompt))
            .or_default()
            .push(reply.to_string());
    }

    /// All replies recorded for `prompt` after normalization.
    pub fn lookup(&self, prompt: &str) -> Option<&[String]> {
        self.replies
            .get(&normalize(prompt))
            .map(Vec::as_slice)
            .filter(|r| !r.is_empty())
    }

    /// Pick one recorded non-blank reply uniformly at random.
    pub fn find_reply<R: Rng>(&self, prompt: &str, rng: &mut R) -> Option<&str> {
        self.lookup(prompt)?
            .choose(rng)
            .map(String::as_str)
            .filter(|r| !r.trim().is_empty())
    }

    /// Number of distinct normalized prompts.
    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    /// Total replies across all prompts.
    pub fn reply_count(&self) -> usize {
        self.replies.values().map(Vec::len).sum()
    }
}
