//! Word-level n-gram model.
//!
//! Training counts how often each token follows a window of the previous
//! `order` tokens; generation walks those counts with weighted sampling.

use std::collections::BTreeMap;

use rand::Rng;

use crate::error::EngineError;
use crate::vocab::Vocab;

/// Continuations observed after one state, keyed by next token id.
pub type Continuations = BTreeMap<usize, u64>;

/// Split text into sentences on runs of `.`, `!` and `?`.
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Transition table of order `k`.
///
/// Both maps are ordered so that enumeration order, and therefore seeded
/// generation, is the same in every process.
#[derive(Clone, Debug)]
pub struct NGramModel {
    order: usize,
    transitions: BTreeMap<Vec<usize>, Continuations>,
}

impl NGramModel {
    pub fn new(order: usize) -> Result<Self, EngineError> {
        if order == 0 {
            return Err(EngineError::InvalidOrder(order));
        }
        Ok(Self {
            order,
            transitions: BTreeMap::new(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of states with at least one continuation.
    pub fn state_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Train on a flat text: every sentence is counted independently.
    pub fn train(&mut self, vocab: &mut Vocab, text: &str) {
        for sentence in sentences(text) {
            let tokens = vocab.encode(sentence);
            self.train_tokens(&tokens);
        }
    }

    /// Train on a (prompt, reply) pair.
    ///
    /// Besides the sentences of each side, the last prompt sentence is joined
    /// to the first reply sentence so that a prompt's tail leads into the
    /// reply.
    pub fn train_pair(&mut self, vocab: &mut Vocab, prompt: &str, reply: &str) {
        let prompt_sentences: Vec<Vec<usize>> =
            sentences(prompt).map(|s| vocab.encode(s)).collect();
        let reply_sentences: Vec<Vec<usize>> = sentences(reply).map(|s| vocab.encode(s)).collect();

        for tokens in prompt_sentences.iter().chain(reply_sentences.iter()) {
            self.train_tokens(tokens);
        }

        if let (Some(last), Some(first)) = (prompt_sentences.last(), reply_sentences.first()) {
            let tail_start = last.len().saturating_sub(self.order);
            let head_end = first.len().min(self.order);
            let bridge: Vec<usize> = last[tail_start..]
                .iter()
                .chain(first[..head_end].iter())
                .copied()
                .collect();
            // Only windows that straddle the boundary; the rest were counted above.
            let boundary = last.len() - tail_start;
            for (start, window) in bridge.windows(self.order + 1).enumerate() {
                if start < boundary && start + self.order >= boundary {
                    self.count(window);
                }
            }
        }
    }

    /// Count every window of `order + 1` consecutive tokens.
    pub fn train_tokens(&mut self, tokens: &[usize]) {
        for window in tokens.windows(self.order + 1) {
            self.count(window);
        }
    }

    fn count(&mut self, window: &[usize]) {
        let (state, next) = window.split_at(self.order);
        *self
            .transitions
            .entry(state.to_vec())
            .or_default()
            .entry(next[0])
            .or_insert(0) += 1;
    }

    /// Continuations recorded for `state`, or `None` if there are none.
    pub fn continuations(&self, state: &[usize]) -> Option<&Continuations> {
        self.transitions.get(state).filter(|c| !c.is_empty())
    }

    /// Build the starting window from prompt tokens.
    ///
    /// Uses the last `order` tokens; a shorter prompt is padded by repeating
    /// its last token and an empty prompt starts from a uniformly random
    /// observed state.
    pub fn initial_state<R: Rng>(&self, prompt: &[usize], rng: &mut R) -> Option<Vec<usize>> {
        match prompt.last() {
            Some(&last) => {
                let start = prompt.len().saturating_sub(self.order);
                let mut state = prompt[start..].to_vec();
                state.resize(self.order, last);
                Some(state)
            }
            None => self.random_state(rng),
        }
    }

    fn random_state<R: Rng>(&self, rng: &mut R) -> Option<Vec<usize>> {
        if self.transitions.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.transitions.len());
        self.transitions.keys().nth(idx).cloned()
    }

    /// Draw a continuation of `state` with probability proportional to its
    /// count.
    pub fn sample_next<R: Rng>(&self, state: &[usize], rng: &mut R) -> Option<usize> {
        let next = self.continuations(state)?;
        let total: u64 = next.values().sum();
        if total == 0 {
            return None;
        }
        let draw = rng.gen_range(0..total);
        let mut cumulative = 0;
        for (&token, &count) in next {
            cumulative += count;
            if draw < cumulative {
                return Some(token);
            }
        }
        None
    }

    /// Generate up to `max_new_tokens` ids following `prompt`.
    pub fn generate<R: Rng>(&self, prompt: &[usize], max_new_tokens: usize, rng: &mut R) -> Vec<usize> {
        let mut output = Vec::new();
        let Some(mut state) = self.initial_state(prompt, rng) else {
            return output;
        };
        while output.len() < max_new_tokens {
            let Some(next) = self.sample_next(&state, rng) else {
                break;
            };
            output.push(next);
            state.remove(0);
            state.push(next);
        }
        output
    }
}
