//! Toy transformer generator.
//!
//! Token + position embeddings, `n_layers` pre-norm blocks of causal
//! multi-head attention and a GELU feed-forward network, a final layer norm
//! and a projection to vocabulary logits. Weights are random and never
//! trained; the model only demonstrates the forward pass and sampling.
//!
//! Weights are immutable after construction and can be shared between
//! threads. Every generation owns a fresh [`Session`] holding its key/value
//! cache.

use std::f32::consts::{FRAC_1_SQRT_2, FRAC_2_SQRT_PI};

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::sampler::{self, SamplingParams};
use crate::vocab::UNK_ID;

/// Half-width of the uniform range used for weight initialization.
const INIT_RANGE: f32 = 0.05;
const LAYER_NORM_EPS: f32 = 1e-5;
/// sqrt(2 / pi)
const GELU_COEFF: f32 = FRAC_2_SQRT_PI * FRAC_1_SQRT_2;

/// Configuration for the transformer model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelArgs {
    /// Maximum number of positions a session can process.
    pub max_seq_len: usize,
    /// Vocabulary size. Overwritten from the vocabulary when the engine is built.
    pub vocab_size: usize,
    /// Embedding/hidden dimension.
    pub dim: usize,
    /// Number of blocks.
    pub n_layers: usize,
    /// Number of attention heads.
    pub n_heads: usize,
    /// Hidden dimension of the feed-forward network.
    pub hidden_dim: usize,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            max_seq_len: 128,
            vocab_size: 1024,
            dim: 64,
            n_layers: 2,
            n_heads: 4,
            hidden_dim: 256,
        }
    }
}

impl ModelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head_dim(&self) -> usize {
        self.dim / self.n_heads
    }

    /// Check that every dimension is usable.
    pub fn validate(&self) -> Result<(), EngineError> {
        let dims = [
            ("max_seq_len", self.max_seq_len),
            ("vocab_size", self.vocab_size),
            ("dim", self.dim),
            ("n_layers", self.n_layers),
            ("n_heads", self.n_heads),
            ("hidden_dim", self.hidden_dim),
        ];
        if let Some(&(name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(EngineError::ZeroDimension(name));
        }
        if self.dim % self.n_heads != 0 {
            return Err(EngineError::HeadMismatch {
                dim: self.dim,
                n_heads: self.n_heads,
            });
        }
        Ok(())
    }
}

fn random_matrix<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-INIT_RANGE..INIT_RANGE))
}

fn gelu(v: f32) -> f32 {
    0.5 * v * (1.0 + (GELU_COEFF * (v + 0.044715 * v * v * v)).tanh())
}

/// Numerically stable softmax. Falls back to a uniform distribution when the
/// exponentiated sum vanishes or is not finite.
pub(crate) fn softmax_in_place(scores: &mut Array1<f32>) {
    if scores.is_empty() {
        return;
    }
    let max = scores.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    scores.mapv_inplace(|v| (v - max).exp());
    let sum = scores.sum();
    if sum == 0.0 || !sum.is_finite() {
        let uniform = 1.0 / scores.len() as f32;
        scores.fill(uniform);
        return;
    }
    *scores /= sum;
}

/// Embedding table mapping ids to vectors.
pub struct Embedding {
    weight: Array2<f32>, // rows x dim
}

impl Embedding {
    pub fn new<R: Rng>(rows: usize, dim: usize, rng: &mut R) -> Self {
        Self {
            weight: random_matrix(rows, dim, rng),
        }
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    pub fn lookup(&self, id: usize) -> Result<ArrayView1<'_, f32>, EngineError> {
        if id >= self.weight.nrows() {
            return Err(EngineError::TokenOutOfRange {
                token: id,
                vocab_size: self.weight.nrows(),
            });
        }
        Ok(self.weight.row(id))
    }

    pub fn forward(&self, ids: &[usize]) -> Result<Array2<f32>, EngineError> {
        let mut out = Array2::<f32>::zeros((ids.len(), self.weight.ncols()));
        for (i, &id) in ids.iter().enumerate() {
            out.row_mut(i).assign(&self.lookup(id)?);
        }
        Ok(out)
    }
}

/// Fully connected layer.
pub struct Linear {
    weight: Array2<f32>, // out x in
    bias: Option<Array1<f32>>,
}

impl Linear {
    pub fn new<R: Rng>(in_features: usize, out_features: usize, bias: bool, rng: &mut R) -> Self {
        let weight = random_matrix(out_features, in_features, rng);
        let bias = bias.then(|| Array1::from_shape_fn(out_features, |_| rng.gen_range(-INIT_RANGE..INIT_RANGE)));
        Self { weight, bias }
    }

    pub fn from_parts(weight: Array2<f32>, bias: Option<Array1<f32>>) -> Self {
        Self { weight, bias }
    }

    /// Project every row of `x`.
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight.t());
        if let Some(b) = &self.bias {
            y += b;
        }
        y
    }

    /// Project a single vector.
    pub fn forward_one(&self, x: &ArrayView1<f32>) -> Array1<f32> {
        let mut y = self.weight.dot(x);
        if let Some(b) = &self.bias {
            y += b;
        }
        y
    }
}

/// Layer normalization over the hidden dimension.
pub struct LayerNorm {
    weight: Array1<f32>,
    bias: Array1<f32>,
    eps: f32,
}

impl LayerNorm {
    pub fn new(dim: usize) -> Self {
        Self {
            weight: Array1::ones(dim),
            bias: Array1::zeros(dim),
            eps: LAYER_NORM_EPS,
        }
    }

    pub fn forward_one(&self, x: &ArrayView1<f32>) -> Array1<f32> {
        let n = x.len() as f32;
        let mean = x.sum() / n;
        let var = x.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / n;
        let denom = (var + self.eps).sqrt();
        x.mapv(|v| (v - mean) / denom) * &self.weight + &self.bias
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros(x.raw_dim());
        for (i, row) in x.outer_iter().enumerate() {
            out.row_mut(i).assign(&self.forward_one(&row));
        }
        out
    }
}

/// Key/value rows written by one block, one row per processed position.
pub struct LayerCache {
    keys: Array2<f32>,
    values: Array2<f32>,
    len: usize,
}

impl LayerCache {
    fn new(capacity: usize, dim: usize) -> Self {
        Self {
            keys: Array2::zeros((capacity, dim)),
            values: Array2::zeros((capacity, dim)),
            len: 0,
        }
    }

    /// Store the key and value for `pos`. Positions must be written in order
    /// and exactly once.
    pub fn write(&mut self, pos: usize, key: &Array1<f32>, value: &Array1<f32>) -> Result<(), EngineError> {
        if pos >= self.keys.nrows() {
            return Err(EngineError::ContextFull {
                capacity: self.keys.nrows(),
            });
        }
        if pos != self.len {
            return Err(EngineError::CacheOrder {
                expected: self.len,
                got: pos,
            });
        }
        self.keys.row_mut(pos).assign(key);
        self.values.row_mut(pos).assign(value);
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Per-session key/value cache: one [`LayerCache`] per block.
pub struct KvCache {
    layers: Vec<LayerCache>,
    capacity: usize,
}

impl KvCache {
    pub fn new(args: &ModelArgs) -> Self {
        Self {
            layers: (0..args.n_layers)
                .map(|_| LayerCache::new(args.max_seq_len, args.dim))
                .collect(),
            capacity: args.max_seq_len,
        }
    }

    pub fn layer(&self, idx: usize) -> Option<&LayerCache> {
        self.layers.get(idx)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// State of one generation call.
///
/// Owns the key/value cache; never share a session between generations.
pub struct Session {
    cache: KvCache,
    pos: usize,
}

impl Session {
    pub fn new(args: &ModelArgs) -> Self {
        Self {
            cache: KvCache::new(args),
            pos: 0,
        }
    }

    /// Next position to be processed.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_full(&self) -> bool {
        self.pos >= self.cache.capacity
    }

    pub fn cache(&self) -> &KvCache {
        &self.cache
    }
}

/// Multi-head causal self attention.
pub struct Attention {
    wq: Linear,
    wk: Linear,
    wv: Linear,
    wo: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl Attention {
    pub fn new<R: Rng>(dim: usize, n_heads: usize, rng: &mut R) -> Self {
        Self {
            wq: Linear::new(dim, dim, true, rng),
            wk: Linear::new(dim, dim, true, rng),
            wv: Linear::new(dim, dim, true, rng),
            wo: Linear::new(dim, dim, true, rng),
            n_heads,
            head_dim: dim / n_heads,
        }
    }

    fn scale(&self) -> f32 {
        1.0 / (self.head_dim as f32).sqrt()
    }

    /// Attend from the token at `pos` to every cached position `0..=pos`.
    pub fn forward_step(
        &self,
        x: &ArrayView1<f32>,
        pos: usize,
        cache: &mut LayerCache,
    ) -> Result<Array1<f32>, EngineError> {
        let q = self.wq.forward_one(x);
        let k = self.wk.forward_one(x);
        let v = self.wv.forward_one(x);
        cache.write(pos, &k, &v)?;

        let keys = cache.keys.slice(s![..pos + 1, ..]);
        let values = cache.values.slice(s![..pos + 1, ..]);
        let mut out = Array1::<f32>::zeros(self.n_heads * self.head_dim);
        for h in 0..self.n_heads {
            let (lo, hi) = (h * self.head_dim, (h + 1) * self.head_dim);
            let mut scores = keys.slice(s![.., lo..hi]).dot(&q.slice(s![lo..hi])) * self.scale();
            softmax_in_place(&mut scores);
            let mixed = values.slice(s![.., lo..hi]).t().dot(&scores);
            out.slice_mut(s![lo..hi]).assign(&mixed);
        }
        Ok(self.wo.forward_one(&out.view()))
    }

    /// Causal attention over a whole sequence without a cache.
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let q = self.wq.forward(x);
        let k = self.wk.forward(x);
        let v = self.wv.forward(x);
        let seq = x.nrows();

        let mut out = Array2::<f32>::zeros((seq, self.n_heads * self.head_dim));
        for h in 0..self.n_heads {
            let (lo, hi) = (h * self.head_dim, (h + 1) * self.head_dim);
            for i in 0..seq {
                let mut scores = k.slice(s![..i + 1, lo..hi]).dot(&q.slice(s![i, lo..hi])) * self.scale();
                softmax_in_place(&mut scores);
                let mixed = v.slice(s![..i + 1, lo..hi]).t().dot(&scores);
                out.slice_mut(s![i, lo..hi]).assign(&mixed);
            }
        }
        self.wo.forward(&out)
    }
}

/// Two-layer feed-forward network with GELU activation.
pub struct FeedForward {
    w1: Linear,
    w2: Linear,
}

impl FeedForward {
    pub fn new<R: Rng>(dim: usize, hidden_dim: usize, rng: &mut R) -> Self {
        Self {
            w1: Linear::new(dim, hidden_dim, true, rng),
            w2: Linear::new(hidden_dim, dim, true, rng),
        }
    }

    pub fn forward_one(&self, x: &ArrayView1<f32>) -> Array1<f32> {
        let hidden = self.w1.forward_one(x).mapv(gelu);
        self.w2.forward_one(&hidden.view())
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let hidden = self.w1.forward(x).mapv(gelu);
        self.w2.forward(&hidden)
    }
}

/// Transformer block: attention and feed-forward, each behind a layer norm
/// and a residual connection.
pub struct Block {
    attn_norm: LayerNorm,
    attn: Attention,
    ffn_norm: LayerNorm,
    ffn: FeedForward,
}

impl Block {
    pub fn new<R: Rng>(args: &ModelArgs, rng: &mut R) -> Self {
        Self {
            attn_norm: LayerNorm::new(args.dim),
            attn: Attention::new(args.dim, args.n_heads, rng),
            ffn_norm: LayerNorm::new(args.dim),
            ffn: FeedForward::new(args.dim, args.hidden_dim, rng),
        }
    }

    pub fn forward_step(
        &self,
        x: Array1<f32>,
        pos: usize,
        cache: &mut LayerCache,
    ) -> Result<Array1<f32>, EngineError> {
        let h = self.attn_norm.forward_one(&x.view());
        let h = self.attn.forward_step(&h.view(), pos, cache)?;
        let x = x + &h;
        let h = self.ffn_norm.forward_one(&x.view());
        let h = self.ffn.forward_one(&h.view());
        Ok(x + &h)
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let h = self.attn_norm.forward(x);
        let h = self.attn.forward(&h);
        let x = x + &h;
        let h = self.ffn_norm.forward(&x);
        let h = self.ffn.forward(&h);
        x + &h
    }
}

/// Full Transformer model used for generation.
pub struct Transformer {
    pub args: ModelArgs,
    tok_embed: Embedding,
    pos_embed: Embedding,
    layers: Vec<Block>,
    norm: LayerNorm,
    head: Linear,
}

impl Transformer {
    pub fn new<R: Rng>(args: ModelArgs, rng: &mut R) -> Result<Self, EngineError> {
        args.validate()?;
        let tok_embed = Embedding::new(args.vocab_size, args.dim, rng);
        let pos_embed = Embedding::new(args.max_seq_len, args.dim, rng);
        let layers = (0..args.n_layers).map(|_| Block::new(&args, rng)).collect();
        let norm = LayerNorm::new(args.dim);
        let head = Linear::new(args.dim, args.vocab_size, false, rng);
        Ok(Self {
            args,
            tok_embed,
            pos_embed,
            layers,
            norm,
            head,
        })
    }

    /// Start a generation with an empty cache.
    pub fn session(&self) -> Session {
        Session::new(&self.args)
    }

    /// Run one token through the model at the session's next position and
    /// return the logits for the following token.
    pub fn step(&self, session: &mut Session, token: usize) -> Result<Array1<f32>, EngineError> {
        if session.is_full() {
            return Err(EngineError::ContextFull {
                capacity: self.args.max_seq_len,
            });
        }
        let pos = session.pos;
        let mut x = &self.tok_embed.lookup(token)? + &self.pos_embed.weight.row(pos);
        for (layer, cache) in self.layers.iter().zip(session.cache.layers.iter_mut()) {
            x = layer.forward_step(x, pos, cache)?;
        }
        session.pos += 1;
        let x = self.norm.forward_one(&x.view());
        Ok(self.head.forward_one(&x.view()))
    }

    /// Recompute logits for every position of `tokens` from scratch.
    pub fn forward(&self, tokens: &[usize]) -> Result<Array2<f32>, EngineError> {
        if tokens.len() > self.args.max_seq_len {
            return Err(EngineError::ContextFull {
                capacity: self.args.max_seq_len,
            });
        }
        let mut h = self.tok_embed.forward(tokens)?;
        h += &self.pos_embed.weight.slice(s![..tokens.len(), ..]);
        for layer in &self.layers {
            h = layer.forward(&h);
        }
        let h = self.norm.forward(&h);
        Ok(self.head.forward(&h))
    }

    /// Generate up to `params.max_new_tokens` ids after `prompt`, never more
    /// than [`sampler::MAX_NEW_TOKENS`].
    ///
    /// Every prompt token but the last warms the cache; the loop then feeds
    /// the current last token, samples the next one and appends it. Prompt
    /// tokens past the context window are dropped and generation stops when
    /// the window is full.
    pub fn generate<R: Rng>(
        &self,
        prompt: &[usize],
        params: &SamplingParams,
        rng: &mut R,
    ) -> Result<Vec<usize>, EngineError> {
        let mut session = self.session();
        let (warm, mut last) = match prompt.split_last() {
            Some((&last, rest)) => (rest, last),
            None => (&[][..], UNK_ID),
        };
        for &token in warm.iter().take(self.args.max_seq_len) {
            self.step(&mut session, token)?;
        }

        let budget = params.token_budget();
        let mut output = Vec::with_capacity(budget.min(self.args.max_seq_len));
        while output.len() < budget && !session.is_full() {
            let logits = self.step(&mut session, last)?;
            let next = match logits.as_slice() {
                Some(logits) => sampler::nucleus(logits, params.top_p, params.temperature, rng),
                None => sampler::nucleus(&logits.to_vec(), params.top_p, params.temperature, rng),
            };
            output.push(next);
            last = next;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn softmax_is_normalized_and_stable() {
        let mut scores = array![1000.0_f32, 1000.0, 999.0];
        softmax_in_place(&mut scores);
        assert!((scores.sum() - 1.0).abs() < 1e-6);
        assert!((scores[0] - scores[1]).abs() < 1e-6);
        assert!(scores[2] < scores[0]);
    }

    #[test]
    fn softmax_degenerate_sum_is_uniform() {
        let mut scores = array![f32::NAN, 1.0, 2.0, 3.0];
        softmax_in_place(&mut scores);
        assert!(scores.iter().all(|&p| (p - 0.25).abs() < 1e-6));
    }

    #[test]
    fn gelu_matches_reference_points() {
        assert_eq!(gelu(0.0), 0.0);
        assert!((gelu(1.0) - 0.841_192).abs() < 1e-4);
        assert!((gelu(-1.0) + 0.158_808).abs() < 1e-4);
    }

    #[test]
    fn layer_norm_centers_and_scales() {
        let norm = LayerNorm::new(4);
        let out = norm.forward_one(&array![1.0_f32, 2.0, 3.0, 4.0].view());
        assert!(out.sum().abs() < 1e-5);
        let var = out.fold(0.0, |acc, &v| acc + v * v) / 4.0;
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn linear_adds_bias() {
        let layer = Linear::from_parts(array![[1.0_f32, 0.0], [0.0, 2.0]], Some(array![0.5, -1.0]));
        let y = layer.forward_one(&array![3.0_f32, 4.0].view());
        assert_eq!(y, array![3.5, 7.0]);
    }

    #[test]
    fn cache_rejects_out_of_order_writes() {
        let mut cache = LayerCache::new(4, 2);
        let row = array![1.0_f32, 2.0];
        cache.write(0, &row, &row).unwrap();
        assert!(matches!(
            cache.write(2, &row, &row),
            Err(EngineError::CacheOrder { expected: 1, got: 2 })
        ));
        assert!(matches!(
            cache.write(0, &row, &row),
            Err(EngineError::CacheOrder { expected: 1, got: 0 })
        ));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn first_position_attends_only_to_itself() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        let mut rng = StdRng::seed_from_u64(5);
        let attn = Attention::new(4, 2, &mut rng);
        let x = array![0.3_f32, -0.2, 0.1, 0.4];
        let mut cache = LayerCache::new(2, 4);
        let out = attn.forward_step(&x.view(), 0, &mut cache).unwrap();
        let v = attn.wv.forward_one(&x.view());
        let expected = attn.wo.forward_one(&v.view());
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
