//! Command-line options shared by the binaries.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reply_engine::model::ModelArgs;
use reply_engine::{EngineConfig, GeneratorStrategy};

use crate::corpus::{load_config, load_engine, CorpusSources, LoadedEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GeneratorKind {
    Ngram,
    Transformer,
}

#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// JSON engine config
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Conversation transcript file(s)
    #[arg(long, default_value = "data/conversations.jsonl")]
    pub transcripts: Vec<PathBuf>,

    /// Flat text corpus file(s) for the n-gram model
    #[arg(long)]
    pub corpus: Vec<PathBuf>,

    /// Override the configured generator
    #[arg(long, value_enum)]
    pub generator: Option<GeneratorKind>,

    /// N-gram order when the n-gram generator is used
    #[arg(long)]
    pub order: Option<usize>,

    /// Seed for weights and sampling; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum new tokens per reply
    #[arg(long)]
    pub max_new: Option<usize>,

    /// Nucleus probability threshold; 0 means greedy
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,
}

impl EngineArgs {
    /// Config file merged with command-line overrides.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = load_config(self.config.as_deref())?;
        match (self.generator, self.order) {
            (Some(GeneratorKind::Transformer), _) => {
                if !matches!(config.generator, GeneratorStrategy::Transformer(_)) {
                    config.generator = GeneratorStrategy::Transformer(ModelArgs::default());
                }
            }
            (Some(GeneratorKind::Ngram), order) => {
                config.generator = GeneratorStrategy::Ngram {
                    order: order.unwrap_or(2),
                };
            }
            (None, Some(order)) => {
                if let GeneratorStrategy::Ngram { order: o } = &mut config.generator {
                    *o = order;
                }
            }
            (None, None) => {}
        }
        if let Some(max_new) = self.max_new {
            config.defaults.max_new_tokens = max_new;
        }
        if let Some(top_p) = self.top_p {
            config.defaults.top_p = top_p;
        }
        if let Some(temperature) = self.temperature {
            config.defaults.temperature = temperature;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn sources(&self) -> CorpusSources {
        CorpusSources {
            transcripts: self.transcripts.clone(),
            texts: self.corpus.clone(),
        }
    }

    /// Load config and corpus and build the engine.
    pub fn load(&self, rng: &mut StdRng) -> Result<LoadedEngine> {
        let config = self.engine_config()?;
        load_engine(&config, &self.sources(), rng)
    }
}
