//! Decision pipeline: memory lookup, then intent fallback, then generation.
//!
//! [`EngineBuilder`] collects training data; [`EngineBuilder::build`] freezes
//! it into an [`Orchestrator`] that only reads shared state and can answer
//! from many threads at once.

use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, GeneratorStrategy};
use crate::error::EngineError;
use crate::intent::IntentFallback;
use crate::memory::ResponseMemory;
use crate::model::{ModelArgs, Transformer};
use crate::ngram::NGramModel;
use crate::sampler::SamplingParams;
use crate::transcript::TrainingPair;
use crate::vocab::Vocab;

/// Reply returned while no training data has been loaded.
pub const UNTRAINED_REPLY: &str = "Hi, mình là bot demo, hiện chưa được huấn luyện dữ liệu nên chưa trả lời hay được. \
     Bạn hãy thêm dữ liệu hội thoại nhé!";

/// Pipeline stage that produced a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Memory,
    Fallback,
    Ngram,
    Transformer,
    Untrained,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Memory => "memory",
            Mode::Fallback => "fallback",
            Mode::Ngram => "ngram",
            Mode::Transformer => "transformer",
            Mode::Untrained => "untrained",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prompt plus its sampling knobs.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub params: SamplingParams,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            params: SamplingParams::default(),
        }
    }

    pub fn with_params(prompt: impl Into<String>, params: SamplingParams) -> Self {
        Self {
            prompt: prompt.into(),
            params,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub text: String,
    pub mode: Mode,
    pub latency: Duration,
}

impl Reply {
    /// A blank reply means no stage produced an answer.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The generator selected at build time.
pub enum Generator {
    NGram(NGramModel),
    Transformer(Transformer),
}

impl Generator {
    pub fn mode(&self) -> Mode {
        match self {
            Generator::NGram(_) => Mode::Ngram,
            Generator::Transformer(_) => Mode::Transformer,
        }
    }
}

/// Counts gathered while ingesting training data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pairs: usize,
    pub texts: usize,
    pub distinct_prompts: usize,
    pub vocab_size: usize,
    pub ngram_states: usize,
}

/// Mutable training phase.
pub struct EngineBuilder {
    vocab: Vocab,
    memory: ResponseMemory,
    ngram: NGramModel,
    pairs: usize,
    texts: usize,
}

impl EngineBuilder {
    /// Prepare for ingestion. The n-gram table is trained whichever generator
    /// is configured; it is dropped at build time if unused.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let order = match config.generator {
            GeneratorStrategy::Ngram { order } => order,
            GeneratorStrategy::Transformer(_) => 2,
        };
        let vocab = match &config.seed_vocabulary {
            Some(words) => Vocab::from_words(words),
            None => Vocab::new(),
        };
        Ok(Self {
            vocab,
            memory: ResponseMemory::new(),
            ngram: NGramModel::new(order)?,
            pairs: 0,
            texts: 0,
        })
    }

    /// Feed one (prompt, reply) pair to the memory and the n-gram model.
    pub fn add_pair(&mut self, pair: &TrainingPair) {
        self.memory.insert(&pair.prompt, &pair.reply);
        self.ngram.train_pair(&mut self.vocab, &pair.prompt, &pair.reply);
        self.pairs += 1;
    }

    pub fn add_pairs<'a>(&mut self, pairs: impl IntoIterator<Item = &'a TrainingPair>) {
        for pair in pairs {
            self.add_pair(pair);
        }
    }

    /// Feed a flat text corpus to the n-gram model only.
    pub fn add_text(&mut self, text: &str) {
        self.ngram.train(&mut self.vocab, text);
        self.texts += 1;
    }

    pub fn report(&self) -> IngestReport {
        IngestReport {
            pairs: self.pairs,
            texts: self.texts,
            distinct_prompts: self.memory.len(),
            vocab_size: self.vocab.len(),
            ngram_states: self.ngram.state_count(),
        }
    }

    /// Trained once at least one pair or one transition was seen.
    pub fn is_trained(&self) -> bool {
        self.pairs > 0 || !self.ngram.is_empty()
    }

    /// Freeze the collected state. `rng` initializes transformer weights.
    pub fn build<R: Rng>(self, config: &EngineConfig, rng: &mut R) -> Result<Orchestrator, EngineError> {
        self.build_with(config, IntentFallback::new(), rng)
    }

    pub fn build_with<R: Rng>(
        mut self,
        config: &EngineConfig,
        intents: IntentFallback,
        rng: &mut R,
    ) -> Result<Orchestrator, EngineError> {
        let trained = self.is_trained();
        self.vocab.freeze();
        let generator = match &config.generator {
            GeneratorStrategy::Ngram { .. } => Generator::NGram(self.ngram),
            GeneratorStrategy::Transformer(args) => {
                let args = ModelArgs {
                    vocab_size: self.vocab.len(),
                    ..args.clone()
                };
                Generator::Transformer(Transformer::new(args, rng)?)
            }
        };
        Ok(Orchestrator {
            vocab: self.vocab,
            memory: self.memory,
            intents,
            generator,
            defaults: config.defaults.clone(),
            trained,
        })
    }
}

/// Read-only answering engine.
pub struct Orchestrator {
    vocab: Vocab,
    memory: ResponseMemory,
    intents: IntentFallback,
    generator: Generator,
    defaults: SamplingParams,
    trained: bool,
}

impl Orchestrator {
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn memory(&self) -> &ResponseMemory {
        &self.memory
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Sampling values for request fields the caller did not set.
    pub fn defaults(&self) -> &SamplingParams {
        &self.defaults
    }

    /// Answer a prompt with the configured default parameters.
    pub fn answer_prompt<R: Rng>(&self, prompt: &str, rng: &mut R) -> Reply {
        self.answer(&GenerationRequest::with_params(prompt, self.defaults.clone()), rng)
    }

    /// Run the pipeline. Never fails; a blank text means no stage had an
    /// answer.
    pub fn answer<R: Rng>(&self, request: &GenerationRequest, rng: &mut R) -> Reply {
        let started = Instant::now();
        let (text, mode) = self.decide(request, rng);
        Reply {
            text,
            mode,
            latency: started.elapsed(),
        }
    }

    fn decide<R: Rng>(&self, request: &GenerationRequest, rng: &mut R) -> (String, Mode) {
        if !self.trained {
            return (UNTRAINED_REPLY.to_string(), Mode::Untrained);
        }
        if let Some(reply) = self.memory.find_reply(&request.prompt, rng) {
            return (reply.to_string(), Mode::Memory);
        }
        if let Some(reply) = self.intents.try_answer(&request.prompt) {
            return (reply, Mode::Fallback);
        }
        (self.generate(request, rng), self.generator.mode())
    }

    /// Run only the generative stage.
    pub fn generate<R: Rng>(&self, request: &GenerationRequest, rng: &mut R) -> String {
        let prompt = self.vocab.encode_frozen(&request.prompt);
        let ids = match &self.generator {
            Generator::NGram(model) => model.generate(&prompt, request.params.token_budget(), rng),
            // prompt ids come from the same frozen vocabulary the model was
            // sized with, so the forward pass cannot reject them
            Generator::Transformer(model) => model.generate(&prompt, &request.params, rng).unwrap_or_default(),
        };
        self.vocab.decode(&ids)
    }
}
