//! Layered text-reply engine.
//!
//! A prompt is answered by the first stage that has something to say:
//! exact response memory, canned intent replies, then a generator (word
//! n-gram model or a toy transformer) chosen at build time.

pub mod config;
pub mod error;
pub mod intent;
pub mod memory;
pub mod model;
pub mod ngram;
pub mod orchestrator;
pub mod sampler;
pub mod transcript;
pub mod vocab;

pub use config::{EngineConfig, GeneratorStrategy};
pub use error::EngineError;
pub use orchestrator::{EngineBuilder, GenerationRequest, IngestReport, Mode, Orchestrator, Reply};
pub use sampler::SamplingParams;
pub use transcript::{parse_transcripts, TrainingPair, TranscriptReport};
