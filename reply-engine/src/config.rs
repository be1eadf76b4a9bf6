//! Engine configuration, readable from JSON.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::ModelArgs;
use crate::sampler::SamplingParams;

/// Which generator answers prompts that no earlier stage handled. Chosen
/// once when the engine is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneratorStrategy {
    Ngram {
        #[serde(default = "default_order")]
        order: usize,
    },
    Transformer(ModelArgs),
}

fn default_order() -> usize {
    2
}

impl Default for GeneratorStrategy {
    fn default() -> Self {
        GeneratorStrategy::Ngram { order: default_order() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub generator: GeneratorStrategy,
    /// Values used for request fields the caller leaves out.
    pub defaults: SamplingParams,
    /// Fixed word list; when present the vocabulary never grows.
    pub seed_vocabulary: Option<Vec<String>>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate everything that does not depend on the trained vocabulary.
    pub fn validate(&self) -> Result<(), EngineError> {
        match &self.generator {
            GeneratorStrategy::Ngram { order } if *order == 0 => Err(EngineError::InvalidOrder(0)),
            GeneratorStrategy::Ngram { .. } => Ok(()),
            GeneratorStrategy::Transformer(args) => {
                // vocab_size is filled in at build time
                ModelArgs {
                    vocab_size: args.vocab_size.max(1),
                    ..args.clone()
                }
                .validate()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.generator, GeneratorStrategy::Ngram { order: 2 });
        assert_eq!(config.defaults.max_new_tokens, 40);
    }

    #[test]
    fn parses_transformer_strategy() {
        let config = EngineConfig::from_json(
            r#"{"generator":{"kind":"transformer","dim":32,"n_heads":4},"defaults":{"top_p":0.5}}"#,
        )
        .unwrap();
        match config.generator {
            GeneratorStrategy::Transformer(args) => {
                assert_eq!(args.dim, 32);
                assert_eq!(args.n_layers, ModelArgs::default().n_layers);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
        assert_eq!(config.defaults.top_p, 0.5);
        assert_eq!(config.defaults.temperature, 0.8);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"generator":{"kind":"ngram","order":0}}"#),
            Err(EngineError::InvalidOrder(0))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"generator":{"kind":"transformer","dim":30,"n_heads":4}}"#),
            Err(EngineError::HeadMismatch { .. })
        ));
        assert!(matches!(EngineConfig::from_json("not json"), Err(EngineError::Config(_))));
    }
}
