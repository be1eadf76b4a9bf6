//! Loading training data from disk into a ready engine.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;
use reply_engine::transcript::Skipped;
use reply_engine::{parse_transcripts, EngineBuilder, EngineConfig, IngestReport, Orchestrator};

/// Files to train from. Any of them may be absent.
#[derive(Clone, Debug, Default)]
pub struct CorpusSources {
    /// Role-tagged conversation transcripts.
    pub transcripts: Vec<PathBuf>,
    /// Flat text corpora, used for the n-gram model only.
    pub texts: Vec<PathBuf>,
}

/// A skipped transcript entry together with the file it came from.
#[derive(Clone, Debug)]
pub struct SkippedEntry {
    pub file: PathBuf,
    pub entry: Skipped,
}

pub struct LoadedEngine {
    pub orchestrator: Orchestrator,
    pub ingest: IngestReport,
    pub conversations: usize,
    pub skipped: Vec<SkippedEntry>,
    /// Sources that did not exist.
    pub missing: Vec<PathBuf>,
}

impl LoadedEngine {
    /// Status lines for the console, warnings first.
    pub fn summary(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .missing
            .iter()
            .map(|p| format!("Warning: training file {} not found", p.display()))
            .collect();
        lines.extend(self.skipped.iter().map(|s| {
            format!(
                "Warning: skipped {}:{}: {}",
                s.file.display(),
                s.entry.line,
                s.entry.reason
            )
        }));
        if self.orchestrator.is_trained() {
            lines.push(format!(
                "Loaded {} conversations ({} pairs, {} distinct prompts), {} text files; vocabulary {} words",
                self.conversations,
                self.ingest.pairs,
                self.ingest.distinct_prompts,
                self.ingest.texts,
                self.ingest.vocab_size
            ));
        } else {
            lines.push("Warning: no training data loaded, engine is untrained".to_string());
        }
        lines
    }
}

/// Read a JSON config file, or use defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            EngineConfig::from_json(&json).with_context(|| format!("invalid config {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// `Ok(None)` when the file does not exist.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Ingest every source and build the engine.
pub fn load_engine<R: Rng>(config: &EngineConfig, sources: &CorpusSources, rng: &mut R) -> Result<LoadedEngine> {
    let mut builder = EngineBuilder::new(config)?;
    let mut conversations = 0;
    let mut skipped = Vec::new();
    let mut missing = Vec::new();

    for path in &sources.transcripts {
        let Some(text) = read_optional(path)? else {
            missing.push(path.clone());
            continue;
        };
        let report = parse_transcripts(&text);
        conversations += report.conversations;
        builder.add_pairs(&report.pairs);
        skipped.extend(report.skipped.into_iter().map(|entry| SkippedEntry {
            file: path.clone(),
            entry,
        }));
    }

    for path in &sources.texts {
        match read_optional(path)? {
            Some(text) => builder.add_text(&text),
            None => missing.push(path.clone()),
        }
    }

    let ingest = builder.report();
    let orchestrator = builder.build(config, rng)?;
    Ok(LoadedEngine {
        orchestrator,
        ingest,
        conversations,
        skipped,
        missing,
    })
}
