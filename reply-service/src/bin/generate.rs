//! One-shot reply generation.
//!
//! Answers a single `--prompt`, or every line of `--input-file`, and exits.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use reply_engine::GenerationRequest;
use reply_service::cli::EngineArgs;
use reply_service::wire::ChatResponse;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(flatten)]
    engine: EngineArgs,

    /// Prompt to answer
    #[arg(long)]
    prompt: Option<String>,

    /// Input file with prompts (one per line)
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Skip the memory and intent stages and run the generator directly
    #[arg(long)]
    raw: bool,

    /// Print JSON responses instead of plain text
    #[arg(long)]
    json: bool,
}

fn load_prompts(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut prompts = Vec::new();
    if let Some(prompt) = &args.prompt {
        prompts.push(prompt.clone());
    }
    if let Some(path) = &args.input_file {
        prompts.extend(load_prompts(path)?);
    }
    if prompts.is_empty() {
        bail!("nothing to answer: pass --prompt or --input-file");
    }

    let mut rng = args.engine.rng();
    let loaded = args.engine.load(&mut rng)?;
    for line in loaded.summary() {
        eprintln!("{}", line);
    }
    let engine = loaded.orchestrator;

    for prompt in &prompts {
        if args.raw {
            let request = GenerationRequest::with_params(prompt.as_str(), engine.defaults().clone());
            println!("Prompt: {}", prompt);
            println!("Completion: {}\n", engine.generate(&request, &mut rng));
            continue;
        }
        let response = ChatResponse::from_reply(&engine.answer_prompt(prompt, &mut rng));
        if args.json {
            println!("{}", response.to_json());
        } else {
            println!("Prompt: {}", prompt);
            println!("Reply ({}): {}\n", response.mode, response.reply);
        }
    }
    Ok(())
}
