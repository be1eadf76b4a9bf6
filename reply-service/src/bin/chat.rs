//! Interactive chat front-end for the reply engine.
//!
//! Trains the engine from the configured corpus, then answers prompts read
//! from stdin. Turns are stored in a SQLite history unless `--no-history`
//! is given. With `--jsonl` every input line is a JSON request and every
//! output line a JSON response.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use reply_engine::model::ModelArgs;
use reply_engine::orchestrator::Generator;
use reply_engine::{Orchestrator, Reply};
use reply_service::cli::EngineArgs;
use reply_service::wire::{handle_line, ChatResponse};
use reply_service::HistoryStore;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(flatten)]
    engine: EngineArgs,

    /// SQLite file for the turn history
    #[arg(long, default_value = "conversation_history.db")]
    history: PathBuf,

    /// Do not record turns
    #[arg(long)]
    no_history: bool,

    /// Read JSON requests and write JSON responses, one per line
    #[arg(long)]
    jsonl: bool,
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Application for interactive conversation.
struct ChatApp {
    engine: Orchestrator,
    history: Option<HistoryStore>,
    rng: StdRng,
}

impl ChatApp {
    fn record(&self, prompt: &str, reply: &Reply) {
        if let Some(history) = &self.history {
            if let Err(e) = history.record_turn(prompt, reply) {
                eprintln!("Warning: Failed to save turn to history: {}", e);
            }
        }
    }

    /// Answer JSON request lines until stdin closes.
    fn run_jsonl(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout().lock();
        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (response, answered) = handle_line(&self.engine, &line, &mut self.rng);
            if let Some((request, reply)) = answered {
                self.record(&request.prompt, &reply);
            }
            writeln!(stdout, "{}", response.to_json())?;
            stdout.flush()?;
        }
        Ok(())
    }

    /// Run the interactive chat loop.
    fn run(&mut self) -> Result<()> {
        println!("Reply engine chat");
        println!("=================");
        if let Some(Ok(stats)) = self.history.as_ref().map(HistoryStore::stats) {
            println!("History: {} turns stored", stats.total_turns);
        }
        println!("Commands: 'quit' to exit, '!stats' for statistics, '!clear' to clear history");
        println!();

        let stdin = io::stdin();
        let mut input = String::new();
        loop {
            print!("You: ");
            io::stdout().flush()?;

            input.clear();
            if stdin.lock().read_line(&mut input)? == 0 {
                break;
            }
            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            match input.to_lowercase().as_str() {
                "quit" => {
                    println!("Goodbye!");
                    break;
                }
                "!stats" => {
                    self.show_stats();
                    continue;
                }
                "!clear" => {
                    match &self.history {
                        Some(history) => match history.clear() {
                            Ok(()) => println!("History cleared."),
                            Err(e) => println!("Error clearing history: {}", e),
                        },
                        None => println!("History is disabled."),
                    }
                    continue;
                }
                _ => {}
            }

            let reply = self.engine.answer_prompt(input, &mut self.rng);
            self.record(input, &reply);
            let response = ChatResponse::from_reply(&reply);
            println!("Bot [{}, {} ms]: {}", response.mode, response.ms, response.reply);
            println!();
        }
        Ok(())
    }

    fn show_stats(&self) {
        println!("\nStatistics");
        println!("==========");

        match &self.history {
            Some(history) => match history.stats() {
                Ok(stats) => {
                    println!("Total turns: {}", stats.total_turns);
                    println!("Average latency: {:.1} ms", stats.average_latency_ms);
                    println!(
                        "Database size: {} bytes ({:.1} KB)",
                        stats.db_size_bytes,
                        stats.db_size_bytes as f64 / 1024.0
                    );
                    if let Ok(modes) = history.mode_counts() {
                        for (mode, count) in modes {
                            println!("  {}: {}", mode, count);
                        }
                    }
                    if let Ok(recent) = history.recent_turns(3) {
                        if !recent.is_empty() {
                            println!("\nRecent turns:");
                            for (i, turn) in recent.iter().enumerate() {
                                println!("  {}. You: \"{}\"", i + 1, truncate(&turn.prompt, 50));
                                println!("     Bot: \"{}\"", truncate(&turn.reply, 50));
                            }
                        }
                    }
                }
                Err(e) => println!("Error retrieving statistics: {}", e),
            },
            None => println!("History is disabled."),
        }

        println!(
            "Vocabulary: {} words, {} prompts memorised",
            self.engine.vocab().len(),
            self.engine.memory().len()
        );
        match self.engine.generator() {
            Generator::NGram(model) => {
                println!("Generator: n-gram order {}, {} states", model.order(), model.state_count())
            }
            Generator::Transformer(model) => {
                let ModelArgs { n_layers, dim, max_seq_len, .. } = model.args;
                println!("Generator: transformer {} layers, {} dim, context {}", n_layers, dim, max_seq_len)
            }
        }
        println!();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = args.engine.rng();
    let loaded = args.engine.load(&mut rng)?;
    for line in loaded.summary() {
        eprintln!("{}", line);
    }

    let history = if args.no_history {
        None
    } else {
        match HistoryStore::new(&args.history) {
            Ok(store) => Some(store),
            Err(e) => {
                eprintln!("Warning: history disabled, cannot open {}: {}", args.history.display(), e);
                None
            }
        }
    };

    let mut app = ChatApp {
        engine: loaded.orchestrator,
        history,
        rng,
    };
    if args.jsonl {
        app.run_jsonl()
    } else {
        app.run()
    }
}
