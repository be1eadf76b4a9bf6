//! Front-ends for the reply engine: corpus loading, turn history and the
//! JSON request/response shapes used by the binaries.

pub mod cli;
pub mod corpus;
pub mod history;
pub mod wire;

pub use corpus::{load_config, load_engine, CorpusSources, LoadedEngine};
pub use history::{HistoryStats, HistoryStore, HistoryTurn};
pub use wire::{handle_line, ChatRequest, ChatResponse};
