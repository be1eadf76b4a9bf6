use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use reply_engine::{EngineConfig, GeneratorStrategy, Mode};
use reply_service::wire::{handle_line, NO_ANSWER_REPLY};
use reply_service::{load_config, load_engine, CorpusSources, HistoryStore};
use tempfile::TempDir;

const TRANSCRIPT: &str = r#"{"messages":[
    {"role":"user","content":"Bạn thích màu gì?"},
    {"role":"assistant","content":"Mình thích màu xanh."}
]}
not a conversation
{"messages":[{"role":"user","content":"ping"},{"role":"assistant","content":"pong"}]}
"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_engine_from_files() {
    let dir = TempDir::new().unwrap();
    let sources = CorpusSources {
        transcripts: vec![write(&dir, "chat.jsonl", TRANSCRIPT), dir.path().join("absent.jsonl")],
        texts: vec![write(&dir, "corpus.txt", "the cat sat. the cat ran.")],
    };
    let mut rng = StdRng::seed_from_u64(3);
    let loaded = load_engine(&EngineConfig::default(), &sources, &mut rng).unwrap();

    assert!(loaded.orchestrator.is_trained());
    assert_eq!(loaded.conversations, 2);
    assert_eq!(loaded.ingest.pairs, 2);
    assert_eq!(loaded.ingest.texts, 1);
    assert_eq!(loaded.missing, vec![dir.path().join("absent.jsonl")]);
    assert_eq!(loaded.skipped.len(), 1);
    assert_eq!(loaded.skipped[0].entry.line, 5);

    let summary = loaded.summary();
    assert!(summary[0].contains("absent.jsonl"));
    assert!(summary.last().unwrap().starts_with("Loaded 2 conversations"));

    let reply = loaded.orchestrator.answer_prompt("bạn thích màu gì", &mut rng);
    assert_eq!(reply.text, "Mình thích màu xanh.");
    assert_eq!(reply.mode, Mode::Memory);
}

#[test]
fn test_missing_everything_leaves_engine_untrained() {
    let dir = TempDir::new().unwrap();
    let sources = CorpusSources {
        transcripts: vec![dir.path().join("none.jsonl")],
        texts: vec![],
    };
    let loaded = load_engine(&EngineConfig::default(), &sources, &mut StdRng::seed_from_u64(0)).unwrap();
    assert!(!loaded.orchestrator.is_trained());
    assert!(loaded.summary().last().unwrap().contains("untrained"));

    let (response, _) = handle_line(&loaded.orchestrator, r#"{"prompt":"hello"}"#, &mut StdRng::seed_from_u64(0));
    assert_eq!(response.mode, "untrained");
}

#[test]
fn test_load_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "engine.json", r#"{"generator":{"kind":"ngram","order":3},"defaults":{"max_new_tokens":1}}"#);
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.generator, GeneratorStrategy::Ngram { order: 3 });
    assert_eq!(config.defaults.max_new_tokens, 1);

    let bad = write(&dir, "bad.json", r#"{"generator":{"kind":"ngram","order":0}}"#);
    let err = load_config(Some(&bad)).unwrap_err();
    assert!(err.to_string().contains("bad.json"));

    assert!(load_config(Some(&dir.path().join("missing.json"))).is_err());
    assert_eq!(load_config(None).unwrap(), EngineConfig::default());
}

#[test]
fn test_unknown_prompt_gets_no_answer_message() {
    let dir = TempDir::new().unwrap();
    let sources = CorpusSources {
        transcripts: vec![write(&dir, "chat.jsonl", TRANSCRIPT)],
        texts: vec![],
    };
    let mut rng = StdRng::seed_from_u64(9);
    let loaded = load_engine(&EngineConfig::default(), &sources, &mut rng).unwrap();

    // every word is outside the vocabulary, so the n-gram has nothing to continue
    let (response, answered) = handle_line(&loaded.orchestrator, r#"{"prompt":"zzz qqq"}"#, &mut rng);
    let (_, reply) = answered.unwrap();
    if reply.is_blank() {
        assert_eq!(response.reply, NO_ANSWER_REPLY);
    }
    assert_eq!(response.mode, "ngram");
}

#[test]
fn test_history_records_answered_turns() {
    let dir = TempDir::new().unwrap();
    let sources = CorpusSources {
        transcripts: vec![write(&dir, "chat.jsonl", TRANSCRIPT)],
        texts: vec![],
    };
    let mut rng = StdRng::seed_from_u64(1);
    let loaded = load_engine(&EngineConfig::default(), &sources, &mut rng).unwrap();
    let store = HistoryStore::new(dir.path().join("history.db")).unwrap();

    for line in [r#"{"prompt":"ping"}"#, "garbage", r#"{"prompt":"Ping!"}"#] {
        if let (_, Some((request, reply))) = handle_line(&loaded.orchestrator, line, &mut rng) {
            store.record_turn(&request.prompt, &reply).unwrap();
        }
    }

    assert_eq!(store.turn_count().unwrap(), 2);
    let turns = store.recent_turns(10).unwrap();
    assert_eq!(turns[1].prompt, "Ping!");
    assert_eq!(turns[1].reply, "pong");
    assert_eq!(store.mode_counts().unwrap(), vec![("memory".to_string(), 2)]);
    assert!(store.stats().unwrap().db_size_bytes > 0);
}
