//! Word-level vocabulary and the text normalization shared by every stage.

use std::collections::HashMap;

/// Reserved token for words missing from a fixed vocabulary.
pub const UNK_TOKEN: &str = "<unk>";
/// Id of [`UNK_TOKEN`]; always the first entry.
pub const UNK_ID: usize = 0;

const PUNCTUATION: [char; 6] = [',', '.', '?', '!', ';', ':'];

fn strip_punctuation(text: &str) -> String {
    text.chars().filter(|c| !PUNCTUATION.contains(c)).collect()
}

/// Canonical form of an utterance: lower-cased, punctuation stripped and
/// whitespace collapsed to single spaces.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Split text into normalized words.
pub fn tokenize(text: &str) -> Vec<String> {
    strip_punctuation(&text.to_lowercase())
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Bidirectional word/id table.
///
/// Ids are assigned in insertion order and never reused. A growable
/// vocabulary assigns new ids to unseen words while encoding; a fixed one maps
/// them to [`UNK_ID`].
#[derive(Clone, Debug)]
pub struct Vocab {
    word_to_id: HashMap<String, usize>,
    id_to_word: Vec<String>,
    growable: bool,
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocab {
    /// Create an empty growable vocabulary holding only `<unk>`.
    pub fn new() -> Self {
        let mut vocab = Self {
            word_to_id: HashMap::new(),
            id_to_word: Vec::new(),
            growable: true,
        };
        vocab.add_word(UNK_TOKEN);
        vocab
    }

    /// Create a fixed vocabulary from a seed list. `<unk>` keeps id 0 and a
    /// repeated word keeps the id of its first occurrence.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Self::new();
        for word in words {
            vocab.add_word(word.as_ref());
        }
        vocab.growable = false;
        vocab
    }

    /// Insert a word, returning its id (existing or fresh).
    pub fn add_word(&mut self, word: &str) -> usize {
        if let Some(&id) = self.word_to_id.get(word) {
            return id;
        }
        let id = self.id_to_word.len();
        self.word_to_id.insert(word.to_string(), id);
        self.id_to_word.push(word.to_string());
        id
    }

    /// Encode text, growing the vocabulary if it is growable.
    pub fn encode(&mut self, text: &str) -> Vec<usize> {
        if !self.growable {
            return self.encode_frozen(text);
        }
        tokenize(text).iter().map(|w| self.add_word(w)).collect()
    }

    /// Encode text without mutating the table; unseen words become `<unk>`.
    pub fn encode_frozen(&self, text: &str) -> Vec<usize> {
        tokenize(text)
            .iter()
            .map(|w| self.word_to_id.get(w).copied().unwrap_or(UNK_ID))
            .collect()
    }

    /// Join the words for `ids` with single spaces, skipping ids that are
    /// out of range.
    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter()
            .filter_map(|&id| self.id_to_word.get(id).map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn id(&self, word: &str) -> Option<usize> {
        self.word_to_id.get(word).copied()
    }

    pub fn word(&self, id: usize) -> Option<&str> {
        self.id_to_word.get(id).map(String::as_str)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.word_to_id.contains_key(word)
    }

    pub fn len(&self) -> usize {
        self.id_to_word.len()
    }

    /// True when only `<unk>` is present.
    pub fn is_empty(&self) -> bool {
        self.id_to_word.len() <= 1
    }

    pub fn is_growable(&self) -> bool {
        self.growable
    }

    /// Stop assigning ids to unseen words.
    pub fn freeze(&mut self) {
        self.growable = false;
    }
}
