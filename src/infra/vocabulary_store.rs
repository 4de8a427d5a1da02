// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Builds, saves and loads the word-level vocabulary.
//
// The vocabulary is a HuggingFace `tokenizers` WordLevel model
// written directly as tokenizer JSON (no trainer involved):
//
//   id 0  <pad>   padding, also every unknown word
//   id 1  <end>   end of caption (stop-token decoding only)
//   id 2… words   ranked by corpus frequency, ties alphabetical
//
// Captions are normalised by the Preprocessor before counting,
// so the only splitting needed is on whitespace.
//
// Saved as {dir}/tokenizer.json next to the model checkpoints so
// training and inference always share the same indices.
//
// Reference: tokenizers crate documentation (WordLevel model)

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::Tokenizer;

use crate::data::preprocessor::Preprocessor;
use crate::domain::error::{CaptionError, CaptionResult};
use crate::domain::traits::Vocabulary;
use crate::domain::window::PAD_TOKEN;

pub const PAD: &str = "<pad>";
pub const END: &str = "<end>";
const RESERVED: usize = 2;

/// `tokenizers`-backed implementation of the Vocabulary collaborator.
#[derive(Clone)]
pub struct WordVocabulary {
    tokenizer: Tokenizer,
    end_id: u32,
    size: usize,
}

impl WordVocabulary {
    pub fn from_tokenizer(tokenizer: Tokenizer) -> Result<Self> {
        let end_id = tokenizer
            .token_to_id(END)
            .with_context(|| format!("Tokenizer has no '{END}' token"))?;
        let size = tokenizer.get_vocab_size(false);
        Ok(Self {
            tokenizer,
            end_id,
            size,
        })
    }

    /// Build a vocabulary of at most `vocab_size` entries from raw captions.
    pub fn from_texts(texts: &[String], vocab_size: usize) -> Result<Self> {
        let json = tokenizer_json(texts, vocab_size);
        let tokenizer = Tokenizer::from_bytes(serde_json::to_vec(&json)?)
            .map_err(|e| anyhow::anyhow!("Cannot build tokenizer: {e}"))?;
        Self::from_tokenizer(tokenizer)
    }
}

impl Vocabulary for WordVocabulary {
    fn tokenize(&self, text: &str) -> CaptionResult<Vec<u32>> {
        let enc = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| CaptionError::Vocabulary(e.to_string()))?;
        Ok(enc
            .get_ids()
            .iter()
            .copied()
            .filter(|&id| id != PAD_TOKEN)
            .collect())
    }

    fn detokenize(&self, tokens: &[u32]) -> CaptionResult<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| CaptionError::Vocabulary(e.to_string()))
    }

    fn vocabulary_size(&self) -> usize {
        self.size
    }

    fn end_token(&self) -> u32 {
        self.end_id
    }
}

/// Tokenizer JSON in the format `Tokenizer::from_file` expects.
fn tokenizer_json(texts: &[String], vocab_size: usize) -> serde_json::Value {
    let prep = Preprocessor::new();
    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in prep.clean(text).split_whitespace() {
            *freq.entry(word.to_string()).or_insert(0) += 1;
        }
    }

    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size.saturating_sub(RESERVED));

    let mut vocab = serde_json::Map::new();
    vocab.insert(PAD.to_string(), serde_json::json!(0));
    vocab.insert(END.to_string(), serde_json::json!(1));
    for (id, (word, _)) in words.iter().enumerate() {
        vocab.insert(word.clone(), serde_json::json!(id + RESERVED));
    }

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": PAD, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": END, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "WhitespaceSplit" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": PAD
        }
    })
}

pub struct VocabularyStore {
    dir: PathBuf,
}

impl VocabularyStore {
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: PathBuf::from(dir.into()),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load the saved vocabulary, or build one from `texts` and save it.
    pub fn load_or_build(&self, texts: &[String], vocab_size: usize) -> Result<WordVocabulary> {
        if self.path().exists() {
            tracing::info!("Loading existing vocabulary from disk");
            self.load()
        } else {
            tracing::info!("Building new vocabulary (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    pub fn load(&self) -> Result<WordVocabulary> {
        let path = self.path();
        let tokenizer = Tokenizer::from_file(&path).map_err(|e| {
            anyhow::anyhow!("Cannot load vocabulary from '{}': {}", path.display(), e)
        })?;
        WordVocabulary::from_tokenizer(tokenizer)
    }

    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<WordVocabulary> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let json = tokenizer_json(texts, vocab_size);
        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&json)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        let vocab = self.load()?;
        tracing::info!(
            "Vocabulary built with {} entries, saved to '{}'",
            vocab.vocabulary_size(),
            path.display()
        );
        Ok(vocab)
    }
}
