// ============================================================
// Layer 3 — Token Window
// ============================================================
// The "words seen so far" input of the language branch.
//
// A window always holds exactly `max_words` vocabulary indices.
// Shorter prefixes are padded on the LEFT with PAD_TOKEN so the
// most recent word always sits in the last slot:
//
//   prefix [7, 3], max_words 5  →  [0, 0, 0, 7, 3]
//
// Longer prefixes keep only their last `max_words` tokens.

use serde::{Deserialize, Serialize};

/// Reserved vocabulary index for padding (and unknown words).
pub const PAD_TOKEN: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenWindow {
    tokens: Vec<u32>,
}

impl TokenWindow {
    /// A fully padded window: "no words yet".
    pub fn empty(max_words: usize) -> Self {
        Self {
            tokens: vec![PAD_TOKEN; max_words],
        }
    }

    pub fn from_prefix(prefix: &[u32], max_words: usize) -> Self {
        let keep = prefix.len().min(max_words);
        let mut tokens = vec![PAD_TOKEN; max_words - keep];
        tokens.extend_from_slice(&prefix[prefix.len() - keep..]);
        Self { tokens }
    }

    /// Shift every token one slot left and append `token` in the last slot.
    pub fn push(&mut self, token: u32) {
        if self.tokens.is_empty() {
            return;
        }
        self.tokens.rotate_left(1);
        if let Some(last) = self.tokens.last_mut() {
            *last = token;
        }
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The non-pad tokens, oldest first.
    pub fn words(&self) -> Vec<u32> {
        self.tokens
            .iter()
            .copied()
            .filter(|&t| t != PAD_TOKEN)
            .collect()
    }
}
