// ============================================================
// Layer 4 — Caption Preprocessor
// ============================================================
// Normalises caption text before tokenisation and before scoring.
// Candidates and references must go through the same cleaning,
// otherwise BLEU/ROUGE compare differently-shaped strings.
//
// Cleaning steps (applied in order):
//   1. Lowercase
//   2. Replace punctuation and control characters with spaces
//      (apostrophes inside words are kept: "man's")
//   3. Collapse runs of whitespace into one space
//   4. Trim both ends
//
// Reference: Rust Book §8 (Strings in Rust)

#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn clean(&self, text: &str) -> String {
        // ── Step 1 + 2: character-level mapping ───────────────────────────────
        let mapped: String = text
            .chars()
            .flat_map(char::to_lowercase)
            .map(|c| {
                if c.is_alphanumeric() || c == '\'' {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        // ── Step 3 + 4: whitespace collapse ───────────────────────────────────
        mapped
            .split_whitespace()
            .map(|w| w.trim_matches('\''))
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_multiple_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("a   red\t car"), "a red car");
    }

    #[test]
    fn test_trims_edges() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("  the dog  "), "the dog");
    }

    #[test]
    fn test_strips_punctuation_and_case() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("The Man's hat, on the LEFT."), "the man's hat on the left");
    }

    #[test]
    fn test_quotes_around_words_are_dropped() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("'blue' car"), "blue car");
    }

    #[test]
    fn test_empty_string() {
        let p = Preprocessor::new();
        assert_eq!(p.clean(""), "");
        assert_eq!(p.clean(" ... "), "");
    }

    #[test]
    fn test_idempotent() {
        let p = Preprocessor::new();
        let once = p.clean("A  zebra, grazing!");
        assert_eq!(p.clean(&once), once);
    }
}
