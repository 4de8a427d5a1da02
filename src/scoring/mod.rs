// ============================================================
// Layer 5 — Scorer
// ============================================================
// Compares a generated caption with the human references of the
// same region:
//
//   bleu1, bleu2  — n-gram precision, closest-reference brevity
//   rouge         — ROUGE-L over the whole reference set
//   likelihood    — the decoder's mean per-step probability
//
// Candidate and references go through the same Preprocessor as
// the training captions before being split into words.

use serde::Serialize;

use crate::data::preprocessor::Preprocessor;

pub mod bleu;
pub mod rouge;
pub mod summary;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    pub bleu1: f64,
    pub bleu2: f64,
    pub rouge: f64,
    pub likelihood: f64,
}

pub fn score(candidate: &str, references: &[String], likelihood: f32) -> Scores {
    let prep = Preprocessor::new();
    let candidate = prep.clean(candidate);
    let references: Vec<String> = references.iter().map(|r| prep.clean(r)).collect();

    let cand_words: Vec<&str> = candidate.split_whitespace().collect();
    let ref_words: Vec<Vec<&str>> = references
        .iter()
        .map(|r| r.split_whitespace().collect())
        .collect();

    let b = bleu::bleu(&cand_words, &ref_words, 2);
    Scores {
        bleu1: b[0],
        bleu2: b[1],
        rouge: rouge::rouge_l(&cand_words, &ref_words),
        likelihood: likelihood as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_caption_scores_one() {
        let s = score("the cat on the sofa", &refs(&["the cat on the sofa"]), 0.4);
        assert!((s.bleu1 - 1.0).abs() < 1e-6);
        assert!((s.bleu2 - 1.0).abs() < 1e-6);
        assert!((s.rouge - 1.0).abs() < 1e-9);
        assert!((s.likelihood - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_normalisation_applies_to_both_sides() {
        let s = score("  The CAT, on the sofa. ", &refs(&["the cat on   the sofa"]), 0.0);
        assert!((s.bleu1 - 1.0).abs() < 1e-6);
        assert!((s.rouge - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_idempotent() {
        let r = refs(&["a red car", "car on the left side"]);
        assert_eq!(score("red car left", &r, 0.5), score("red car left", &r, 0.5));
    }

    #[test]
    fn test_empty_candidate() {
        let s = score("", &refs(&["a dog"]), 0.1);
        assert_eq!(s.bleu1, 0.0);
        assert_eq!(s.rouge, 0.0);
    }
}
