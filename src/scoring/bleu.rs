// ============================================================
// Layer 5 — BLEU
// ============================================================
// Sentence BLEU-1..n against multiple references, "closest"
// brevity policy:
//
//   correct[k] = Σ min(count_cand(g), max_ref count(g))   |g| = k+1
//   guess[k]   = max(len(cand) - k, 0)
//   bleu_k     = (Π_{i≤k} correct[i] / guess[i]) ^ (1/(k+1))
//   reflen     = length of the reference closest to len(cand)
//                (ties → the shorter one)
//   if len(cand) < reflen:  bleu_k *= exp(1 - reflen/len(cand))
//
// TINY/SMALL smoothing keeps zero-count ratios finite, matching
// the widely used COCO caption scorer.
//
// Reference: Papineni et al. (2002) BLEU

use std::collections::HashMap;

const TINY: f64 = 1e-15;
const SMALL: f64 = 1e-9;

type NGram<'a> = &'a [&'a str];

fn ngram_counts<'a>(words: &'a [&'a str], max_n: usize) -> HashMap<NGram<'a>, usize> {
    let mut counts = HashMap::new();
    for n in 1..=max_n {
        for gram in words.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// Reference length closest to `testlen`.
fn closest_length(testlen: usize, refs: &[Vec<&str>]) -> usize {
    refs.iter()
        .map(Vec::len)
        .min_by_key(|&len| (len.abs_diff(testlen), len))
        .unwrap_or(0)
}

/// BLEU-1..`max_n` of `candidate` against `references` (pre-tokenised words).
pub fn bleu(candidate: &[&str], references: &[Vec<&str>], max_n: usize) -> Vec<f64> {
    let testlen = candidate.len();
    if testlen == 0 || references.is_empty() {
        return vec![0.0; max_n];
    }

    let mut max_ref: HashMap<NGram, usize> = HashMap::new();
    for r in references {
        for (gram, count) in ngram_counts(r, max_n) {
            let slot = max_ref.entry(gram).or_insert(0);
            *slot = (*slot).max(count);
        }
    }

    let mut correct = vec![0usize; max_n];
    for (gram, count) in ngram_counts(candidate, max_n) {
        let clip = max_ref.get(gram).copied().unwrap_or(0);
        correct[gram.len() - 1] += count.min(clip);
    }

    let reflen = closest_length(testlen, references);
    let ratio = (testlen as f64 + TINY) / (reflen as f64 + SMALL);
    let brevity = if ratio < 1.0 { (1.0 - 1.0 / ratio).exp() } else { 1.0 };

    let mut product = 1.0;
    (0..max_n)
        .map(|k| {
            let guess = testlen.saturating_sub(k) as f64;
            product *= (correct[k] as f64 + TINY) / (guess + SMALL);
            product.powf(1.0 / (k as f64 + 1.0)) * brevity
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_exact_match_scores_one() {
        let scores = bleu(&words("the red car on the left"), &[words("the red car on the left")], 2);
        assert!(approx(scores[0], 1.0), "{scores:?}");
        assert!(approx(scores[1], 1.0), "{scores:?}");
    }

    #[test]
    fn test_unigram_precision_without_brevity_penalty() {
        // 2 of 4 candidate words match; candidate as long as the reference
        let scores = bleu(&words("a red dog runs"), &[words("a blue car runs")], 2);
        assert!(approx(scores[0], 0.5), "{scores:?}");
    }

    #[test]
    fn test_clipped_counts() {
        // "the" counted at most twice: reference holds it twice
        let scores = bleu(&words("the the the the"), &[words("the cat the mat")], 1);
        assert!(approx(scores[0], 0.5), "{scores:?}");
    }

    #[test]
    fn test_closest_reference_drives_brevity_penalty() {
        let cand = words("red car");
        let short = words("red car");
        let long = words("a very shiny red car parked on the street");
        // The 2-word reference is closest, so no brevity penalty applies.
        let with_short = bleu(&cand, &[long.clone(), short], 1);
        assert!(approx(with_short[0], 1.0), "{with_short:?}");
        // Only the long reference left: penalised.
        let long_only = bleu(&cand, &[long], 1);
        assert!(long_only[0] < 0.1, "{long_only:?}");
    }

    #[test]
    fn test_closest_length_prefers_shorter_on_ties() {
        let refs = vec![words("a b c d e f"), words("a b")];
        // |6-4| == |2-4| → pick 2
        assert_eq!(closest_length(4, &refs), 2);
        assert_eq!(closest_length(5, &refs), 6);
    }

    #[test]
    fn test_empty_candidate_scores_zero() {
        assert_eq!(bleu(&[], &[words("a cat")], 2), vec![0.0, 0.0]);
    }
}
