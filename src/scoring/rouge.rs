// ============================================================
// Layer 5 — ROUGE-L
// ============================================================
// Longest-common-subsequence F-measure against a reference set:
//
//   P = max_r LCS(c, r) / |c|      R = max_r LCS(c, r) / |r|
//   F = (1 + β²) P R / (R + β² P)  β = 1.2
//
// P and R are maximised independently over the references, so
// the score does not depend on reference order.
//
// Reference: Lin (2004) ROUGE

const BETA: f64 = 1.2;

/// Length of the longest common subsequence (two-row DP).
pub fn lcs_len(a: &[&str], b: &[&str]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

pub fn rouge_l(candidate: &[&str], references: &[Vec<&str>]) -> f64 {
    if candidate.is_empty() {
        return 0.0;
    }
    let (mut prec, mut rec) = (0.0f64, 0.0f64);
    for r in references.iter().filter(|r| !r.is_empty()) {
        let lcs = lcs_len(candidate, r) as f64;
        prec = prec.max(lcs / candidate.len() as f64);
        rec = rec.max(lcs / r.len() as f64);
    }
    if prec == 0.0 || rec == 0.0 {
        return 0.0;
    }
    let b2 = BETA * BETA;
    (1.0 + b2) * prec * rec / (rec + b2 * prec)
}
