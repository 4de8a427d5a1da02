// ============================================================
// Layer 5 — Autoregressive Decoder
// ============================================================
// Drives a NextWordModel one word at a time:
//
//   window = [pad … pad]
//   repeat:
//     p      = model.predict(inputs with window)
//     token  = argmax(p)                     if temperature == 0
//              sample(softmax(log p / T))    otherwise
//     window.push(token)
//
// FixedLength runs exactly `max_words` steps. StopToken also stops
// as soon as the end token is chosen; the end token is not part of
// the output but its probability counts towards the confidence.
//
// Confidence is the mean probability (under the unscaled model
// distribution) of every chosen token.
//
// Reference: Rust Book §10 (Traits), rand::distributions::WeightedIndex

use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use serde::{Deserialize, Serialize};

use crate::domain::error::{CaptionError, CaptionResult};
use crate::domain::features::ExampleInputs;
use crate::domain::traits::NextWordModel;
use crate::domain::window::TokenWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Termination {
    #[default]
    FixedLength,
    StopToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub tokens: Vec<u32>,
    pub confidence: f32,
}

pub struct AutoregressiveDecoder {
    max_words: usize,
    termination: Termination,
    end_token: u32,
}

impl AutoregressiveDecoder {
    pub fn new(max_words: usize, termination: Termination, end_token: u32) -> Self {
        Self {
            max_words,
            termination,
            end_token,
        }
    }

    /// Decode one caption for `inputs`. The window carried by `inputs`
    /// is ignored; decoding always starts from an empty one.
    pub fn decode<M, R>(
        &self,
        model: &M,
        inputs: &ExampleInputs,
        temperature: f32,
        rng: &mut R,
    ) -> CaptionResult<Decoded>
    where
        M: NextWordModel + ?Sized,
        R: Rng + ?Sized,
    {
        let mut step_inputs = inputs.clone();
        step_inputs.window = TokenWindow::empty(inputs.window.len());

        let mut tokens = Vec::with_capacity(self.max_words);
        let mut likelihoods = Vec::with_capacity(self.max_words);

        for step in 0..self.max_words {
            let probs = model.predict(&step_inputs)?;
            let token = choose(&probs, temperature, &mut *rng)?;
            likelihoods.push(probs[token as usize]);
            tracing::trace!("step {}: token {} p={:.4}", step, token, probs[token as usize]);

            if self.termination == Termination::StopToken && token == self.end_token {
                break;
            }
            tokens.push(token);
            step_inputs.window.push(token);
        }

        let confidence = if likelihoods.is_empty() {
            0.0
        } else {
            likelihoods.iter().sum::<f32>() / likelihoods.len() as f32
        };
        Ok(Decoded { tokens, confidence })
    }
}

/// Pick the next token from a probability distribution.
pub fn choose<R: Rng + ?Sized>(probs: &[f32], temperature: f32, rng: &mut R) -> CaptionResult<u32> {
    if temperature <= 0.0 {
        return argmax(probs);
    }
    let weights = tempered(probs, temperature);
    let dist = WeightedIndex::new(&weights)
        .map_err(|_| CaptionError::EmptyDistribution { len: probs.len() })?;
    Ok(dist.sample(rng) as u32)
}

fn argmax(probs: &[f32]) -> CaptionResult<u32> {
    probs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .fold(None, |best: Option<(usize, f32)>, (i, &p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((i, p)),
        })
        .map(|(i, _)| i as u32)
        .ok_or(CaptionError::EmptyDistribution { len: probs.len() })
}

/// softmax(log(p) / T), computed stably. Zero probabilities stay zero.
fn tempered(probs: &[f32], temperature: f32) -> Vec<f64> {
    let logits: Vec<f64> = probs
        .iter()
        .map(|&p| {
            if p > 0.0 && p.is_finite() {
                (p as f64).ln() / temperature as f64
            } else {
                f64::NEG_INFINITY
            }
        })
        .collect();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![0.0; probs.len()];
    }
    let exp: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::{ContextVector, GridCell, ImageTensor, LocalContext};
    use rand::{rngs::StdRng, SeedableRng};
    use std::cell::RefCell;

    /// Predicts `window.last + 1` with probability 0.7, spread evenly otherwise.
    struct CountingModel {
        vocab: usize,
        calls: RefCell<Vec<Vec<u32>>>,
    }

    impl CountingModel {
        fn new(vocab: usize) -> Self {
            Self {
                vocab,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl NextWordModel for CountingModel {
        fn predict(&self, inputs: &ExampleInputs) -> CaptionResult<Vec<f32>> {
            self.calls.borrow_mut().push(inputs.window.tokens().to_vec());
            let last = *inputs.window.tokens().last().unwrap_or(&0) as usize;
            let next = (last + 1) % self.vocab;
            let rest = 0.3 / (self.vocab - 1) as f32;
            let mut p = vec![rest; self.vocab];
            p[next] = 0.7;
            Ok(p)
        }
    }

    struct FailingModel;

    impl NextWordModel for FailingModel {
        fn predict(&self, _: &ExampleInputs) -> CaptionResult<Vec<f32>> {
            Err(CaptionError::Model("bad shape".to_string()))
        }
    }

    fn inputs(max_words: usize) -> ExampleInputs {
        ExampleInputs {
            global: ImageTensor::zeros(2),
            local: LocalContext::Grid(GridCell { row: 0, col: 0 }),
            window: TokenWindow::from_prefix(&[9, 9], max_words),
            context: ContextVector([0.0; 5]),
        }
    }

    #[test]
    fn test_greedy_decoding_is_deterministic() {
        let model = CountingModel::new(8);
        let decoder = AutoregressiveDecoder::new(4, Termination::FixedLength, 1);
        let mut rng = StdRng::seed_from_u64(1);
        let a = decoder.decode(&model, &inputs(4), 0.0, &mut rng).unwrap();
        let b = decoder.decode(&model, &inputs(4), 0.0, &mut rng).unwrap();
        assert_eq!(a, b);
        // starts from an empty window (last = 0), so 1, 2, 3, 4
        assert_eq!(a.tokens, vec![1, 2, 3, 4]);
        assert!((a.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_length_runs_exactly_max_words_steps() {
        let model = CountingModel::new(5);
        let decoder = AutoregressiveDecoder::new(6, Termination::FixedLength, 1);
        let mut rng = StdRng::seed_from_u64(2);
        let out = decoder.decode(&model, &inputs(6), 1.0, &mut rng).unwrap();
        assert_eq!(out.tokens.len(), 6);
        assert_eq!(model.calls.borrow().len(), 6);
    }

    #[test]
    fn test_window_holds_previous_choices() {
        let model = CountingModel::new(8);
        let decoder = AutoregressiveDecoder::new(3, Termination::FixedLength, 1);
        let mut rng = StdRng::seed_from_u64(3);
        decoder.decode(&model, &inputs(3), 0.0, &mut rng).unwrap();
        let calls = model.calls.borrow();
        assert_eq!(calls[0], vec![0, 0, 0]);
        assert_eq!(calls[1], vec![0, 0, 1]);
        assert_eq!(calls[2], vec![0, 1, 2]);
    }

    #[test]
    fn test_stop_token_ends_early() {
        let model = CountingModel::new(8);
        // greedy path is 1, 2, 3, … so stopping on 3 yields two tokens
        let decoder = AutoregressiveDecoder::new(6, Termination::StopToken, 3);
        let mut rng = StdRng::seed_from_u64(4);
        let out = decoder.decode(&model, &inputs(6), 0.0, &mut rng).unwrap();
        assert_eq!(out.tokens, vec![1, 2]);
        assert_eq!(model.calls.borrow().len(), 3);
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let model = CountingModel::new(6);
        let decoder = AutoregressiveDecoder::new(8, Termination::FixedLength, 1);
        let a = decoder
            .decode(&model, &inputs(8), 1.5, &mut StdRng::seed_from_u64(42))
            .unwrap();
        let b = decoder
            .decode(&model, &inputs(8), 1.5, &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_model_failure_is_fatal() {
        let decoder = AutoregressiveDecoder::new(3, Termination::FixedLength, 1);
        let mut rng = StdRng::seed_from_u64(5);
        let err = decoder.decode(&FailingModel, &inputs(3), 0.0, &mut rng);
        assert!(matches!(err, Err(CaptionError::Model(_))));
    }

    #[test]
    fn test_low_temperature_approaches_greedy() {
        let mut rng = StdRng::seed_from_u64(6);
        let probs = [0.1, 0.6, 0.3];
        for _ in 0..50 {
            assert_eq!(choose(&probs, 0.01, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_zero_probability_tokens_are_never_sampled() {
        let mut rng = StdRng::seed_from_u64(7);
        let probs = [0.0, 0.5, 0.0, 0.5];
        for _ in 0..100 {
            let t = choose(&probs, 2.0, &mut rng).unwrap();
            assert!(t == 1 || t == 3);
        }
    }

    #[test]
    fn test_empty_distribution() {
        let mut rng = StdRng::seed_from_u64(8);
        assert!(matches!(
            choose(&[0.0, 0.0], 1.0, &mut rng),
            Err(CaptionError::EmptyDistribution { len: 2 })
        ));
        assert!(matches!(
            choose(&[], 0.0, &mut rng),
            Err(CaptionError::EmptyDistribution { len: 0 })
        ));
    }
}
