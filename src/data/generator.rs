// ============================================================
// Layer 4 — Batch Generators
// ============================================================
// Two lazy sequences feed the driver loops:
//
//   TrainingBatches    — infinite. Every batch draws `batch_size`
//                        annotations uniformly at random (with
//                        replacement) and builds one example each.
//                        The RNG is the only iteration state.
//
//   ValidationExamples — finite. One pass over every annotation in
//                        dataset order, one example per item, no
//                        batching. Used for evaluation only.
//
// Rejected annotations (no references, no words, empty box,
// undecodable image) are logged and skipped, never defaulted.
//
// Reference: Rust Book §13 (Iterators and Closures)

use rand::Rng;

use crate::data::example::ExampleBuilder;
use crate::domain::error::{CaptionError, CaptionResult};
use crate::domain::features::TrainingExample;
use crate::domain::traits::{AnnotationSource, Vocabulary};

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Draws per batch slot before giving up on the dataset.
const MAX_ATTEMPTS_PER_SLOT: usize = 10;

pub struct TrainingBatches<'a, D, V: Vocabulary, R> {
    dataset: &'a D,
    builder: &'a ExampleBuilder<V>,
    rng: R,
    batch_size: usize,
}

impl<'a, D, V, R> TrainingBatches<'a, D, V, R>
where
    D: AnnotationSource,
    V: Vocabulary,
    R: Rng,
{
    pub fn new(dataset: &'a D, builder: &'a ExampleBuilder<V>, rng: R, batch_size: usize) -> Self {
        Self {
            dataset,
            builder,
            rng,
            batch_size,
        }
    }

    fn next_batch(&mut self) -> CaptionResult<Vec<TrainingExample>> {
        let mut examples = Vec::with_capacity(self.batch_size);
        let max_attempts = self.batch_size.max(1) * MAX_ATTEMPTS_PER_SLOT;
        let mut attempts = 0usize;

        while examples.len() < self.batch_size {
            if attempts >= max_attempts {
                return Err(CaptionError::DatasetExhausted { attempts });
            }
            attempts += 1;

            let ann = match self.dataset.random_annotation(&mut self.rng) {
                Ok(ann) => ann,
                Err(e) => {
                    tracing::warn!("Skipping unreadable annotation: {}", e);
                    continue;
                }
            };
            match self.builder.build(&ann, &mut self.rng) {
                Ok(ex) => examples.push(ex),
                Err(e) => tracing::warn!("Skipping annotation '{}': {}", ann.key, e),
            }
        }
        Ok(examples)
    }
}

impl<'a, D, V, R> Iterator for TrainingBatches<'a, D, V, R>
where
    D: AnnotationSource,
    V: Vocabulary,
    R: Rng,
{
    type Item = CaptionResult<Vec<TrainingExample>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// One evaluation item: an example plus every reference for scoring.
#[derive(Debug, Clone)]
pub struct ValidationExample {
    pub key: String,
    pub example: TrainingExample,
    pub references: Vec<String>,
}

pub struct ValidationExamples<'a, D, V: Vocabulary, R> {
    dataset: &'a D,
    builder: &'a ExampleBuilder<V>,
    rng: R,
    keys: std::vec::IntoIter<String>,
}

impl<'a, D, V, R> ValidationExamples<'a, D, V, R>
where
    D: AnnotationSource,
    V: Vocabulary,
    R: Rng,
{
    pub fn new(dataset: &'a D, builder: &'a ExampleBuilder<V>, rng: R) -> Self {
        let keys = dataset.all_keys().into_iter();
        Self {
            dataset,
            builder,
            rng,
            keys,
        }
    }
}

impl<'a, D, V, R> Iterator for ValidationExamples<'a, D, V, R>
where
    D: AnnotationSource,
    V: Vocabulary,
    R: Rng,
{
    /// Errors are per item; the caller reports them and keeps iterating.
    type Item = CaptionResult<ValidationExample>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        let item = self.dataset.annotation(&key).and_then(|ann| {
            let example = self.builder.build(&ann, &mut self.rng)?;
            Ok(ValidationExample {
                key: ann.key,
                example,
                references: ann.reference_texts,
            })
        });
        Some(item)
    }
}
