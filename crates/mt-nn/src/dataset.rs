// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! In-memory sample storage and mini-batch iteration.
//!
//! Denoising pairs keep the corrupted tensor as the input and the clean
//! tensor as the target, so the loader surface works the same for pre-noised
//! corpora and on-the-fly corruption.

use mt_tensor::{Tensor, TensorResult};
use rand::rngs::StdRng;
use rand::{seq::SliceRandom, SeedableRng};
use std::sync::Arc;

type Sample = (Tensor, Tensor);

/// Lightweight in-memory dataset that keeps input/target tensors paired together.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    /// Builds a dataset from an iterator of `(input, target)` pairs.
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Sample>,
    {
        Self {
            samples: iter.into_iter().collect(),
        }
    }

    /// Builds a dataset from an owning vector.
    pub fn from_vec(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Appends a new sample to the dataset.
    pub fn push(&mut self, input: Tensor, target: Tensor) {
        self.samples.push((input, target));
    }

    /// Returns the number of samples stored in the dataset.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` when no samples are registered.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns an owning iterator that yields cloned samples.
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.samples.iter().cloned()
    }

    /// Splits off the trailing `fraction` of samples as a holdout set,
    /// mirroring a tail validation split. Returns `(train, holdout)`.
    pub fn split_holdout(mut self, fraction: f32) -> (Dataset, Dataset) {
        let fraction = fraction.clamp(0.0, 1.0);
        let holdout_len = ((self.samples.len() as f32) * fraction).round() as usize;
        let cut = self.samples.len() - holdout_len.min(self.samples.len());
        let holdout = self.samples.split_off(cut);
        (self, Dataset { samples: holdout })
    }

    /// Consumes the dataset and turns it into a [`DataLoader`].
    pub fn into_loader(self) -> DataLoader {
        DataLoader::new(self.samples.into())
    }

    /// Creates a [`DataLoader`] that clones the underlying tensors, keeping
    /// the dataset available for further splits.
    pub fn loader(&self) -> DataLoader {
        DataLoader::new(self.samples.clone().into())
    }
}

/// Builds a loader directly from a vector of `(input, target)` pairs.
pub fn from_vec(samples: Vec<Sample>) -> DataLoader {
    DataLoader::new(samples.into())
}

fn default_order(len: usize) -> Arc<Vec<usize>> {
    Arc::new((0..len).collect())
}

fn stack_batch(batch: &[Sample]) -> TensorResult<(Tensor, Tensor)> {
    let (inputs, targets): (Vec<_>, Vec<_>) = batch.iter().cloned().unzip();
    let input = Tensor::cat_rows(&inputs)?;
    let target = Tensor::cat_rows(&targets)?;
    Ok((input, target))
}

/// Iterator over mini-batches produced by a [`DataLoader`].
pub struct DataLoaderBatches {
    samples: Arc<[Sample]>,
    order: Arc<Vec<usize>>,
    batch_size: usize,
    position: usize,
}

impl Iterator for DataLoaderBatches {
    type Item = TensorResult<(Tensor, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let start = self.position;
        let end = (self.position + self.batch_size).min(self.order.len());
        self.position = end;
        let indices = &self.order[start..end];
        if indices.is_empty() {
            return None;
        }
        let mut batch = Vec::with_capacity(indices.len());
        for &idx in indices {
            batch.push(self.samples[idx].clone());
        }
        Some(stack_batch(&batch))
    }
}

/// Builder-style loader supporting deterministic shuffling and fixed batch
/// sizes for feeding training loops.
#[derive(Clone)]
pub struct DataLoader {
    samples: Arc<[Sample]>,
    order: Arc<Vec<usize>>,
    batch_size: usize,
}

impl DataLoader {
    fn new(samples: Arc<[Sample]>) -> Self {
        let len = samples.len();
        Self {
            samples,
            order: default_order(len),
            batch_size: 1,
        }
    }

    /// Returns the number of individual samples referenced by the loader.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` when the underlying dataset holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Creates a new loader with the same dataset but a deterministically
    /// shuffled visitation order using the provided seed.
    pub fn shuffle(mut self, seed: u64) -> Self {
        let mut indices: Vec<usize> = (0..self.samples.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        self.order = Arc::new(indices);
        self
    }

    /// Updates the loader to emit batches of `batch_size` samples.
    pub fn batched(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Creates a new iterator over the configured batches.
    pub fn iter(&self) -> DataLoaderBatches {
        self.clone().into_iter()
    }
}

impl IntoIterator for DataLoader {
    type Item = TensorResult<(Tensor, Tensor)>;
    type IntoIter = DataLoaderBatches;

    fn into_iter(self) -> Self::IntoIter {
        DataLoaderBatches {
            samples: self.samples,
            order: self.order,
            batch_size: self.batch_size,
            position: 0,
        }
    }
}

/// Extension trait that stacks plain sample iterators into fixed-size batches.
pub trait BatchIter: Sized {
    fn batched(self, batch_size: usize) -> BatchIterator<Self>;
}

impl<I> BatchIter for I
where
    I: Iterator<Item = Sample>,
{
    fn batched(self, batch_size: usize) -> BatchIterator<Self> {
        BatchIterator {
            iter: self,
            batch_size: batch_size.max(1),
        }
    }
}

/// Iterator that stacks samples into fixed-size batches.
pub struct BatchIterator<I> {
    iter: I,
    batch_size: usize,
}

impl<I> Iterator for BatchIterator<I>
where
    I: Iterator<Item = Sample>,
{
    type Item = TensorResult<(Tensor, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut inputs = Vec::with_capacity(self.batch_size);
        let mut targets = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            match self.iter.next() {
                Some((input, target)) => {
                    inputs.push(input);
                    targets.push(target);
                }
                None => break,
            }
        }
        if inputs.is_empty() {
            return None;
        }
        let input = match Tensor::cat_rows(&inputs) {
            Ok(tensor) => tensor,
            Err(err) => return Some(Err(err)),
        };
        let target = match Tensor::cat_rows(&targets) {
            Ok(tensor) => tensor,
            Err(err) => return Some(Err(err)),
        };
        Some(Ok((input, target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| {
                let input = Tensor::from_vec(1, 1, vec![i as f32]).unwrap();
                let target = Tensor::from_vec(1, 1, vec![i as f32]).unwrap();
                (input, target)
            })
            .collect()
    }

    #[test]
    fn dataset_batches_rows() {
        let samples = (0..6).map(|i| {
            let input = Tensor::from_vec(1, 2, vec![i as f32, (i + 1) as f32]).unwrap();
            let target = Tensor::from_vec(1, 1, vec![i as f32 * 2.0]).unwrap();
            (input, target)
        });
        let dataset = Dataset::from_iter(samples);
        let mut batches = dataset.iter().batched(3);
        let first = batches.next().unwrap().unwrap();
        assert_eq!(first.0.shape(), (3, 2));
        assert_eq!(first.1.shape(), (3, 1));
        let second = batches.next().unwrap().unwrap();
        assert_eq!(second.0.shape(), (3, 2));
        assert!(batches.next().is_none());
    }

    #[test]
    fn dataloader_shuffles_deterministically() {
        let shuffled = from_vec(numbered(4))
            .shuffle(42)
            .batched(2)
            .iter()
            .map(|batch| batch.unwrap().0.data()[0])
            .collect::<Vec<_>>();
        let shuffled_again = from_vec(numbered(4))
            .shuffle(42)
            .batched(2)
            .iter()
            .map(|batch| batch.unwrap().0.data()[0])
            .collect::<Vec<_>>();
        assert_eq!(shuffled, shuffled_again);
    }

    #[test]
    fn holdout_split_takes_tail_fraction() {
        let dataset = Dataset::from_vec(numbered(10));
        let (train, holdout) = dataset.split_holdout(0.1);
        assert_eq!(train.len(), 9);
        assert_eq!(holdout.len(), 1);
        let tail = holdout.iter().next().unwrap();
        assert_eq!(tail.0.data()[0], 9.0);
    }

    #[test]
    fn holdout_split_handles_zero_fraction() {
        let dataset = Dataset::from_vec(numbered(4));
        let (train, holdout) = dataset.split_holdout(0.0);
        assert_eq!(train.len(), 4);
        assert!(holdout.is_empty());
    }
}
