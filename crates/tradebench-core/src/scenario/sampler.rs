use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::BenchError;

/// Draws items from a fixed discrete distribution.
#[derive(Debug, Clone)]
pub struct WeightedSampler<T> {
    items: Vec<T>,
    index: WeightedIndex<f64>,
}

impl<T> WeightedSampler<T> {
    /// Weights need not sum to one but must be non-negative with a positive
    /// total.
    pub fn new(weighted: impl IntoIterator<Item = (T, f64)>) -> Result<Self, BenchError> {
        let (items, weights): (Vec<T>, Vec<f64>) = weighted.into_iter().unzip();
        let index = WeightedIndex::new(&weights)
            .map_err(|e| BenchError::Config(format!("invalid operation weights: {e}")))?;
        Ok(Self { items, index })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.items[self.index.sample(rng)]
    }
}
