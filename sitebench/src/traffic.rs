//! Traffic mix: weighted random choice between candidate actions, and think
//! time between them.

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

/// Ordered `(weight, candidate)` pairs with a positive total weight.
///
/// Over many draws each candidate is picked with probability
/// `weight / total_weight`. Draws are independent of each other.
#[derive(Debug, Clone)]
pub struct WeightedSet<T> {
    candidates: Vec<(f64, T)>,
    total: f64,
}

impl<T> WeightedSet<T> {
    /// Fails on a negative or non-finite weight, and when no weight is positive.
    pub fn new(candidates: Vec<(f64, T)>) -> Result<Self> {
        for (index, (weight, _)) in candidates.iter().enumerate() {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::InvalidWeight {
                    index,
                    weight: *weight,
                });
            }
        }
        let total: f64 = candidates.iter().map(|(w, _)| w).sum();
        if total <= 0.0 {
            return Err(Error::EmptyWeightedSet);
        }
        Ok(Self { candidates, total })
    }

    /// Every candidate with weight `1`.
    pub fn uniform(candidates: impl IntoIterator<Item = T>) -> Result<Self> {
        Self::new(candidates.into_iter().map(|c| (1.0, c)).collect())
    }

    pub fn total_weight(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, T)> {
        self.candidates.iter()
    }

    /// Draws one candidate using `rng`.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        self.pick_at(rng.random::<f64>() * self.total)
    }

    /// Candidate that `position`, a point in `[0, total_weight)`, falls on.
    ///
    /// A position past the last candidate, which rounding can produce, falls
    /// back to the first candidate even when its weight is zero. Zero weights
    /// are otherwise never picked.
    pub fn pick_at(&self, position: f64) -> &T {
        let mut remaining = position;
        for (weight, candidate) in &self.candidates {
            if *weight > remaining {
                return candidate;
            }
            remaining -= weight;
        }
        &self.candidates[0].1
    }

    /// Draws one candidate using the thread-local generator.
    pub fn choose(&self) -> &T {
        self.pick(&mut rand::rng())
    }
}

/// Uniformly random duration in `[min, max]`.
pub fn think_time(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::rng().random_range(min..=max)
}

/// Pauses for a random think time between `min` and `max`.
pub async fn think(min: Duration, max: Duration) {
    let pause = think_time(min, max);
    tokio::time::sleep(pause).await;
}
