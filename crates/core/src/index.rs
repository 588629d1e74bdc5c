//! Exact nearest-neighbour search by squared Euclidean distance.
//!
//! Vectors are stored as given. Nothing here normalizes them, so distances
//! are only comparable to a relevance threshold calibrated for the same
//! embedder.

use crate::error::QaError;
use crate::models::Neighbor;
use crate::traits::VectorIndex;

#[derive(Debug, Clone)]
pub struct FlatL2Index<K = usize> {
    dimensions: usize,
    keys: Vec<K>,
    data: Vec<f32>,
}

impl<K> Default for FlatL2Index<K> {
    fn default() -> Self {
        Self {
            dimensions: 0,
            keys: Vec::new(),
            data: Vec::new(),
        }
    }
}

impl FlatL2Index<usize> {
    /// Bulk build keyed by insertion ordinal.
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, QaError> {
        Self::from_entries(vectors.into_iter().enumerate())
    }
}

impl<K: Copy> FlatL2Index<K> {
    pub fn from_entries<I>(entries: I) -> Result<Self, QaError>
    where
        I: IntoIterator<Item = (K, Vec<f32>)>,
    {
        let mut dimensions = None;
        let mut keys = Vec::new();
        let mut data = Vec::new();

        for (key, vector) in entries {
            let expected = *dimensions.get_or_insert(vector.len());
            if expected == 0 {
                return Err(QaError::InvalidInput(
                    "vectors must have at least one dimension".to_string(),
                ));
            }
            if vector.len() != expected {
                return Err(QaError::DimensionMismatch {
                    expected,
                    found: vector.len(),
                });
            }
            keys.push(key);
            data.extend(vector);
        }

        Ok(Self {
            dimensions: dimensions.unwrap_or(0),
            keys,
            data,
        })
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }
}

impl<K: Copy + Send + Sync> VectorIndex for FlatL2Index<K> {
    type Key = K;

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<K>>, QaError> {
        if k == 0 {
            return Err(QaError::InvalidInput("k must be greater than zero".to_string()));
        }
        if self.keys.is_empty() {
            return Err(QaError::EmptyIndex);
        }
        if query.len() != self.dimensions {
            return Err(QaError::DimensionMismatch {
                expected: self.dimensions,
                found: query.len(),
            });
        }

        let mut scored = self
            .data
            .chunks_exact(self.dimensions)
            .map(|stored| squared_l2(stored, query))
            .enumerate()
            .collect::<Vec<_>>();

        // Ties resolve to the earlier entry so results are reproducible.
        let by_distance = |left: &(usize, f32), right: &(usize, f32)| {
            left.1.total_cmp(&right.1).then(left.0.cmp(&right.0))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance);

        Ok(scored
            .into_iter()
            .map(|(position, distance)| Neighbor {
                key: self.keys[position],
                distance,
            })
            .collect())
    }
}

pub fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = a - b;
            delta * delta
        })
        .sum()
}
