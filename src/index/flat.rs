//! Exhaustive nearest-neighbour index over squared L2 distance.

/// Vectors stored back to back in one buffer; the ordinal of a vector is its
/// insertion position.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// `dimension` must be non-zero.
    pub fn new(dimension: usize) -> Self {
        debug_assert!(dimension > 0, "index dimension must be non-zero");
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Rebuild from a flat buffer. `None` if the buffer is not a whole number of vectors.
    pub fn from_raw(dimension: usize, data: Vec<f32>) -> Option<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return None;
        }
        Some(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return the new element count. Vectors of the wrong
    /// length are not stored, which leaves the count unchanged.
    pub fn add(&mut self, vector: &[f32]) -> usize {
        if vector.len() == self.dimension {
            self.data.extend_from_slice(vector);
        }
        self.len()
    }

    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        let start = ordinal.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    pub fn as_raw(&self) -> &[f32] {
        &self.data
    }

    /// The `min(k, len)` closest vectors as `(distance, ordinal)`, nearest first.
    /// Ties go to the lower ordinal; NaN distances sort last.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, usize)> {
        let k = k.min(self.len());
        if k == 0 || query.len() != self.dimension {
            return Vec::new();
        }

        let mut scored: Vec<(f32, usize)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(ordinal, v)| (squared_l2(query, v), ordinal))
            .collect();

        let order = |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(order);
        scored
    }
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
