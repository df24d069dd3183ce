use crate::error::RagError;
use crate::models::Chunk;

#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    entries: Vec<IndexedChunk>,
}

impl FlatIndex {
    pub fn build(dimensions: usize, entries: Vec<IndexedChunk>) -> Result<Self, RagError> {
        if let Some(entry) = entries
            .iter()
            .find(|entry| entry.embedding.len() != dimensions)
        {
            return Err(RagError::DimensionMismatch {
                expected: dimensions,
                actual: entry.embedding.len(),
            });
        }

        Ok(Self {
            dimensions,
            entries,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, position: usize) -> Option<&IndexedChunk> {
        self.entries.get(position)
    }

    /// Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, RagError> {
        if self.entries.is_empty() {
            return Err(RagError::NotIndexed);
        }
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| Neighbor {
                position,
                distance: squared_euclidean(query, &entry.embedding),
            })
            .collect();

        neighbors.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

pub fn squared_euclidean(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| {
            let delta = a - b;
            delta * delta
        })
        .sum()
}
