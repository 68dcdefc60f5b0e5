//! In-process similarity index kept in step with persisted interactions.
//!
//! [`VectorIndex`] owns a [`FlatL2Index`] plus the two mapping arrays that tie index
//! ordinals to memory indices (positions in the short-term memory list). An embedding
//! is in the index exactly when its memory index maps to an ordinal.
//!
//! Data-quality problems never abort: invalid vectors are skipped and counted, and a
//! blob that cannot be restored leaves a fresh empty index behind.

pub mod flat;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use flat::FlatL2Index;

use crate::error::{Result, StoreError};

const BLOB_MAGIC: [u8; 4] = *b"SMVX";
const BLOB_VERSION: u16 = 1;

/// Nearest neighbours as parallel arrays, nearest first. `labels` are index ordinals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchHits {
    pub distances: Vec<f32>,
    pub labels: Vec<usize>,
}

impl SearchHits {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Outcome of [`VectorIndex::rebuild_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildStats {
    pub added_count: usize,
    pub skipped_count: usize,
    /// Number of input vectors, valid or not.
    pub total_embeddings: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    /// Length of the ordinal → memory index array.
    pub index_size: usize,
    /// One past the highest memory index that maps to an ordinal.
    pub memory_size: usize,
    /// Memory indices whose ordinal maps back to them.
    pub valid_mappings: usize,
    /// Memory indices pointing at an ordinal that does not map back.
    pub invalid_mappings: usize,
}

/// Result of [`VectorIndex::deserialize_index`]. Restore failures are not errors:
/// the index is reset to empty and the cause is reported here.
#[derive(Debug)]
pub enum RestoreOutcome {
    Restored { entries: usize },
    FellBackToEmpty { cause: StoreError },
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, Self::Restored { .. })
    }
}

#[derive(Serialize, Deserialize)]
struct IndexBlob {
    magic: [u8; 4],
    version: u16,
    dimension: u64,
    data: Vec<f32>,
    ordinal_to_memory: Vec<u64>,
    /// `(memory index, ordinal)` pairs in memory index order.
    memory_to_ordinal: Vec<(u64, u64)>,
}

/// Index and mappings, replaced as a unit on rebuild and restore.
#[derive(Debug, Clone)]
struct IndexState {
    index: FlatL2Index,
    ordinal_to_memory: Vec<usize>,
    /// Sparse, so an arbitrary memory index never forces a large allocation.
    memory_to_ordinal: BTreeMap<usize, usize>,
}

impl IndexState {
    fn empty(dimension: usize) -> Self {
        Self {
            index: FlatL2Index::new(dimension),
            ordinal_to_memory: Vec::new(),
            memory_to_ordinal: BTreeMap::new(),
        }
    }

    /// Append a vector that already passed [`VectorIndex::is_valid_embedding`].
    fn push(&mut self, embedding: &[f32], memory_index: usize) -> Option<usize> {
        let before = self.index.len();
        let after = self.index.add(embedding);
        if after != before + 1 {
            tracing::warn!(before, after, memory_index, "vector index did not grow on add");
            return None;
        }

        let ordinal = before;
        self.ordinal_to_memory.push(memory_index);
        self.memory_to_ordinal.insert(memory_index, ordinal);
        Some(ordinal)
    }
}

/// Flat L2 similarity index with ordinal ↔ memory index mappings. Dimension is fixed
/// at construction.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    state: IndexState,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(StoreError::Config("index dimension must be non-zero".into()));
        }
        Ok(Self {
            dimension,
            state: IndexState::empty(dimension),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn index_size(&self) -> usize {
        self.state.index.len()
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Strict check: exactly `dimension` values, none NaN.
    pub fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(StoreError::Validation(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        if let Some(pos) = embedding.iter().position(|x| x.is_nan()) {
            return Err(StoreError::Validation(format!("NaN at position {pos}")));
        }
        Ok(())
    }

    /// Permissive pre-filter: right length and at least one non-zero finite value.
    /// Rejects all-zero placeholder vectors.
    pub fn is_valid_embedding(&self, embedding: &[f32]) -> bool {
        embedding.len() == self.dimension
            && embedding.iter().any(|x| x.is_finite() && *x != 0.0)
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Add an embedding for `memory_index` and return its ordinal. Invalid vectors
    /// are skipped and yield `None` without touching the index or the mappings.
    pub fn add_embedding(&mut self, embedding: &[f32], memory_index: usize) -> Option<usize> {
        if !self.is_valid_embedding(embedding) {
            tracing::debug!(
                memory_index,
                len = embedding.len(),
                "skipping invalid embedding"
            );
            return None;
        }
        self.state.push(embedding, memory_index)
    }

    /// Replace the index with one built from `embeddings`, where the memory index of
    /// each vector is its position in the slice. Invalid vectors are counted, never fatal.
    pub fn rebuild_index<V: AsRef<[f32]>>(&mut self, embeddings: &[V]) -> RebuildStats {
        let mut next = IndexState::empty(self.dimension);
        let mut added_count = 0;
        let mut skipped_count = 0;

        for (memory_index, embedding) in embeddings.iter().enumerate() {
            let embedding = embedding.as_ref();
            if self.is_valid_embedding(embedding) && next.push(embedding, memory_index).is_some() {
                added_count += 1;
            } else {
                skipped_count += 1;
            }
        }

        self.state = next;

        let stats = RebuildStats {
            added_count,
            skipped_count,
            total_embeddings: embeddings.len(),
        };
        if skipped_count > 0 {
            tracing::warn!(added_count, skipped_count, "rebuilt vector index with invalid embeddings skipped");
        } else {
            tracing::debug!(added_count, "rebuilt vector index");
        }
        stats
    }

    // ── Search ───────────────────────────────────────────────────────────────

    /// The `min(k, index_size)` nearest neighbours of `query` by squared L2 distance.
    pub fn search_index(&self, query: &[f32], k: usize) -> Result<SearchHits> {
        if query.len() != self.dimension {
            return Err(StoreError::Validation(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimension
            )));
        }

        let (distances, labels): (Vec<f32>, Vec<usize>) =
            self.state.index.search(query, k).into_iter().unzip();
        Ok(SearchHits { distances, labels })
    }

    /// Memory index stored at `ordinal`.
    pub fn memory_index(&self, ordinal: usize) -> Option<usize> {
        self.state.ordinal_to_memory.get(ordinal).copied()
    }

    /// Ordinal holding the embedding of `memory_index`.
    pub fn ordinal(&self, memory_index: usize) -> Option<usize> {
        self.state.memory_to_ordinal.get(&memory_index).copied()
    }

    pub fn mapping_stats(&self) -> MappingStats {
        let mut valid_mappings = 0;
        let mut invalid_mappings = 0;
        for (memory_index, ordinal) in &self.state.memory_to_ordinal {
            if self.state.ordinal_to_memory.get(*ordinal) == Some(memory_index) {
                valid_mappings += 1;
            } else {
                invalid_mappings += 1;
            }
        }

        MappingStats {
            index_size: self.state.ordinal_to_memory.len(),
            memory_size: self
                .state
                .memory_to_ordinal
                .keys()
                .next_back()
                .map_or(0, |m| m.saturating_add(1)),
            valid_mappings,
            invalid_mappings,
        }
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    /// Encode the index and its mappings as an opaque blob.
    pub fn serialize_index(&self) -> Result<Vec<u8>> {
        let blob = IndexBlob {
            magic: BLOB_MAGIC,
            version: BLOB_VERSION,
            dimension: self.dimension as u64,
            data: self.state.index.as_raw().to_vec(),
            ordinal_to_memory: self.state.ordinal_to_memory.iter().map(|&m| m as u64).collect(),
            memory_to_ordinal: self
                .state
                .memory_to_ordinal
                .iter()
                .map(|(&m, &o)| (m as u64, o as u64))
                .collect(),
        };
        Ok(bincode::serialize(&blob)?)
    }

    /// Restore from a blob produced by [`serialize_index`](Self::serialize_index).
    ///
    /// A corrupt blob or one built for another dimension resets this index to empty
    /// instead of failing; check the outcome or [`index_size`](Self::index_size).
    pub fn deserialize_index(&mut self, bytes: &[u8]) -> RestoreOutcome {
        match self.decode_blob(bytes) {
            Ok(state) => {
                let entries = state.index.len();
                self.state = state;
                tracing::debug!(entries, "vector index restored");
                RestoreOutcome::Restored { entries }
            }
            Err(cause) => {
                tracing::warn!(error = %cause, "could not restore vector index; starting empty");
                self.state = IndexState::empty(self.dimension);
                RestoreOutcome::FellBackToEmpty { cause }
            }
        }
    }

    fn decode_blob(&self, bytes: &[u8]) -> Result<IndexState> {
        let blob: IndexBlob = bincode::deserialize(bytes)?;

        if blob.magic != BLOB_MAGIC {
            return Err(StoreError::Serialization("not a vector index blob".into()));
        }
        if blob.version != BLOB_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported blob version {}",
                blob.version
            )));
        }
        if blob.dimension != self.dimension as u64 {
            return Err(StoreError::Serialization(format!(
                "blob dimension {} does not match index dimension {}",
                blob.dimension, self.dimension
            )));
        }

        let index = FlatL2Index::from_raw(self.dimension, blob.data)
            .ok_or_else(|| StoreError::Serialization("vector data is truncated".into()))?;
        let len = index.len();
        if blob.ordinal_to_memory.len() != len {
            return Err(StoreError::Serialization(format!(
                "{} vectors but {} ordinal mappings",
                len,
                blob.ordinal_to_memory.len()
            )));
        }

        let ordinal_to_memory: Vec<usize> = blob
            .ordinal_to_memory
            .into_iter()
            .map(|m| usize::try_from(m).ok())
            .collect::<Option<_>>()
            .ok_or_else(|| StoreError::Serialization("memory index out of range".into()))?;
        let memory_to_ordinal: BTreeMap<usize, usize> = blob
            .memory_to_ordinal
            .into_iter()
            .map(|(m, o)| {
                let m = usize::try_from(m)
                    .map_err(|_| StoreError::Serialization("memory index out of range".into()))?;
                match usize::try_from(o) {
                    Ok(o) if o < len => Ok((m, o)),
                    _ => Err(StoreError::Serialization(format!(
                        "ordinal {o} beyond {len} vectors"
                    ))),
                }
            })
            .collect::<Result<_>>()?;
        if ordinal_to_memory
            .iter()
            .any(|m| !memory_to_ordinal.contains_key(m))
        {
            return Err(StoreError::Serialization(
                "ordinal maps to a memory index with no reverse mapping".into(),
            ));
        }

        Ok(IndexState {
            index,
            ordinal_to_memory,
            memory_to_ordinal,
        })
    }

    /// Release the vectors and mappings. The index stays usable and empty.
    pub fn dispose(&mut self) {
        self.state = IndexState::empty(self.dimension);
    }
}

/// Map a squared L2 distance to a similarity in `(0, 1]`; `0` maps to `1` and
/// larger distances map to smaller similarities.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Truncate or zero-pad `embedding` to `target_len`.
///
/// Lossy. Meant for loading vectors produced by a model of another dimension; the
/// result only approximates what the index's own model would have produced.
pub fn adjust_embedding_length(embedding: &[f32], target_len: usize) -> Vec<f32> {
    let mut adjusted = embedding[..embedding.len().min(target_len)].to_vec();
    adjusted.resize(target_len, 0.0);
    adjusted
}
