//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (short- or long-term), [`Interaction`] (one stored
//! prompt/response pair with its embedding), and [`MemorySnapshot`] (the parallel
//! collections persisted by a save).

use serde::{Deserialize, Serialize};

/// Which history list an interaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryType {
    /// Recent interactions; these are the ones fed to the similarity index.
    ShortTerm,
    /// Consolidated interactions kept for reference.
    LongTerm,
}

impl MemoryType {
    /// Literal stored in the triple store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "short-term",
            Self::LongTerm => "long-term",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short-term" => Ok(Self::ShortTerm),
            "long-term" => Ok(Self::LongTerm),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// A stored prompt/response interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    /// UUID v7 for interactions created here; imported ids are kept verbatim.
    pub id: String,
    pub prompt: String,
    pub output: String,
    pub embedding: Vec<f32>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub access_count: u32,
    pub concepts: Vec<String>,
    pub decay_factor: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Interaction {
    /// New interaction stamped with the current time and a fresh id.
    pub fn new(
        prompt: impl Into<String>,
        output: impl Into<String>,
        embedding: Vec<f32>,
        concepts: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            prompt: prompt.into(),
            output: output.into(),
            embedding,
            timestamp: chrono::Utc::now().timestamp_millis(),
            access_count: 0,
            concepts,
            decay_factor: 1.0,
            metadata: serde_json::Map::new(),
        }
    }
}

/// Everything one save writes: short-term memory as parallel columns sharing one
/// memory index, plus the long-term list.
///
/// The columns are private and only grow together, so their lengths are always
/// equal. Embeddings, timestamps, access counts and concepts in the columns are
/// authoritative over the copies inside the stored interactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    short_term: Vec<Interaction>,
    embeddings: Vec<Vec<f32>>,
    timestamps: Vec<i64>,
    access_counts: Vec<u32>,
    concepts_list: Vec<Vec<String>>,
    long_term: Vec<Interaction>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(short_term: Vec<Interaction>, long_term: Vec<Interaction>) -> Self {
        let mut snapshot = Self {
            long_term,
            ..Self::default()
        };
        for interaction in short_term {
            snapshot.push_short_term(interaction);
        }
        snapshot
    }

    /// Append to short-term memory. Returns the new memory index.
    pub fn push_short_term(&mut self, interaction: Interaction) -> usize {
        self.embeddings.push(interaction.embedding.clone());
        self.timestamps.push(interaction.timestamp);
        self.access_counts.push(interaction.access_count);
        self.concepts_list.push(interaction.concepts.clone());
        self.short_term.push(interaction);
        self.short_term.len() - 1
    }

    pub fn push_long_term(&mut self, interaction: Interaction) {
        self.long_term.push(interaction);
    }

    /// Count one retrieval of the interaction at `memory_index`.
    pub fn record_access(&mut self, memory_index: usize) -> bool {
        match self.access_counts.get_mut(memory_index) {
            Some(count) => {
                *count = count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Short-term interaction at `memory_index`, with the column values applied.
    pub fn interaction(&self, memory_index: usize) -> Option<Interaction> {
        let base = self.short_term.get(memory_index)?;
        Some(Interaction {
            embedding: self.embeddings[memory_index].clone(),
            timestamp: self.timestamps[memory_index],
            access_count: self.access_counts[memory_index],
            concepts: self.concepts_list[memory_index].clone(),
            ..base.clone()
        })
    }

    /// Short-term interactions in memory-index order, with the column values applied.
    pub fn short_term(&self) -> Vec<Interaction> {
        (0..self.len()).filter_map(|i| self.interaction(i)).collect()
    }

    pub fn long_term(&self) -> &[Interaction] {
        &self.long_term
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn access_counts(&self) -> &[u32] {
        &self.access_counts
    }

    pub fn concepts_list(&self) -> &[Vec<String>] {
        &self.concepts_list
    }

    /// Number of short-term interactions.
    pub fn len(&self) -> usize {
        self.short_term.len()
    }

    /// No short-term interactions; the long-term list may still hold records.
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        let n = self.short_term.len();
        self.embeddings.len() == n
            && self.timestamps.len() == n
            && self.access_counts.len() == n
            && self.concepts_list.len() == n
    }
}
