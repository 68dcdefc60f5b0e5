//! History load/save against the triple store, with the similarity index kept in step.
//!
//! [`SparqlMemoryStore`] is the boundary the rest of an application talks to. Every
//! save replaces the whole record set of the primary graph; when the caller has not
//! opened a transaction, the save opens and commits its own so a failed write is
//! rolled back.

use serde::Serialize;

use super::rdf;
use super::types::{Interaction, MemorySnapshot, MemoryType};
use crate::config::SemstoreConfig;
use crate::error::Result;
use crate::index::{adjust_embedding_length, distance_to_similarity, RebuildStats, VectorIndex};
use crate::sparql::{CachedSparql, SparqlExecutor};

/// One nearest neighbour of a similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityHit {
    /// Position in the short-term list of the current snapshot.
    pub memory_index: usize,
    /// Squared L2 distance to the query.
    pub distance: f32,
    /// `1 / (1 + distance)`.
    pub similarity: f32,
}

pub struct SparqlMemoryStore {
    sparql: CachedSparql,
    index: VectorIndex,
    snapshot: MemorySnapshot,
    adjust_mismatched: bool,
}

impl SparqlMemoryStore {
    pub fn new(sparql: CachedSparql, dimension: usize) -> Result<Self> {
        Ok(Self {
            sparql,
            index: VectorIndex::new(dimension)?,
            snapshot: MemorySnapshot::new(),
            adjust_mismatched: true,
        })
    }

    /// Build the executor, cache and index from configuration and start the periodic
    /// cache cleanup if one is configured. Does not contact the store.
    pub async fn connect(config: &SemstoreConfig) -> Result<Self> {
        let executor = SparqlExecutor::from_config(&config.sparql)?;
        let mut sparql = CachedSparql::new(executor, config.cache.ttl(), config.cache.max_size);
        if let Some(interval) = config.cache.cleanup_interval() {
            sparql.start_cleanup_task(interval);
        }

        tracing::info!(
            query_endpoint = %config.sparql.query_endpoint,
            update_endpoint = %config.sparql.update_endpoint,
            graph = %config.sparql.graph_name,
            dimension = config.index.dimension,
            "memory store configured"
        );

        Ok(Self::new(sparql, config.index.dimension)?
            .with_embedding_adjustment(config.index.adjust_mismatched))
    }

    /// Whether embeddings of another length are truncated/zero-padded when indexed.
    /// When off they are skipped by the index instead.
    pub fn with_embedding_adjustment(mut self, enabled: bool) -> Self {
        self.adjust_mismatched = enabled;
        self
    }

    // ── History ──────────────────────────────────────────────────────────────

    /// Read every stored interaction, adopt them as the current snapshot and rebuild
    /// the index from the short-term embeddings.
    pub async fn load_history(&mut self) -> Result<(Vec<Interaction>, Vec<Interaction>)> {
        let graph = self.graph_name().to_string();
        let results = self.sparql.query(&rdf::select_graph_query(&graph)).await?;
        let history = rdf::decode_history(&results)?;

        tracing::info!(
            graph = %graph,
            short_term = history.short_term.len(),
            long_term = history.long_term.len(),
            skipped = history.skipped,
            "loaded memory history"
        );

        self.snapshot =
            MemorySnapshot::from_history(history.short_term.clone(), history.long_term.clone());
        self.rebuild_index();
        Ok((history.short_term, history.long_term))
    }

    /// Persist `snapshot` as the full record set of the graph, then adopt it as the
    /// current snapshot.
    pub async fn save_memory_to_history(&mut self, snapshot: &MemorySnapshot) -> Result<()> {
        let short_term = snapshot.short_term();
        let records = short_term
            .iter()
            .map(|i| (i, MemoryType::ShortTerm))
            .chain(snapshot.long_term().iter().map(|i| (i, MemoryType::LongTerm)));
        let update = rdf::replace_graph_update(self.graph_name(), records)?;

        let owns_transaction = !self.sparql.executor().is_in_transaction();
        if owns_transaction {
            self.sparql.begin_transaction().await?;
        }

        if let Err(e) = self.sparql.update(&update).await {
            if owns_transaction {
                if let Err(rollback) = self.sparql.rollback_transaction().await {
                    tracing::warn!(error = %rollback, "rollback after failed save also failed");
                }
            }
            return Err(e);
        }

        if owns_transaction {
            self.sparql.commit_transaction().await?;
        }

        tracing::info!(
            graph = %self.graph_name(),
            short_term = snapshot.len(),
            long_term = snapshot.long_term().len(),
            "saved memory history"
        );

        self.snapshot = snapshot.clone();
        self.rebuild_index();
        Ok(())
    }

    /// Persist the current snapshot.
    pub async fn save(&mut self) -> Result<()> {
        let snapshot = self.snapshot.clone();
        self.save_memory_to_history(&snapshot).await
    }

    /// Append to short-term memory and index the embedding. Not persisted until the
    /// next save. Returns the memory index.
    pub fn add_interaction(&mut self, interaction: Interaction) -> usize {
        let embedding = self.fit_embedding(&interaction.embedding);
        let memory_index = self.snapshot.push_short_term(interaction);
        if self.index.add_embedding(&embedding, memory_index).is_none() {
            tracing::debug!(memory_index, "interaction stored without an indexed embedding");
        }
        memory_index
    }

    // ── Search ───────────────────────────────────────────────────────────────

    /// Nearest short-term interactions to `query`, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityHit>> {
        let query = self.fit_embedding(query);
        let hits = self.index.search_index(&query, k)?;
        Ok(hits
            .labels
            .iter()
            .zip(&hits.distances)
            .filter_map(|(&ordinal, &distance)| {
                Some(SimilarityHit {
                    memory_index: self.index.memory_index(ordinal)?,
                    distance,
                    similarity: distance_to_similarity(distance),
                })
            })
            .collect())
    }

    fn rebuild_index(&mut self) -> RebuildStats {
        let embeddings: Vec<Vec<f32>> = self
            .snapshot
            .embeddings()
            .iter()
            .map(|e| self.fit_embedding(e))
            .collect();
        self.index.rebuild_index(&embeddings)
    }

    fn fit_embedding(&self, embedding: &[f32]) -> Vec<f32> {
        let dimension = self.index.dimension();
        if self.adjust_mismatched && !embedding.is_empty() && embedding.len() != dimension {
            tracing::warn!(
                from = embedding.len(),
                to = dimension,
                "adjusting embedding length"
            );
            adjust_embedding_length(embedding, dimension)
        } else {
            embedding.to_vec()
        }
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    pub async fn begin_transaction(&mut self) -> Result<String> {
        self.sparql.begin_transaction().await
    }

    pub async fn commit_transaction(&mut self) -> Result<()> {
        self.sparql.commit_transaction().await
    }

    /// Restore the graph to its state at `begin`. The in-memory snapshot is left as
    /// is; call [`load_history`](Self::load_history) to resynchronize it.
    pub async fn rollback_transaction(&mut self) -> Result<()> {
        self.sparql.rollback_transaction().await
    }

    pub fn is_in_transaction(&self) -> bool {
        self.sparql.executor().is_in_transaction()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// `true` when the query endpoint answers.
    pub async fn verify(&self) -> bool {
        match self.sparql.executor().verify().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "SPARQL endpoint verification failed");
                false
            }
        }
    }

    /// Roll back any open transaction, stop the cache and release the index.
    pub async fn close(&mut self) {
        self.sparql.executor_mut().dispose().await;
        self.sparql.close();
        self.index.dispose();
        tracing::info!(graph = %self.graph_name(), "memory store closed");
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn graph_name(&self) -> &str {
        self.sparql.executor().graph_name()
    }

    pub fn snapshot(&self) -> &MemorySnapshot {
        &self.snapshot
    }

    pub fn snapshot_mut(&mut self) -> &mut MemorySnapshot {
        &mut self.snapshot
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut VectorIndex {
        &mut self.index
    }

    pub fn sparql(&self) -> &CachedSparql {
        &self.sparql
    }

    pub fn sparql_mut(&mut self) -> &mut CachedSparql {
        &mut self.sparql
    }
}
