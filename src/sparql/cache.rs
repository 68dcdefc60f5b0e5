//! Result cache in front of [`SparqlExecutor`].
//!
//! [`QueryCache`] is the entry table: TTL expiry plus a size bound, with every
//! operation taking the current instant explicitly. [`CachedSparql`] wraps an executor
//! with it. Any write through the wrapper (updates and transaction control) clears the
//! whole cache.
//!
//! There is no request coalescing: concurrent misses for the same query each hit the
//! store, and the last response to arrive wins the slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::JoinHandle;

use super::executor::{SparqlExecutor, UpdateAck};
use crate::error::Result;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

/// TTL- and size-bounded map from query key to parsed result.
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_size: usize,
    /// Bumped on every clear so in-flight misses started before a write cannot
    /// repopulate the cache with pre-write results.
    generation: u64,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_size,
            generation: 0,
        }
    }

    /// Live entry for `key`, if its age at `now` is below the TTL.
    pub fn get(&self, key: &str, now: Instant) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if now.saturating_duration_since(entry.inserted_at) < self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Store a result and run a cleanup pass if the cache is over its bound.
    pub fn insert(&mut self, key: String, value: Value, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
        if self.entries.len() > self.max_size {
            self.cleanup(now);
        }
    }

    /// [`insert`](Self::insert), unless the cache was cleared since `generation` was read.
    pub fn insert_if_current(
        &mut self,
        key: String,
        value: Value,
        now: Instant,
        generation: u64,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        self.insert(key, value, now);
        true
    }

    /// Evict expired entries, then the oldest entries until within `max_size`.
    ///
    /// Returns the number of evicted entries.
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);

        if self.entries.len() > self.max_size {
            let mut by_age: Vec<(Instant, String)> = self
                .entries
                .iter()
                .map(|(key, entry)| (entry.inserted_at, key.clone()))
                .collect();
            by_age.sort();
            let excess = self.entries.len() - self.max_size;
            for (_, key) in by_age.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }

        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "query cache cleanup");
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// A [`SparqlExecutor`] behind a shared [`QueryCache`].
pub struct CachedSparql {
    executor: SparqlExecutor,
    cache: Arc<Mutex<QueryCache>>,
    cleanup_task: Option<JoinHandle<()>>,
}

impl CachedSparql {
    pub fn new(executor: SparqlExecutor, ttl: Duration, max_size: usize) -> Self {
        Self {
            executor,
            cache: Arc::new(Mutex::new(QueryCache::new(ttl, max_size))),
            cleanup_task: None,
        }
    }

    /// Answer from the cache when a live entry exists, otherwise ask the store and
    /// remember the result.
    pub async fn query(&self, query: &str) -> Result<Value> {
        let key = self.cache_key(query);
        let generation = {
            let cache = self.lock();
            if let Some(value) = cache.get(&key, Instant::now()) {
                tracing::debug!(query_len = query.len(), "query cache hit");
                return Ok(value);
            }
            cache.generation()
        };

        tracing::debug!(query_len = query.len(), "query cache miss");
        let value = self.executor.execute_query(query).await?;
        self.lock()
            .insert_if_current(key, value.clone(), Instant::now(), generation);
        Ok(value)
    }

    /// Run an update and clear the cache, whether or not the update succeeded.
    pub async fn update(&self, update: &str) -> Result<UpdateAck> {
        let outcome = self.executor.execute_update(update).await;
        self.lock().clear();
        outcome
    }

    pub async fn begin_transaction(&mut self) -> Result<String> {
        let outcome = self.executor.begin_transaction().await;
        self.lock().clear();
        outcome
    }

    pub async fn commit_transaction(&mut self) -> Result<()> {
        let outcome = self.executor.commit_transaction().await;
        self.lock().clear();
        outcome
    }

    /// Rollback restores the pre-transaction graph, so cached results taken inside
    /// the transaction must go.
    pub async fn rollback_transaction(&mut self) -> Result<()> {
        let outcome = self.executor.rollback_transaction().await;
        self.lock().clear();
        outcome
    }

    /// Run one eviction pass now. Returns the number of evicted entries.
    pub fn cleanup_cache(&self) -> usize {
        self.lock().cleanup(Instant::now())
    }

    /// Spawn a background task running [`cleanup_cache`](Self::cleanup_cache) every
    /// `interval`. Replaces any task started earlier. A zero interval only stops the
    /// running task. Must be called inside a tokio runtime.
    pub fn start_cleanup_task(&mut self, interval: Duration) {
        self.stop_cleanup_task();
        if interval.is_zero() {
            tracing::debug!("zero cleanup interval; no cleanup task started");
            return;
        }
        let cache = Arc::clone(&self.cache);
        self.cleanup_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .cleanup(Instant::now());
            }
        }));
        tracing::debug!(interval_ms = interval.as_millis() as u64, "cache cleanup task started");
    }

    fn stop_cleanup_task(&mut self) {
        if let Some(task) = self.cleanup_task.take() {
            task.abort();
        }
    }

    /// Stop the cleanup task and drop every cached result.
    pub fn close(&mut self) {
        self.stop_cleanup_task();
        self.lock().clear();
    }

    pub fn clear_cache(&self) {
        self.lock().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.lock().len()
    }

    pub fn has_cleanup_task(&self) -> bool {
        self.cleanup_task.is_some()
    }

    pub fn executor(&self) -> &SparqlExecutor {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut SparqlExecutor {
        &mut self.executor
    }

    /// Scoped to the query endpoint so one cache never mixes results of two stores.
    fn cache_key(&self, query: &str) -> String {
        format!("{}\n{}", self.executor.endpoint().query(), query)
    }

    fn lock(&self) -> MutexGuard<'_, QueryCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CachedSparql {
    fn drop(&mut self) {
        self.stop_cleanup_task();
    }
}
