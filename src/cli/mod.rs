pub mod doctor;
pub mod export;
pub mod import;
pub mod index;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use semstore::config::SemstoreConfig;
use semstore::memory::{Interaction, SparqlMemoryStore};
use serde::{Deserialize, Serialize};

/// Export/import format: both history lists as stored.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDump {
    pub graph: String,
    pub short_term: Vec<Interaction>,
    #[serde(default)]
    pub long_term: Vec<Interaction>,
}

/// Build a store from config and load its history.
pub async fn open_loaded_store(config: &SemstoreConfig) -> Result<SparqlMemoryStore> {
    let mut store = SparqlMemoryStore::connect(config).await?;
    store
        .load_history()
        .await
        .with_context(|| format!("failed to load history from {}", config.sparql.query_endpoint))?;
    Ok(store)
}

/// Truncate text to `max_chars` characters for terminal previews.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
