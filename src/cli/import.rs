use anyhow::{Context, Result};
use semstore::config::SemstoreConfig;
use semstore::memory::{MemorySnapshot, SparqlMemoryStore};
use std::path::Path;

use super::HistoryDump;

/// Replace the stored history with the contents of an export file.
///
/// The whole write runs in one transaction; if it fails the graph is restored.
pub async fn import(config: &SemstoreConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;

    let data: HistoryDump = serde_json::from_str(&json).context("failed to parse import JSON")?;

    if data.graph != config.sparql.graph_name {
        eprintln!(
            "Note: export came from graph {}, importing into {}",
            data.graph, config.sparql.graph_name
        );
    }

    let mut store = SparqlMemoryStore::connect(config).await?;
    let snapshot = MemorySnapshot::from_history(data.short_term, data.long_term);

    println!(
        "Importing {} short-term and {} long-term interactions...",
        snapshot.len(),
        snapshot.long_term().len()
    );

    store.begin_transaction().await?;
    if let Err(e) = store.save_memory_to_history(&snapshot).await {
        store.rollback_transaction().await?;
        store.close().await;
        return Err(e).context("import failed; graph restored");
    }
    store.commit_transaction().await?;

    let mapping = store.index().mapping_stats();
    println!("Import complete:");
    println!("  Interactions written: {}", snapshot.len() + snapshot.long_term().len());
    println!("  Embeddings indexed:   {}", mapping.valid_mappings);

    store.close().await;
    Ok(())
}
