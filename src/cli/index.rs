//! CLI `index` command: build the similarity index and write it to disk.

use anyhow::{Context, Result};
use semstore::config::SemstoreConfig;
use std::path::Path;

/// Load history, build the index from it, and write the serialized blob to `out`.
/// Uses a temp file and rename so a crash never leaves a half-written index.
pub async fn write_index(config: &SemstoreConfig, out: &Path) -> Result<()> {
    let mut store = super::open_loaded_store(config).await?;

    let bytes = store.index().serialize_index()?;
    let stats = store.index().mapping_stats();

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let tmp_path = out.with_extension("tmp");
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, out)
        .await
        .context("failed to rename temp file")?;

    println!(
        "Wrote index with {} vectors ({} of {} short-term interactions) to {} ({} bytes)",
        store.index().index_size(),
        stats.valid_mappings,
        store.snapshot().len(),
        out.display(),
        bytes.len()
    );

    store.close().await;
    Ok(())
}
