use anyhow::Result;
use semstore::config::SemstoreConfig;

use super::HistoryDump;

/// Export the stored history as JSON to stdout.
pub async fn export(config: &SemstoreConfig) -> Result<()> {
    let mut store = super::open_loaded_store(config).await?;

    let data = HistoryDump {
        graph: store.graph_name().to_string(),
        short_term: store.snapshot().short_term(),
        long_term: store.snapshot().long_term().to_vec(),
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    eprintln!(
        "Exported {} short-term and {} long-term interactions.",
        data.short_term.len(),
        data.long_term.len()
    );

    store.close().await;
    Ok(())
}
