use anyhow::Result;
use semstore::config::SemstoreConfig;

/// Display history and index statistics in the terminal.
pub async fn stats(config: &SemstoreConfig) -> Result<()> {
    let mut store = super::open_loaded_store(config).await?;

    let snapshot = store.snapshot();
    let mapping = store.index().mapping_stats();

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Graph:               {}", store.graph_name());
    println!("  Short-term:          {}", snapshot.len());
    println!("  Long-term:           {}", snapshot.long_term().len());
    println!();

    println!("Index:");
    println!("  Dimension:           {}", store.index().dimension());
    println!("  Vectors:             {}", store.index().index_size());
    println!("  Valid mappings:      {}", mapping.valid_mappings);
    println!("  Invalid mappings:    {}", mapping.invalid_mappings);
    println!(
        "  Not indexed:         {}",
        snapshot.len().saturating_sub(mapping.valid_mappings)
    );

    if let (Some(oldest), Some(newest)) = (
        snapshot.timestamps().iter().min(),
        snapshot.timestamps().iter().max(),
    ) {
        println!();
        println!("Oldest short-term:     {}", format_millis(*oldest));
        println!("Newest short-term:     {}", format_millis(*newest));
    }

    store.close().await;
    Ok(())
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}
