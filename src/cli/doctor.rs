//! CLI `doctor` command: check the SPARQL endpoints and print a health report.

use anyhow::Result;
use semstore::config::SemstoreConfig;
use semstore::memory::SparqlMemoryStore;

/// Check endpoint reachability and print a health report.
pub async fn doctor(config: &SemstoreConfig) -> Result<()> {
    println!("Semstore Health Report");
    println!("======================");
    println!();
    println!("Query endpoint:    {}", config.sparql.query_endpoint);
    println!("Update endpoint:   {}", config.sparql.update_endpoint);
    println!("Graph:             {}", config.sparql.graph_name);
    println!("Index dimension:   {}", config.index.dimension);
    println!();

    let mut store = SparqlMemoryStore::connect(config).await?;

    if !store.verify().await {
        println!("Reachability:      FAILED");
        println!();
        println!("Recovery steps:");
        println!("  1. Check that the triple store is running and the URLs above are correct");
        println!("  2. Check the credentials (SEMSTORE_USER / SEMSTORE_PASSWORD)");
        store.close().await;
        return Ok(());
    }
    println!("Reachability:      OK");

    match store.load_history().await {
        Ok((short_term, long_term)) => {
            println!();
            println!("Record counts:");
            println!("  Short-term:      {}", short_term.len());
            println!("  Long-term:       {}", long_term.len());
            println!("  Indexed:         {}", store.index().index_size());
        }
        Err(e) => {
            println!("History load:      FAILED ({e})");
        }
    }

    store.close().await;
    Ok(())
}
