use anyhow::{bail, Result};
use semstore::config::SemstoreConfig;

/// Print the short-term interactions nearest to the one with `id`.
pub async fn similar(config: &SemstoreConfig, id: &str, k: usize) -> Result<()> {
    let mut store = super::open_loaded_store(config).await?;

    let short_term = store.snapshot().short_term();
    let Some(source) = short_term.iter().find(|i| i.id == id) else {
        store.close().await;
        bail!("no short-term interaction with id {id}");
    };

    // One extra hit, since the interaction itself is its own nearest neighbour.
    let hits = store.search(&source.embedding, k + 1)?;
    let hits: Vec<_> = hits
        .into_iter()
        .filter(|hit| short_term[hit.memory_index].id != id)
        .take(k)
        .collect();

    if hits.is_empty() {
        println!("No similar interactions found.");
        store.close().await;
        return Ok(());
    }

    println!("Found {} similar interaction(s)\n", hits.len());
    for (rank, hit) in hits.iter().enumerate() {
        let interaction = &short_term[hit.memory_index];
        println!(
            "  {}. {} (similarity: {:.4}, distance: {:.4})",
            rank + 1,
            interaction.id,
            hit.similarity,
            hit.distance,
        );
        println!("     prompt: {}", super::preview(&interaction.prompt, 120));
        println!("     output: {}", super::preview(&interaction.output, 120));
        println!();
    }

    store.close().await;
    Ok(())
}
