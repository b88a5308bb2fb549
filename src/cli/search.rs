use anyhow::Result;

use super::preview;
use crate::config::StrataConfig;
use crate::engine::MemoryEngine;
use crate::memory::search::SearchRequest;
use crate::memory::types::Category;

/// Run a ranked search from the terminal.
pub async fn search(
    config: &StrataConfig,
    query: &str,
    top_k: Option<usize>,
    category: Option<Category>,
) -> Result<()> {
    let engine = MemoryEngine::open(config.clone())?;

    let request = SearchRequest {
        query: query.to_string(),
        top_k,
        category,
    };
    let response = engine.search(request).await?;

    if response.items.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", response.count);

    for (i, hit) in response.items.iter().enumerate() {
        println!(
            "  {}. [{}] {} (confidence: {:.2}, score: {:.4}, age: {:.1}d)",
            i + 1,
            hit.category,
            hit.id,
            hit.confidence,
            hit.score,
            hit.age_days,
        );
        println!("     {}", preview(&hit.text, 120));
        println!();
    }

    Ok(())
}
