use anyhow::Result;

use crate::config::StrataConfig;
use crate::engine::MemoryEngine;
use crate::memory::store::NewFact;

/// Store one fact from the command line through the dedup-gated write path.
pub async fn learn(config: &StrataConfig, fact: NewFact) -> Result<()> {
    let engine = MemoryEngine::open(config.clone())?;
    let result = engine.learn_fact(fact).await?;

    if result.deduped {
        println!(
            "Merged into existing fact {} [{}] (similarity {:.3}, confidence now {:.2})",
            result.id,
            result.category,
            result.similarity.unwrap_or(1.0),
            result.confidence
        );
    } else {
        println!(
            "Stored fact {} [{}] (confidence {:.2})",
            result.id, result.category, result.confidence
        );
    }
    Ok(())
}
