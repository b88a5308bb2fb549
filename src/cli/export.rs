use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::StrataConfig;
use crate::memory::now_ts;
use crate::memory::store::list_facts;
use crate::memory::types::Fact;

pub(crate) const EXPORT_VERSION: u32 = 1;

/// Export format, also read back by `import`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ExportData {
    pub version: u32,
    pub exported_at: i64,
    pub facts: Vec<Fact>,
}

/// Export every fact, soft-deleted ones included, as JSON to stdout.
pub fn export(config: &StrataConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let data = ExportData {
        version: EXPORT_VERSION,
        exported_at: now_ts(),
        facts: list_facts(&conn, true)?,
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    let deleted = data.facts.iter().filter(|f| f.deleted).count();
    eprintln!(
        "Exported {} facts ({} soft-deleted).",
        data.facts.len(),
        deleted
    );

    Ok(())
}
