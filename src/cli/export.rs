use anyhow::Result;
use serde::Serialize;
use std::sync::{Arc, Mutex};

use sutta_agent::config::SuttaConfig;
use sutta_agent::memory::{MemoryStore, WisdomEntry};

#[derive(Debug, Serialize)]
struct ExportData {
    exported_at: String,
    insights: Vec<WisdomEntry>,
}

/// Export all stored insights as JSON to stdout.
pub fn export(config: &SuttaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = sutta_agent::db::open_database(&db_path)?;
    let store = MemoryStore::new(Arc::new(Mutex::new(conn)));

    let data = ExportData {
        exported_at: chrono::Utc::now().to_rfc3339(),
        insights: store.entries()?,
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    eprintln!("Exported {} insights.", data.insights.len());
    Ok(())
}
