//! CLI `reset` command: delete all stored insights after user confirmation.

use anyhow::{bail, Result};
use std::io::Write;
use std::sync::{Arc, Mutex};

use sutta_agent::config::SuttaConfig;
use sutta_agent::memory::MemoryStore;

/// Delete all insights after user confirmation. Indexed passages are kept.
pub fn reset(config: &SuttaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("WARNING: This will permanently delete ALL stored insights.");
    println!("Indexed passages are kept. Database: {}", db_path.display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let conn = sutta_agent::db::open_database(&db_path)?;
    let removed = MemoryStore::new(Arc::new(Mutex::new(conn))).clear()?;

    println!("Deleted {removed} insights. Memory reset complete.");
    Ok(())
}
