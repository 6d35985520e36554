//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use sutta_agent::config::{expand_tilde, SuttaConfig};
use sutta_agent::db;

use super::format_bytes;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &SuttaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `sutta import <file.jsonl>` to create and index it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Sutta Agent Health Report");
    println!("=========================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!();
    println!("Embedding model:");
    println!("  Provider:        {}", config.embedding.provider);
    println!(
        "  Stored:          {}",
        report.embedding_model.as_deref().unwrap_or("(not set)")
    );
    println!("  Configured:      {}", config.embedding.model);
    if let Some(ref stored) = report.embedding_model {
        if stored != &config.embedding.model {
            println!("  WARNING: model mismatch! Re-run `sutta import` to update vectors.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    if config.embedding.provider == "local" {
        let model_file = expand_tilde(&config.embedding.cache_dir).join("model.onnx");
        if !model_file.exists() {
            println!("  WARNING: model files missing. Run `sutta model download`.");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Passages:        {}", report.chunk_count);
    println!("  Suttas:          {}", report.sutta_count);
    println!("  Insights:        {}", report.wisdom_count);
    println!("  Audit log:       {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Save insights if possible: sutta export > insights.json");
        println!("  2. Move the damaged database aside: mv {0} {0}.bak", db_path.display());
        println!("  3. Re-index the corpus: sutta import <file.jsonl>");
    }

    Ok(())
}
