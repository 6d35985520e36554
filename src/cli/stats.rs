use anyhow::Result;
use rusqlite::OptionalExtension;

use sutta_agent::config::SuttaConfig;

use super::format_bytes;

/// Display corpus and memory statistics in the terminal.
pub fn stats(config: &SuttaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = sutta_agent::db::open_database(&db_path)?;

    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

    println!("Corpus");
    println!("{}", "=".repeat(40));
    println!("  Passages:            {}", count("SELECT COUNT(*) FROM chunks")?);
    println!(
        "  Suttas:              {}",
        count("SELECT COUNT(DISTINCT sutta_uid) FROM chunks")?
    );
    println!();

    println!("By Nikaya:");
    let mut stmt = conn.prepare(
        "SELECT COALESCE(nikaya, '(unknown)'), COUNT(DISTINCT sutta_uid) \
         FROM chunks GROUP BY 1 ORDER BY 1",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (nikaya, suttas) in rows {
        println!("  {:<12} {}", nikaya, suttas);
    }
    println!();

    println!("Memory");
    println!("{}", "=".repeat(40));
    println!("  Insights:            {}", count("SELECT COUNT(*) FROM wisdom")?);
    println!(
        "  Replays:             {}",
        count("SELECT COALESCE(SUM(hit_count), 0) FROM wisdom")?
    );

    let most_recalled: Option<(String, i64)> = conn
        .query_row(
            "SELECT question, hit_count FROM wisdom WHERE hit_count > 0 \
             ORDER BY hit_count DESC, created_at LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((question, hits)) = most_recalled {
        println!("  Most recalled:       {question} ({hits} hits)");
    }

    let oldest: Option<String> =
        conn.query_row("SELECT MIN(created_at) FROM wisdom", [], |row| row.get(0))?;
    let newest: Option<String> =
        conn.query_row("SELECT MAX(created_at) FROM wisdom", [], |row| row.get(0))?;
    if let Some(ref oldest) = oldest {
        println!("  Oldest insight:      {oldest}");
    }
    if let Some(ref newest) = newest {
        println!("  Newest insight:      {newest}");
    }
    println!();

    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    println!("Database size:         {}", format_bytes(db_size));

    Ok(())
}
