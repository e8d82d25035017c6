//! Indexing status overview.
//!
//! Quick summary of what has been scanned, versioned, rendered, and
//! processed: root counts, file record counts, queue backlog, document
//! and chunk totals. Used by `fw status` to confirm sweeps are working.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let repo_roots: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM source_roots WHERE kind = 'repo'")
            .fetch_one(&pool)
            .await?;
    let vault_roots: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM source_roots WHERE kind = 'vault'")
            .fetch_one(&pool)
            .await?;
    let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(&pool)
        .await?;
    let rendered: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM md_xref")
        .fetch_one(&pool)
        .await?;
    let pending: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inputs WHERE processed = 0")
        .fetch_one(&pool)
        .await?;
    let processed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inputs WHERE processed = 1")
        .fetch_one(&pool)
        .await?;
    let errored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inputs WHERE status = 'error'")
        .fetch_one(&pool)
        .await?;
    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;
    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("fileweave — Indexing Status");
    println!("===========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Repo roots:    {}", repo_roots);
    println!("  Vault roots:   {}", vault_roots);
    println!("  File records:  {}", total_files);
    println!("  Rendered:      {}", rendered);
    println!();
    println!("  Queue pending:   {}", pending);
    println!("  Queue processed: {}", processed);
    println!("  Queue errored:   {}", errored);
    println!();
    println!("  Documents:     {}", total_docs);
    println!("  Chunks:        {}", total_chunks);

    // Per-source breakdown of file versions
    let source_rows = sqlx::query(
        r#"
        SELECT source_type, source_name, COUNT(*) AS file_count, MAX(version) AS max_version
        FROM files
        GROUP BY source_type, source_name
        ORDER BY file_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !source_rows.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<8} {:<24} {:>6} {:>12}",
            "TYPE", "NAME", "FILES", "MAX VERSION"
        );
        println!("  {}", "-".repeat(54));
        for row in &source_rows {
            println!(
                "  {:<8} {:<24} {:>6} {:>12}",
                row.get::<String, _>("source_type"),
                row.get::<String, _>("source_name"),
                row.get::<i64, _>("file_count"),
                row.get::<i64, _>("max_version"),
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
