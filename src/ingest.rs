//! File processing sweep.
//!
//! Walks the file lists of previously scanned source roots and, for each
//! file with new or changed content, creates a versioned file record,
//! renders its canonical markdown into the vault tree, rebuilds the
//! per-line rows, and enqueues a processing-queue entry. Unchanged
//! content is a dedup no-op; per-file failures are counted and skipped.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::warn;

use crate::config::Config;
use crate::db;
use crate::files;
use crate::models::{ScanKind, SourceRoot};
use crate::queue;
use crate::render;

pub async fn run_process(config: &Config, kind: Option<ScanKind>) -> Result<()> {
    let pool = db::connect(config).await?;
    let roots = load_roots(&pool, kind).await?;

    let mut seen = 0u64;
    let mut created = 0u64;
    let mut unchanged = 0u64;
    let mut errors = 0u64;

    for root in &roots {
        for rel in &root.files {
            seen += 1;
            match process_one(config, &pool, root, rel).await {
                Ok(ProcessOutcome::Created) => created += 1,
                Ok(ProcessOutcome::Unchanged) => unchanged += 1,
                Err(e) => {
                    errors += 1;
                    warn!(root = %root.root_path, file = %rel, "processing failed: {e:#}");
                }
            }
        }
    }

    let label = match kind {
        Some(k) => k.as_str(),
        None => "all",
    };
    println!("process {}", label);
    println!("  roots: {}", roots.len());
    println!("  files seen: {}", seen);
    println!("  new versions: {}", created);
    println!("  unchanged: {}", unchanged);
    println!("  errors: {}", errors);
    println!("ok");

    pool.close().await;
    Ok(())
}

enum ProcessOutcome {
    Created,
    Unchanged,
}

/// Ingest one candidate file: fingerprint, version decision, record
/// insert, markdown render, line rebuild, queue entry.
async fn process_one(
    config: &Config,
    pool: &SqlitePool,
    root: &SourceRoot,
    rel: &str,
) -> Result<ProcessOutcome> {
    let full = Path::new(&root.root_path).join(rel);
    let record = files::build_file_record(
        config,
        &full,
        root.kind.as_str(),
        &root.name,
        &root.root_path,
        rel,
    )?;

    let Some(mut record) = files::create_versioned(pool, record).await? else {
        return Ok(ProcessOutcome::Unchanged);
    };

    let markdown = render::generate_markdown(config, &record);
    files::update_markdown(pool, &record.id, &markdown).await?;
    record.markdown = Some(markdown.clone());

    let dest = render::write_to_vault(config, &record, &markdown)?;
    render::upsert_xref(pool, &record, &dest).await?;

    files::replace_file_lines(pool, &record.id, &record.content_text).await?;
    queue::create_input(pool, &record.source_type, Some(&record.id)).await?;

    Ok(ProcessOutcome::Created)
}

/// Load scanned source roots, optionally restricted to one kind, with
/// their stored file lists decoded.
async fn load_roots(pool: &SqlitePool, kind: Option<ScanKind>) -> Result<Vec<SourceRoot>> {
    let rows = match kind {
        Some(k) => {
            sqlx::query("SELECT * FROM source_roots WHERE kind = ? ORDER BY name")
                .bind(k.as_str())
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query("SELECT * FROM source_roots ORDER BY kind, name")
                .fetch_all(pool)
                .await?
        }
    };

    let mut roots = Vec::with_capacity(rows.len());
    for row in &rows {
        let kind_str: String = row.get("kind");
        let files_json: String = row.get("files");

        roots.push(SourceRoot {
            id: row.get("id"),
            kind: match kind_str.as_str() {
                "repo" => ScanKind::Repo,
                "vault" => ScanKind::Vault,
                _ => ScanKind::List,
            },
            name: row.get("name"),
            host: row.get("host"),
            root_path: row.get("root_path"),
            files: serde_json::from_str(&files_json).unwrap_or_default(),
            file_count: row.get("file_count"),
            indexed_at: row.get("indexed_at"),
        });
    }

    Ok(roots)
}
