//! Document retrieval.
//!
//! Reads back a stored document record and its ordered chunks. Used by
//! `fw doc show` to inspect pipeline output.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::{ChunkRecord, DocumentRecord};

pub async fn get_document(pool: &SqlitePool, id: i64) -> Result<Option<DocumentRecord>> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| DocumentRecord {
        id: r.get("id"),
        source: r.get("source"),
        source_type: r.get("source_type"),
        source_ref: r.get("source_ref"),
        doc_json: r.get("doc_json"),
        markdown: r.get("markdown"),
        html: r.get("html"),
        text: r.get("text"),
        doctags: r.get("doctags"),
        chunks_json: r.get("chunks_json"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }))
}

/// Chunks of a document in retrieval order.
pub async fn get_chunks(pool: &SqlitePool, document_id: i64) -> Result<Vec<ChunkRecord>> {
    let rows = sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY idx ASC")
        .bind(document_id)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|r| ChunkRecord {
            id: r.get("id"),
            document_id: r.get("document_id"),
            idx: r.get("idx"),
            text_chunk: r.get("text_chunk"),
            embedding: embedding::blob_to_vec(&r.get::<Vec<u8>, _>("embedding")),
            created_at: r.get("created_at"),
        })
        .collect())
}

/// CLI entry point: print a document and its chunks.
pub async fn run_doc_show(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let doc = get_document(&pool, id).await?;

    let Some(doc) = doc else {
        pool.close().await;
        bail!("document not found: {}", id);
    };

    let chunks = get_chunks(&pool, doc.id).await?;
    pool.close().await;

    println!("--- Document ---");
    println!("id:          {}", doc.id);
    println!("source:      {}", doc.source);
    println!("source_type: {}", doc.source_type);
    if let Some(r) = doc.source_ref {
        println!("source_ref:  input {}", r);
    }
    println!("created_at:  {}", format_ts_iso(doc.created_at));
    if let Some(updated) = doc.updated_at {
        println!("updated_at:  {}", format_ts_iso(updated));
    }
    println!();

    println!("--- Markdown ---");
    println!("{}", doc.markdown);
    println!();

    println!("--- Chunks ({}) ---", chunks.len());
    for chunk in &chunks {
        println!("[chunk {}] ({} dims)", chunk.idx, chunk.embedding.len());
        println!("{}", chunk.text_chunk);
        println!();
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
