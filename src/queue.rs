//! Processing queue over input records.
//!
//! One row per unit of pending conversion work. Entries move
//! `pending → processed` on success; failures append to the error log
//! and set status `error` while leaving `processed` false, so a retry
//! sweep picks them up again.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{InputRecord, InputStatus};

/// Enqueue a new pending input for a file record.
pub async fn create_input(
    pool: &SqlitePool,
    source_type: &str,
    input_file_id: Option<&str>,
) -> Result<i64> {
    let now = Utc::now().timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO inputs (source_type, status, added_at, processed, input_file_id)
        VALUES (?, ?, ?, 0, ?)
        "#,
    )
    .bind(source_type)
    .bind(InputStatus::Pending.as_str())
    .bind(now)
    .bind(input_file_id)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Mark an input processed and link the produced document. The output
/// reference and the processed flag are written together so the entry is
/// never marked done before its result is durable.
pub async fn mark_processed(pool: &SqlitePool, input_id: i64, output_doc_id: i64) -> Result<()> {
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        UPDATE inputs
        SET processed = 1, processed_at = ?, status = ?, output_doc_id = ?
        WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(InputStatus::Processed.as_str())
    .bind(output_doc_id)
    .bind(input_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Append an error message (newline-joined log) and flag the status as
/// `error`. Does not touch `processed`, so the entry stays retryable.
pub async fn add_error(pool: &SqlitePool, input_id: i64, message: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE inputs
        SET errors = CASE WHEN errors IS NULL OR errors = '' THEN ? ELSE errors || char(10) || ? END,
            status = ?
        WHERE id = ?
        "#,
    )
    .bind(message)
    .bind(message)
    .bind(InputStatus::Error.as_str())
    .bind(input_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_by_id(pool: &SqlitePool, input_id: i64) -> Result<Option<InputRecord>> {
    let row = sqlx::query("SELECT * FROM inputs WHERE id = ?")
        .bind(input_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| row_to_record(&r)))
}

/// All entries still eligible for processing, oldest first.
pub async fn unprocessed(pool: &SqlitePool) -> Result<Vec<InputRecord>> {
    let rows = sqlx::query("SELECT * FROM inputs WHERE processed = 0 ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_record).collect())
}

pub async fn by_status(pool: &SqlitePool, status: InputStatus) -> Result<Vec<InputRecord>> {
    let rows = sqlx::query("SELECT * FROM inputs WHERE status = ? ORDER BY id")
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_record).collect())
}

/// The queue entry created for a file record's ingestion, if any.
pub async fn by_file_id(pool: &SqlitePool, file_id: &str) -> Result<Option<InputRecord>> {
    let row = sqlx::query("SELECT * FROM inputs WHERE input_file_id = ? ORDER BY id DESC LIMIT 1")
        .bind(file_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| row_to_record(&r)))
}

/// Entries with a non-empty error log, whether still retryable or
/// processed with degraded results.
pub async fn with_errors(pool: &SqlitePool) -> Result<Vec<InputRecord>> {
    let rows =
        sqlx::query("SELECT * FROM inputs WHERE errors IS NOT NULL AND errors != '' ORDER BY id")
            .fetch_all(pool)
            .await?;
    Ok(rows.iter().map(row_to_record).collect())
}

/// CLI entry point: print the durable error trail of every queue entry
/// that has recorded a failure.
pub async fn run_queue_errors(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let errored = with_errors(&pool).await?;
    pool.close().await;

    if errored.is_empty() {
        println!("No errored queue entries.");
        return Ok(());
    }

    for input in &errored {
        println!(
            "input {} ({}, {})",
            input.id,
            input.source_type,
            if input.processed {
                "processed with errors"
            } else {
                "retryable"
            }
        );
        if let Some(file_id) = &input.input_file_id {
            println!("  file: {}", file_id);
        }
        if let Some(errors) = &input.errors {
            for line in errors.lines() {
                println!("  - {}", line);
            }
        }
    }
    println!("{} entr(ies)", errored.len());

    Ok(())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> InputRecord {
    let status: String = row.get("status");

    InputRecord {
        id: row.get("id"),
        source_type: row.get("source_type"),
        status: InputStatus::parse(&status).unwrap_or(InputStatus::Pending),
        errors: row.get("errors"),
        added_at: row.get("added_at"),
        processed: row.get::<i64, _>("processed") != 0,
        processed_at: row.get("processed_at"),
        input_file_id: row.get("input_file_id"),
        output_doc_id: row.get("output_doc_id"),
    }
}
