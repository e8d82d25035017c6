use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Scan audit trail, one row per discovered root per scan invocation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_results (
            id TEXT PRIMARY KEY,
            root_path TEXT NOT NULL,
            name TEXT NOT NULL,
            scan_kind TEXT NOT NULL,
            files TEXT NOT NULL,
            scan_start INTEGER NOT NULL,
            scan_end INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            options TEXT NOT NULL,
            user TEXT NOT NULL,
            host TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Discovered repo/vault roots, overwritten on re-scan
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_roots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            host TEXT NOT NULL,
            root_path TEXT NOT NULL,
            files TEXT NOT NULL,
            file_count INTEGER NOT NULL DEFAULT 0,
            indexed_at INTEGER NOT NULL,
            UNIQUE(kind, host, root_path)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Versioned file records. sha256 is globally unique; (path, host,
    // version) uniqueness backs the version-assignment retry loop.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            source_type TEXT NOT NULL,
            source_root TEXT NOT NULL,
            source_name TEXT NOT NULL,
            host TEXT NOT NULL,
            user TEXT NOT NULL,
            name TEXT NOT NULL,
            stem TEXT NOT NULL,
            path TEXT NOT NULL,
            relative_path TEXT NOT NULL,
            suffix TEXT NOT NULL,
            sha256 TEXT NOT NULL UNIQUE,
            md5 TEXT NOT NULL,
            mode INTEGER NOT NULL,
            size INTEGER NOT NULL,
            content BLOB,
            content_text TEXT NOT NULL,
            markdown TEXT,
            ctime INTEGER NOT NULL,
            mtime INTEGER NOT NULL,
            line_count INTEGER NOT NULL,
            uri TEXT NOT NULL,
            mimetype TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(path, host, version)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_lines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id TEXT NOT NULL REFERENCES files(id),
            line_number INTEGER NOT NULL,
            line_text TEXT NOT NULL,
            embedding BLOB,
            created_at INTEGER NOT NULL,
            UNIQUE(file_id, line_number)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            source_type TEXT NOT NULL,
            source_ref INTEGER,
            doc_json TEXT NOT NULL,
            markdown TEXT NOT NULL,
            html TEXT NOT NULL,
            text TEXT NOT NULL,
            doctags TEXT NOT NULL,
            chunks_json TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Processing queue
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inputs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_type TEXT NOT NULL,
            status TEXT NOT NULL,
            errors TEXT,
            added_at INTEGER NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            processed_at INTEGER,
            input_file_id TEXT REFERENCES files(id),
            output_doc_id INTEGER REFERENCES documents(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL REFERENCES documents(id),
            idx INTEGER NOT NULL,
            text_chunk TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(document_id, idx)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Render audit trail, keyed by content hash
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS md_xref (
            sha256 TEXT PRIMARY KEY,
            uri TEXT NOT NULL,
            path TEXT NOT NULL,
            source_root TEXT NOT NULL,
            source_name TEXT NOT NULL,
            source_type TEXT NOT NULL,
            vault_path TEXT NOT NULL,
            last_rendered INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Indexes for the hot lookups
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_path_host ON files(path, host, version)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_source ON files(source_type, source_name)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_inputs_processed ON inputs(processed)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_inputs_file ON inputs(input_file_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, idx)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_lines_file ON file_lines(file_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
