//! File record store and version resolution.
//!
//! Computes content fingerprints, decides version numbers for logical
//! (path, host) identities, and persists versioned [`FileRecord`] rows.
//! Content changes always create a new row; rows are never rewritten in
//! place except to back-fill the rendered markdown.

use anyhow::{Context, Result};
use chrono::Utc;
use md5::Md5;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::SystemTime;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::{FileLine, FileRecord};

/// Content fingerprints over the full byte content. sha256 is the
/// authoritative identity; md5 is secondary, informational.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub sha256: String,
    pub md5: String,
}

pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let mut sha = Sha256::new();
    sha.update(bytes);
    let mut md5 = Md5::new();
    md5.update(bytes);

    Fingerprint {
        sha256: format!("{:x}", sha.finalize()),
        md5: format!("{:x}", md5.finalize()),
    }
}

/// Outcome of the version decision for freshly hashed content.
#[derive(Debug, Clone)]
pub enum VersionDecision {
    /// Content already ingested; skip record creation entirely.
    Unchanged { existing_id: String },
    /// New or modified content; insert with this version number.
    New { version: i64 },
}

/// Decide the next version for (path, host) given a fresh sha256.
///
/// The sha256 lookup is the dedup fast path: a hit anywhere in the store
/// (including an older version of this path) means the bytes are already
/// known. Otherwise the latest version for the identity determines the
/// successor.
pub async fn resolve_version(
    pool: &SqlitePool,
    path: &str,
    host: &str,
    sha256: &str,
) -> Result<VersionDecision> {
    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM files WHERE sha256 = ?")
        .bind(sha256)
        .fetch_optional(pool)
        .await?;

    if let Some(existing_id) = existing {
        return Ok(VersionDecision::Unchanged { existing_id });
    }

    let latest: Option<i64> = sqlx::query_scalar(
        "SELECT version FROM files WHERE path = ? AND host = ? ORDER BY version DESC LIMIT 1",
    )
    .bind(path)
    .bind(host)
    .fetch_optional(pool)
    .await?;

    Ok(VersionDecision::New {
        version: latest.map_or(1, |v| v + 1),
    })
}

/// Build a [`FileRecord`] (version left at 0, assigned on insert) from a
/// file on disk. Undecodable content falls back to Latin-1 so ingestion
/// never fails on encoding.
pub fn build_file_record(
    config: &Config,
    full_path: &Path,
    source_type: &str,
    source_name: &str,
    source_root: &str,
    relative_path: &str,
) -> Result<FileRecord> {
    let bytes = std::fs::read(full_path)
        .with_context(|| format!("Failed to read file: {}", full_path.display()))?;
    let content_text = decode_text(&bytes);
    let prints = fingerprint(&bytes);

    let meta = std::fs::metadata(full_path)
        .with_context(|| format!("Failed to stat file: {}", full_path.display()))?;
    let mtime = system_time_secs(meta.modified().ok());
    let ctime = system_time_secs(meta.created().ok().or(meta.modified().ok()));

    let name = full_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = full_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let suffix = full_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mimetype = mime_guess::from_path(full_path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string();

    let size = meta.len();
    let content = if size <= config.storage.max_file_size_bytes {
        Some(bytes)
    } else {
        None
    };

    let line_count = content_text.lines().count() as i64;
    let uri = format!("file://{}", full_path.display().to_string().replace('\\', "/"));

    Ok(FileRecord {
        id: Uuid::new_v4().to_string(),
        version: 0,
        source_type: source_type.to_string(),
        source_root: source_root.to_string(),
        source_name: source_name.to_string(),
        host: config.identity.resolve_host(),
        user: config.identity.resolve_user(),
        name,
        stem,
        path: full_path.display().to_string(),
        relative_path: relative_path.to_string(),
        suffix,
        sha256: prints.sha256,
        md5: prints.md5,
        mode: file_mode(&meta),
        size: size as i64,
        content,
        content_text,
        markdown: None,
        ctime,
        mtime,
        line_count,
        uri,
        mimetype,
        created_at: Utc::now().timestamp(),
    })
}

/// Attempt UTF-8 first; fall back to Latin-1 so every byte sequence
/// decodes to something searchable.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn system_time_secs(t: Option<SystemTime>) -> i64 {
    t.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mode() as i64
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> i64 {
    0
}

/// Insert a record with a freshly resolved version, retrying the
/// decide-then-insert sequence when a concurrent writer claims the same
/// (path, host, version) slot first.
pub async fn create_versioned(
    pool: &SqlitePool,
    mut record: FileRecord,
) -> Result<Option<FileRecord>> {
    const MAX_ATTEMPTS: u32 = 5;

    for _ in 0..MAX_ATTEMPTS {
        match resolve_version(pool, &record.path, &record.host, &record.sha256).await? {
            VersionDecision::Unchanged { .. } => return Ok(None),
            VersionDecision::New { version } => {
                record.version = version;
                match insert(pool, &record).await {
                    Ok(()) => return Ok(Some(record)),
                    Err(e) if is_unique_violation(&e) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    anyhow::bail!(
        "version assignment kept conflicting for {} on {}",
        record.path,
        record.host
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

async fn insert(pool: &SqlitePool, r: &FileRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO files (id, version, source_type, source_root, source_name, host, user,
                           name, stem, path, relative_path, suffix, sha256, md5, mode, size,
                           content, content_text, markdown, ctime, mtime, line_count, uri,
                           mimetype, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&r.id)
    .bind(r.version)
    .bind(&r.source_type)
    .bind(&r.source_root)
    .bind(&r.source_name)
    .bind(&r.host)
    .bind(&r.user)
    .bind(&r.name)
    .bind(&r.stem)
    .bind(&r.path)
    .bind(&r.relative_path)
    .bind(&r.suffix)
    .bind(&r.sha256)
    .bind(&r.md5)
    .bind(r.mode)
    .bind(r.size)
    .bind(&r.content)
    .bind(&r.content_text)
    .bind(&r.markdown)
    .bind(r.ctime)
    .bind(r.mtime)
    .bind(r.line_count)
    .bind(&r.uri)
    .bind(&r.mimetype)
    .bind(r.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Back-fill the rendered markdown for a record.
pub async fn update_markdown(pool: &SqlitePool, id: &str, markdown: &str) -> Result<()> {
    sqlx::query("UPDATE files SET markdown = ? WHERE id = ?")
        .bind(markdown)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<FileRecord>> {
    let row = sqlx::query("SELECT * FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| row_to_record(&r)))
}

pub async fn get_by_sha256(pool: &SqlitePool, sha256: &str) -> Result<Option<FileRecord>> {
    let row = sqlx::query("SELECT * FROM files WHERE sha256 = ?")
        .bind(sha256)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| row_to_record(&r)))
}

/// Single-column equality filters over the record store. One query
/// surface instead of a lookup function per column.
#[derive(Debug, Clone, Copy)]
pub enum FileFilter<'a> {
    SourceType(&'a str),
    SourceName(&'a str),
    Host(&'a str),
    Suffix(&'a str),
    Mimetype(&'a str),
}

impl<'a> FileFilter<'a> {
    fn column(&self) -> &'static str {
        match self {
            FileFilter::SourceType(_) => "source_type",
            FileFilter::SourceName(_) => "source_name",
            FileFilter::Host(_) => "host",
            FileFilter::Suffix(_) => "suffix",
            FileFilter::Mimetype(_) => "mimetype",
        }
    }

    fn value(&self) -> &'a str {
        match self {
            FileFilter::SourceType(v)
            | FileFilter::SourceName(v)
            | FileFilter::Host(v)
            | FileFilter::Suffix(v)
            | FileFilter::Mimetype(v) => v,
        }
    }
}

pub async fn find(pool: &SqlitePool, filter: FileFilter<'_>) -> Result<Vec<FileRecord>> {
    let sql = format!(
        "SELECT * FROM files WHERE {} = ? ORDER BY path, version",
        filter.column()
    );
    let rows = sqlx::query(&sql).bind(filter.value()).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_record).collect())
}

/// Free-text search over file name and decoded content.
pub async fn search(pool: &SqlitePool, text: &str) -> Result<Vec<FileRecord>> {
    let pattern = format!("%{}%", text);
    let rows = sqlx::query(
        "SELECT * FROM files WHERE name LIKE ? OR content_text LIKE ? ORDER BY path, version",
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_record).collect())
}

/// Replace the derived per-line rows for a file.
pub async fn replace_file_lines(
    pool: &SqlitePool,
    file_id: &str,
    content_text: &str,
) -> Result<u64> {
    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM file_lines WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut *tx)
        .await?;

    let mut count = 0u64;
    for (i, line) in content_text.lines().enumerate() {
        sqlx::query(
            "INSERT INTO file_lines (file_id, line_number, line_text, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(i as i64 + 1)
        .bind(line)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}

/// The derived per-line rows for a file, in line order.
pub async fn file_lines(pool: &SqlitePool, file_id: &str) -> Result<Vec<FileLine>> {
    let rows = sqlx::query("SELECT * FROM file_lines WHERE file_id = ? ORDER BY line_number")
        .bind(file_id)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|r| FileLine {
            id: r.get("id"),
            file_id: r.get("file_id"),
            line_number: r.get("line_number"),
            line_text: r.get("line_text"),
            embedding: r
                .get::<Option<Vec<u8>>, _>("embedding")
                .map(|b| embedding::blob_to_vec(&b)),
            created_at: r.get("created_at"),
        })
        .collect())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
    FileRecord {
        id: row.get("id"),
        version: row.get("version"),
        source_type: row.get("source_type"),
        source_root: row.get("source_root"),
        source_name: row.get("source_name"),
        host: row.get("host"),
        user: row.get("user"),
        name: row.get("name"),
        stem: row.get("stem"),
        path: row.get("path"),
        relative_path: row.get("relative_path"),
        suffix: row.get("suffix"),
        sha256: row.get("sha256"),
        md5: row.get("md5"),
        mode: row.get("mode"),
        size: row.get("size"),
        content: row.get("content"),
        content_text: row.get("content_text"),
        markdown: row.get("markdown"),
        ctime: row.get("ctime"),
        mtime: row.get("mtime"),
        line_count: row.get("line_count"),
        uri: row.get("uri"),
        mimetype: row.get("mimetype"),
        created_at: row.get("created_at"),
    }
}

/// CLI entry point: print one file record in full. Accepts either a
/// record id or a sha256 fingerprint.
pub async fn run_file_show(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let record = match get_by_id(&pool, id).await? {
        Some(r) => Some(r),
        None => get_by_sha256(&pool, id).await?,
    };
    pool.close().await;

    let Some(r) = record else {
        anyhow::bail!("file record not found: {}", id);
    };

    println!("--- File ---");
    println!("id:            {}", r.id);
    println!("version:       {}", r.version);
    println!("source:        {}:{}", r.source_type, r.source_name);
    println!("host:          {}", r.host);
    println!("path:          {}", r.path);
    println!("relative_path: {}", r.relative_path);
    println!("sha256:        {}", r.sha256);
    println!("md5:           {}", r.md5);
    println!("size:          {}", r.size);
    println!("lines:         {}", r.line_count);
    println!("mimetype:      {}", r.mimetype);
    println!("uri:           {}", r.uri);
    println!("rendered:      {}", r.markdown.is_some());

    Ok(())
}

/// CLI entry point: search records by name/content and print matches.
pub async fn run_file_search(config: &Config, text: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let records = search(&pool, text).await?;
    pool.close().await;

    if records.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for r in &records {
        println!(
            "{}  v{}  {}:{}  {}",
            r.id, r.version, r.source_type, r.source_name, r.relative_path
        );
    }
    println!("{} match(es)", records.len());

    Ok(())
}

/// CLI entry point: list records matching one equality filter.
pub async fn run_file_list(config: &Config, filter: FileFilter<'_>) -> Result<()> {
    let pool = db::connect(config).await?;
    let records = find(&pool, filter).await?;
    pool.close().await;

    if records.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for r in &records {
        println!(
            "{}  v{}  {}:{}  {}  {}",
            r.id, r.version, r.source_type, r.source_name, r.relative_path, r.mimetype
        );
    }
    println!("{} record(s)", records.len());

    Ok(())
}

/// CLI entry point: print the derived line rows for a file.
pub async fn run_file_lines(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let lines = file_lines(&pool, id).await?;
    pool.close().await;

    if lines.is_empty() {
        println!("No lines recorded for {}.", id);
        return Ok(());
    }

    for line in &lines {
        println!("{:>5}  {}", line.line_number, line.line_text);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprints_are_stable_and_distinct() {
        let a = fingerprint(b"hello");
        let b = fingerprint(b"hello");
        let c = fingerprint(b"hello world");

        assert_eq!(a.sha256, b.sha256);
        assert_eq!(a.md5, b.md5);
        assert_ne!(a.sha256, c.sha256);
        assert_eq!(
            a.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(a.md5, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn latin1_fallback_never_fails() {
        let bytes = vec![0xff, 0xfe, b'a', b'b'];
        let decoded = decode_text(&bytes);
        assert!(decoded.ends_with("ab"));
        assert_eq!(decoded.chars().count(), 4);
    }
}
