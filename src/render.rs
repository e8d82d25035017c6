//! Canonical markdown rendering.
//!
//! Projects a [`FileRecord`] into a markdown document (front matter,
//! metadata table, fenced content) and writes it into the mirrored vault
//! tree at `<vault_root>/<source_type>/<source_name>/<relative_path>.md`.
//! Rendering is a pure function of the record's fields: identical fields
//! produce byte-identical output, which downstream consumers diff on.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::FileRecord;

/// Generate the canonical markdown body for a file record.
pub fn generate_markdown(config: &Config, r: &FileRecord) -> String {
    let lang = language_tag(config, &r.suffix);

    format!(
        r#"---
id: {id}
host: {host}
user: {user}
sha256: {sha256}
uri: {uri}
source_type: {source_type}
source_name: {source_name}
generated_at: {generated_at}
version: {version}
---

# {name} *(Version {version})*

## File Information

**URI:** `{uri}`

| Property | Value |
|----------|-------|
| **Host** | `{host}` |
| **User** | `{user}` |
| **Source Type** | `{source_type}` |
| **Source Name** | `{source_name}` |
| **File Hash (sha256)** | `{sha256}` |
| **File Hash (md5)** | `{md5}` |
| **ID** | `{id}` |
| **Full Path** | `{path}` |
| **Relative Path** | `{relative_path}` |
| **File Name** | `{name}` |
| **File Stem** | `{stem}` |
| **File Mode** | `{mode}` |
| **File Suffix** | `{suffix}` |
| **Size (bytes)** | `{size}` |
| **Line Count** | `{line_count}` |
| **MIME Type** | `{mimetype}` |
| **Created At** | `{ctime}` |
| **Modified At** | `{mtime}` |
| **Indexed At** | `{generated_at}` |

---

## File Content

```{lang}
{content}
```
"#,
        id = r.id,
        host = r.host,
        user = r.user,
        sha256 = r.sha256,
        md5 = r.md5,
        uri = r.uri,
        source_type = r.source_type,
        source_name = r.source_name,
        generated_at = format_ts_iso(r.created_at),
        version = r.version,
        name = r.name,
        path = r.path,
        relative_path = r.relative_path,
        stem = r.stem,
        mode = r.mode,
        suffix = r.suffix,
        size = r.size,
        line_count = r.line_count,
        mimetype = r.mimetype,
        ctime = format_ts_iso(r.ctime),
        mtime = format_ts_iso(r.mtime),
        lang = lang,
        content = r.content_text,
    )
}

/// Vault destination for a record's rendering.
pub fn vault_path(config: &Config, r: &FileRecord) -> PathBuf {
    config
        .storage
        .vault_root
        .join(&r.source_type)
        .join(&r.source_name)
        .join(format!("{}.md", r.relative_path))
}

/// Write the markdown into the vault tree, removing any prior rendering
/// for the same logical path first.
pub fn write_to_vault(config: &Config, r: &FileRecord, markdown: &str) -> Result<PathBuf> {
    let dest = vault_path(config, r);

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create vault directory: {}", parent.display()))?;
    }
    if dest.exists() {
        std::fs::remove_file(&dest)
            .with_context(|| format!("Failed to remove stale rendering: {}", dest.display()))?;
    }

    std::fs::write(&dest, markdown)
        .with_context(|| format!("Failed to write rendering: {}", dest.display()))?;

    Ok(dest)
}

/// Upsert the cross-reference row for a render, keyed by content hash.
/// Updated on every render, including re-renders of unchanged content.
pub async fn upsert_xref(pool: &SqlitePool, r: &FileRecord, vault_dest: &Path) -> Result<()> {
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO md_xref (sha256, uri, path, source_root, source_name, source_type, vault_path, last_rendered)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(sha256) DO UPDATE SET
            uri = excluded.uri,
            path = excluded.path,
            source_root = excluded.source_root,
            source_name = excluded.source_name,
            source_type = excluded.source_type,
            vault_path = excluded.vault_path,
            last_rendered = excluded.last_rendered
        "#,
    )
    .bind(&r.sha256)
    .bind(&r.uri)
    .bind(&r.path)
    .bind(&r.source_root)
    .bind(&r.source_name)
    .bind(&r.source_type)
    .bind(vault_dest.display().to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fence language for a suffix: config override first, then the built-in
/// table, empty when unmapped.
pub fn language_tag(config: &Config, suffix: &str) -> String {
    if let Some(lang) = config.render.languages.get(suffix) {
        return lang.clone();
    }

    match suffix {
        ".rs" => "rust",
        ".py" => "python",
        ".js" => "javascript",
        ".ts" => "typescript",
        ".jsx" => "jsx",
        ".tsx" => "tsx",
        ".java" => "java",
        ".c" | ".h" => "c",
        ".cpp" | ".cc" | ".hpp" => "cpp",
        ".cs" => "csharp",
        ".go" => "go",
        ".rb" => "ruby",
        ".php" => "php",
        ".sh" | ".bash" => "bash",
        ".ps1" => "powershell",
        ".html" | ".htm" => "html",
        ".css" => "css",
        ".md" => "markdown",
        ".json" => "json",
        ".toml" => "toml",
        ".yaml" | ".yml" => "yaml",
        ".xml" => "xml",
        ".sql" => "sql",
        ".lua" => "lua",
        ".swift" => "swift",
        ".kt" => "kotlin",
        _ => "",
    }
    .to_string()
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
