//! Filesystem and repository scanning.
//!
//! Walks a root path, identifies repository and vault boundaries (a
//! `.git` directory, or the configured vault marker directory), and
//! enumerates candidate files with ignore rules applied. File lists are
//! returned sorted so repeated scans of an unchanged tree are identical.

use anyhow::Result;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::models::{ScanKind, ScanOptions, ScanResult};

/// Scan for version-controlled repositories under `path`, one result per
/// discovered `.git` boundary.
///
/// With `tracked_only`, files are enumerated via `git ls-files`; any
/// failure (missing tool, not a repository) falls back to a full walk.
pub fn scan_repos(config: &Config, path: &Path, tracked_only: bool) -> Result<Vec<ScanResult>> {
    let base = path.canonicalize()?;
    let ignore = ignore_parts(config);
    let mut results = Vec::new();

    for root in find_marker_roots(&base, ".git", &ignore) {
        let scan_start = Utc::now();
        let mut options = ScanOptions {
            path_arg: path.display().to_string(),
            tracked_only,
            errors: Vec::new(),
        };

        let candidates = if tracked_only {
            match git_ls_files(&root) {
                Ok(listed) => listed,
                Err(e) => {
                    options
                        .errors
                        .push(format!("git ls-files failed, walking instead: {}", e));
                    walk_files(&root, &mut options.errors)
                }
            }
        } else {
            walk_files(&root, &mut options.errors)
        };

        let files = filter_candidates(config, &root, candidates, &ignore, None)?;
        let scan_end = Utc::now();

        results.push(ScanResult {
            id: Uuid::new_v4().to_string(),
            root_path: root.display().to_string(),
            name: root_name(&root),
            kind: ScanKind::Repo,
            files,
            scan_start,
            scan_end,
            duration_ms: (scan_end - scan_start).num_milliseconds(),
            options,
            user: config.identity.resolve_user(),
            host: config.identity.resolve_host(),
        });
    }

    Ok(results)
}

/// Scan for note vaults under `path`, one result per discovered marker
/// directory. Only files with the configured note suffixes are listed,
/// and nothing inside the marker directory itself.
pub fn scan_vaults(config: &Config, path: &Path) -> Result<Vec<ScanResult>> {
    let base = path.canonicalize()?;
    let marker = config.scan.vault_marker.clone();
    // Nothing inside the marker directory is a note.
    let mut ignore = ignore_parts(config);
    ignore.insert(marker.clone());
    let mut results = Vec::new();

    for root in find_marker_roots(&base, &marker, &ignore) {
        let scan_start = Utc::now();
        let mut options = ScanOptions {
            path_arg: path.display().to_string(),
            tracked_only: false,
            errors: Vec::new(),
        };

        let candidates = walk_files(&root, &mut options.errors);
        let files = filter_candidates(
            config,
            &root,
            candidates,
            &ignore,
            Some(&config.scan.vault_extensions),
        )?;
        let scan_end = Utc::now();

        results.push(ScanResult {
            id: Uuid::new_v4().to_string(),
            root_path: root.display().to_string(),
            name: root_name(&root),
            kind: ScanKind::Vault,
            files,
            scan_start,
            scan_end,
            duration_ms: (scan_end - scan_start).num_milliseconds(),
            options,
            user: config.identity.resolve_user(),
            host: config.identity.resolve_host(),
        });
    }

    Ok(results)
}

/// Produce a single listing of all non-ignored files under `path`.
pub fn scan_list(config: &Config, path: &Path) -> Result<ScanResult> {
    let root = path.canonicalize()?;
    let ignore = ignore_parts(config);
    let scan_start = Utc::now();
    let mut options = ScanOptions {
        path_arg: path.display().to_string(),
        tracked_only: false,
        errors: Vec::new(),
    };

    let candidates = walk_files(&root, &mut options.errors);
    let files = filter_candidates(config, &root, candidates, &ignore, None)?;
    let scan_end = Utc::now();

    Ok(ScanResult {
        id: Uuid::new_v4().to_string(),
        root_path: root.display().to_string(),
        name: root_name(&root),
        kind: ScanKind::List,
        files,
        scan_start,
        scan_end,
        duration_ms: (scan_end - scan_start).num_milliseconds(),
        options,
        user: config.identity.resolve_user(),
        host: config.identity.resolve_host(),
    })
}

/// The configured ignore segments, with `.git` always present.
fn ignore_parts(config: &Config) -> BTreeSet<String> {
    let mut parts: BTreeSet<String> = config.scan.ignore_parts.iter().cloned().collect();
    parts.insert(".git".to_string());
    parts
}

/// True when any path segment matches an ignored entry.
fn path_has_ignored_part(path: &Path, parts: &BTreeSet<String>) -> bool {
    path.components()
        .any(|c| parts.contains(&c.as_os_str().to_string_lossy().to_string()))
}

/// Find root directories identified by a marker directory name, skipping
/// markers whose parents are themselves ignored.
fn find_marker_roots(base: &Path, marker: &str, ignore: &BTreeSet<String>) -> Vec<PathBuf> {
    let mut roots = Vec::new();

    for entry in WalkDir::new(base).into_iter().flatten() {
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy() != marker {
            continue;
        }
        let Some(root) = entry.path().parent() else {
            continue;
        };
        if path_has_ignored_part(root.strip_prefix(base).unwrap_or(root), ignore) {
            continue;
        }
        roots.push(root.to_path_buf());
    }

    roots.sort();
    roots
}

/// Recursively collect every file under `root`, relative paths only.
/// Unreadable entries are recorded and skipped.
fn walk_files(root: &Path, errors: &mut Vec<String>) -> Vec<String> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        match entry {
            Ok(e) if e.file_type().is_file() => {
                let rel = e.path().strip_prefix(root).unwrap_or(e.path());
                files.push(rel.to_string_lossy().replace('\\', "/"));
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("unreadable entry: {}", e)),
        }
    }

    files
}

/// List tracked files via `git ls-files`.
fn git_ls_files(root: &Path) -> Result<Vec<String>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .arg("ls-files")
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git ls-files: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.to_string())
        .collect())
}

/// Apply ignore segments, ignored suffixes/filenames, the optional note
/// suffix filter, and configured exclude globs. Returns a sorted,
/// deduplicated list.
fn filter_candidates(
    config: &Config,
    root: &Path,
    candidates: Vec<String>,
    ignore: &BTreeSet<String>,
    keep_suffixes: Option<&[String]>,
) -> Result<Vec<String>> {
    let exclude_set = build_globset(&config.scan.exclude_globs)?;
    let mut kept = BTreeSet::new();

    for rel in candidates {
        let rel_path = Path::new(&rel);
        let full = root.join(rel_path);

        if path_has_ignored_part(rel_path, ignore) {
            continue;
        }
        if is_ignored_name(config, &full) {
            continue;
        }
        if exclude_set.is_match(&rel) {
            continue;
        }
        if let Some(suffixes) = keep_suffixes {
            if !has_suffix(&full, suffixes) {
                continue;
            }
        }

        kept.insert(rel);
    }

    Ok(kept.into_iter().collect())
}

/// True when the file suffix or exact filename is configured as ignored.
fn is_ignored_name(config: &Config, path: &Path) -> bool {
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    config
        .scan
        .ignore_extensions
        .iter()
        .any(|e| *e == suffix || *e == name)
}

fn has_suffix(path: &Path, suffixes: &[String]) -> bool {
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    suffixes.iter().any(|s| *s == suffix)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string())
}

/// Persist scan results as audit rows.
pub async fn store_scan_results(pool: &SqlitePool, results: &[ScanResult]) -> Result<()> {
    for result in results {
        sqlx::query(
            r#"
            INSERT INTO scan_results (id, root_path, name, scan_kind, files, scan_start, scan_end, duration_ms, options, user, host)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.id)
        .bind(&result.root_path)
        .bind(&result.name)
        .bind(result.kind.as_str())
        .bind(serde_json::to_string(&result.files)?)
        .bind(result.scan_start.timestamp())
        .bind(result.scan_end.timestamp())
        .bind(result.duration_ms)
        .bind(serde_json::to_string(&result.options)?)
        .bind(&result.user)
        .bind(&result.host)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Upsert one `source_roots` row per repo/vault result, replacing the
/// file list and bumping `indexed_at`.
pub async fn record_roots(pool: &SqlitePool, results: &[ScanResult]) -> Result<()> {
    let now = Utc::now().timestamp();

    for result in results {
        if result.kind == ScanKind::List {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO source_roots (kind, name, host, root_path, files, file_count, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, host, root_path) DO UPDATE SET
                name = excluded.name,
                files = excluded.files,
                file_count = excluded.file_count,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(result.kind.as_str())
        .bind(&result.name)
        .bind(&result.host)
        .bind(&result.root_path)
        .bind(serde_json::to_string(&result.files)?)
        .bind(result.files.len() as i64)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// CLI entry point: scan for repositories, persist the results, and
/// record the discovered roots.
pub async fn run_scan_repos(config: &Config, path: &Path, tracked_only: bool) -> Result<()> {
    let results = scan_repos(config, path, tracked_only)?;
    if results.is_empty() {
        println!("No repositories found.");
        return Ok(());
    }

    persist(config, &results).await?;
    report("repos", &results);
    Ok(())
}

/// CLI entry point: scan for note vaults, persist the results, and
/// record the discovered roots.
pub async fn run_scan_vaults(config: &Config, path: &Path) -> Result<()> {
    let results = scan_vaults(config, path)?;
    if results.is_empty() {
        println!("No vaults found.");
        return Ok(());
    }

    persist(config, &results).await?;
    report("vaults", &results);
    Ok(())
}

/// CLI entry point: list files under a path, persisting the result for
/// audit. Output is newline-delimited by default, JSON with `--json`.
pub async fn run_scan_list(config: &Config, path: &Path, json: bool) -> Result<()> {
    let result = scan_list(config, path)?;

    let pool = db::connect(config).await?;
    store_scan_results(&pool, std::slice::from_ref(&result)).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for file in &result.files {
            println!("{}", file);
        }
    }

    Ok(())
}

async fn persist(config: &Config, results: &[ScanResult]) -> Result<()> {
    let pool = db::connect(config).await?;
    store_scan_results(&pool, results).await?;
    record_roots(&pool, results).await?;
    pool.close().await;
    Ok(())
}

fn report(label: &str, results: &[ScanResult]) {
    println!("scan {}", label);
    println!("  roots found: {}", results.len());
    for result in results {
        println!(
            "  {} ({} files, {} ms)",
            result.root_path,
            result.file_count(),
            result.duration_ms
        );
        for error in &result.options.errors {
            println!("    warning: {}", error);
        }
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, StorageConfig};
    use std::fs;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        Config {
            db: DbConfig {
                path: tmp.path().join("fw.sqlite"),
            },
            storage: StorageConfig {
                vault_root: tmp.path().join("md_vault"),
                max_file_size_bytes: 1024 * 1024,
                max_processing_size_bytes: 3 * 1024 * 1024,
            },
            scan: Default::default(),
            identity: Default::default(),
            chunking: Default::default(),
            embedding: Default::default(),
            render: Default::default(),
        }
    }

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn list_scan_is_sorted_and_deterministic() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        touch(&tmp.path().join("b.txt"), "b");
        touch(&tmp.path().join("a.txt"), "a");
        touch(&tmp.path().join("sub/c.txt"), "c");

        let first = scan_list(&config, tmp.path()).unwrap();
        let second = scan_list(&config, tmp.path()).unwrap();

        assert_eq!(first.files, vec!["a.txt", "b.txt", "sub/c.txt"]);
        assert_eq!(first.files, second.files);
    }

    #[test]
    fn ignored_parts_and_suffixes_are_excluded() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        touch(&tmp.path().join("keep.rs"), "fn main() {}");
        touch(&tmp.path().join(".git/HEAD"), "ref");
        touch(&tmp.path().join("node_modules/pkg/index.js"), "x");
        touch(&tmp.path().join("logo.png"), "binary");

        let result = scan_list(&config, tmp.path()).unwrap();
        assert_eq!(result.files, vec!["keep.rs"]);
    }

    #[test]
    fn repo_scan_finds_git_roots_with_fallback_walk() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        // A bare marker directory is not a functioning repository, so
        // tracked-only enumeration must fall back to a walk.
        fs::create_dir_all(tmp.path().join("proj/.git")).unwrap();
        touch(&tmp.path().join("proj/src/lib.rs"), "pub fn f() {}");
        touch(&tmp.path().join("proj/README.md"), "# proj");

        let results = scan_repos(&config, tmp.path(), true).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ScanKind::Repo);
        assert_eq!(results[0].name, "proj");
        assert_eq!(results[0].files, vec!["README.md", "src/lib.rs"]);
    }

    #[test]
    fn vault_scan_keeps_notes_only() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        fs::create_dir_all(tmp.path().join("notes/.obsidian")).unwrap();
        touch(&tmp.path().join("notes/.obsidian/app.json"), "{}");
        touch(&tmp.path().join("notes/daily/today.md"), "# today");
        touch(&tmp.path().join("notes/attachment.csv"), "a,b");

        let results = scan_vaults(&config, tmp.path()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ScanKind::Vault);
        assert_eq!(results[0].files, vec!["daily/today.md"]);
    }
}
