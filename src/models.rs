//! Core data models used throughout fileweave.
//!
//! These types represent scan output, discovered source roots, versioned
//! file records, queue entries, and the documents and chunks that flow
//! through the indexing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a scan is looking for: version-controlled repositories, note
/// vaults, or a plain recursive listing of the given path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Repo,
    Vault,
    List,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Repo => "repo",
            ScanKind::Vault => "vault",
            ScanKind::List => "list",
        }
    }
}

/// Options and diagnostics captured with each scan invocation.
///
/// `errors` collects non-fatal problems (unreadable subtrees, a failed
/// `git ls-files`) so a partial scan still produces a usable result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    pub path_arg: String,
    pub tracked_only: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Ephemeral output of one scan invocation, one per discovered root.
/// Persisted for audit, never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub id: String,
    pub root_path: String,
    pub name: String,
    pub kind: ScanKind,
    pub files: Vec<String>,
    pub scan_start: DateTime<Utc>,
    pub scan_end: DateTime<Utc>,
    pub duration_ms: i64,
    pub options: ScanOptions,
    pub user: String,
    pub host: String,
}

impl ScanResult {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// A discovered repository or vault root, overwritten on each re-scan.
#[derive(Debug, Clone)]
pub struct SourceRoot {
    pub id: i64,
    pub kind: ScanKind,
    pub name: String,
    pub host: String,
    pub root_path: String,
    pub files: Vec<String>,
    pub file_count: i64,
    pub indexed_at: i64,
}

/// One version of one logical file, identified by an opaque id.
///
/// Content changes never update a row in place; they create a new row
/// with `version` bumped. `content` is omitted above the configured size
/// threshold, `markdown` is back-filled after rendering.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: String,
    pub version: i64,
    pub source_type: String,
    pub source_root: String,
    pub source_name: String,
    pub host: String,
    pub user: String,
    pub name: String,
    pub stem: String,
    pub path: String,
    pub relative_path: String,
    pub suffix: String,
    pub sha256: String,
    pub md5: String,
    pub mode: i64,
    pub size: i64,
    pub content: Option<Vec<u8>>,
    pub content_text: String,
    pub markdown: Option<String>,
    pub ctime: i64,
    pub mtime: i64,
    pub line_count: i64,
    pub uri: String,
    pub mimetype: String,
    pub created_at: i64,
}

/// One text line of a file record, recreated whenever the parent's
/// content changes. Embedding is optional and back-filled.
#[derive(Debug, Clone)]
pub struct FileLine {
    pub id: i64,
    pub file_id: String,
    pub line_number: i64,
    pub line_text: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: i64,
}

/// Queue entry status. `Error` does not mean the entry is finished:
/// as long as `processed` stays false it remains eligible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    Pending,
    Processed,
    Error,
}

impl InputStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputStatus::Pending => "pending",
            InputStatus::Processed => "processed",
            InputStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InputStatus::Pending),
            "processed" => Some(InputStatus::Processed),
            "error" => Some(InputStatus::Error),
            _ => None,
        }
    }
}

/// A unit of pending conversion work.
#[derive(Debug, Clone)]
pub struct InputRecord {
    pub id: i64,
    pub source_type: String,
    pub status: InputStatus,
    pub errors: Option<String>,
    pub added_at: i64,
    pub processed: bool,
    pub processed_at: Option<i64>,
    pub input_file_id: Option<String>,
    pub output_doc_id: Option<i64>,
}

/// Output of converting one source into a structured document, with all
/// export projections captured at conversion time.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: i64,
    pub source: String,
    pub source_type: String,
    pub source_ref: Option<i64>,
    pub doc_json: String,
    pub markdown: String,
    pub html: String,
    pub text: String,
    pub doctags: String,
    pub chunks_json: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// One ordered fragment of a document, carrying its embedding vector.
/// `idx` is the chunker's emission position and defines retrieval order.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub document_id: i64,
    pub idx: i64,
    pub text_chunk: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
}
