use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root of the mirrored markdown tree.
    pub vault_root: PathBuf,
    /// Raw byte content above this size is not stored in the database.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Files above this size are rejected by the conversion pipeline.
    #[serde(default = "default_max_processing_size")]
    pub max_processing_size_bytes: u64,
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}
fn default_max_processing_size() -> u64 {
    3 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Path segments that exclude a file wherever they appear.
    #[serde(default = "default_ignore_parts")]
    pub ignore_parts: Vec<String>,
    /// Suffixes or exact filenames to exclude.
    #[serde(default = "default_ignore_extensions")]
    pub ignore_extensions: Vec<String>,
    /// Marker directory identifying a note vault root.
    #[serde(default = "default_vault_marker")]
    pub vault_marker: String,
    /// Note file suffixes collected by vault scans.
    #[serde(default = "default_vault_extensions")]
    pub vault_extensions: Vec<String>,
    /// Additional exclude patterns applied to relative paths.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignore_parts: default_ignore_parts(),
            ignore_extensions: default_ignore_extensions(),
            vault_marker: default_vault_marker(),
            vault_extensions: default_vault_extensions(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_ignore_parts() -> Vec<String> {
    [
        ".git",
        ".hg",
        ".svn",
        ".venv",
        "venv",
        "node_modules",
        "__pycache__",
        ".mypy_cache",
        ".pytest_cache",
        "target",
        ".idea",
        ".vscode",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignore_extensions() -> Vec<String> {
    [
        ".pyc", ".pyo", ".so", ".dll", ".dylib", ".exe", ".bin", ".o", ".a", ".class", ".png",
        ".jpg", ".jpeg", ".gif", ".ico", ".pdf", ".zip", ".gz", ".tar", ".7z", ".woff", ".woff2",
        ".ttf", ".DS_Store",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_vault_marker() -> String {
    ".obsidian".to_string()
}

fn default_vault_extensions() -> Vec<String> {
    vec![".md".to_string()]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IdentityConfig {
    /// Host label recorded on scans and file records. Defaults to the
    /// machine hostname.
    #[serde(default)]
    pub host: Option<String>,
    /// User label recorded on scans and file records. Defaults to $USER.
    #[serde(default)]
    pub user: Option<String>,
}

impl IdentityConfig {
    pub fn resolve_host(&self) -> String {
        if let Some(h) = &self.host {
            return h.clone();
        }
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn resolve_user(&self) -> String {
        if let Some(u) = &self.user {
            return u.clone();
        }
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    2048
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the ollama provider.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            ollama_url: default_ollama_url(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RenderConfig {
    /// Suffix → fence language overrides, consulted before the built-in
    /// table (e.g. `".m" = "objc"`).
    #[serde(default)]
    pub languages: BTreeMap<String, String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.storage.max_processing_size_bytes == 0 {
        anyhow::bail!("storage.max_processing_size_bytes must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}
