//! Conversion, chunking, and embedding pipeline.
//!
//! Consumes processing-queue entries (or ad-hoc URL/file sources),
//! converts them into structured documents, persists the document record
//! with its export projections, then chunks, contextualizes, embeds, and
//! persists the ordered chunk rows. A failed chunk records an error and
//! does not abort the document; the queue entry is marked processed as
//! long as the document itself was created.

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

use crate::chunk::{Chunker, DocChunk};
use crate::config::Config;
use crate::convert::{ConvertedDocument, DocumentConverter, StandardConverter};
use crate::db;
use crate::embedding::{self, EmbeddingModel};
use crate::files;
use crate::queue;

const FETCH_TIMEOUT_SECS: u64 = 30;

pub struct Pipeline<'a> {
    config: &'a Config,
    converter: Box<dyn DocumentConverter>,
    chunker: Chunker,
    embedder: Box<dyn EmbeddingModel>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            converter: Box::new(StandardConverter),
            chunker: Chunker::new(config.chunking.max_tokens),
            embedder: embedding::create_model(&config.embedding)?,
        })
    }

    /// Build a pipeline with explicit collaborators.
    pub fn with_parts(
        config: &'a Config,
        converter: Box<dyn DocumentConverter>,
        embedder: Box<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            config,
            converter,
            chunker: Chunker::new(config.chunking.max_tokens),
            embedder,
        }
    }

    /// Convert an ad-hoc source (a URL or a markdown file path) into a
    /// document with chunks. Conversion failures are recorded on the
    /// input record (when given) and yield `None`.
    pub async fn convert_source(
        &self,
        pool: &SqlitePool,
        source: &str,
        input_id: Option<i64>,
    ) -> Result<Option<i64>> {
        let (doc, source_type) = if source.starts_with("http://") || source.starts_with("https://")
        {
            info!(source, "converting webpage");
            match self.fetch_and_convert(source).await {
                Ok(doc) => (doc, "web"),
                Err(e) => {
                    return self.conversion_failed(pool, source, input_id, e).await;
                }
            }
        } else {
            info!(source, "converting file");
            let converted = std::fs::read_to_string(source)
                .map_err(|e| anyhow!("failed to read {}: {}", source, e))
                .and_then(|text| self.converter.convert_markdown(source, &text));
            match converted {
                Ok(doc) => (doc, "md_file"),
                Err(e) => {
                    return self.conversion_failed(pool, source, input_id, e).await;
                }
            }
        };

        let doc_id = self
            .store_document(pool, source, source_type, &doc, input_id)
            .await?;
        Ok(Some(doc_id))
    }

    /// Process one file record: convert its rendered markdown, failing
    /// fast when the markdown is missing or the file exceeds the maximum
    /// processing size. Resolves the associated queue entry.
    pub async fn process_file_record(
        &self,
        pool: &SqlitePool,
        file_id: &str,
        input_id: Option<i64>,
    ) -> Result<i64> {
        let record = files::get_by_id(pool, file_id)
            .await?
            .ok_or_else(|| anyhow!("file record not found: {}", file_id))?;

        let markdown = record
            .markdown
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| anyhow!("no markdown content for file {}", file_id))?;

        if record.size > self.config.storage.max_processing_size_bytes as i64 {
            bail!(
                "file {} exceeds maximum processing size ({} > {} bytes)",
                file_id,
                record.size,
                self.config.storage.max_processing_size_bytes
            );
        }

        let input_id = match input_id {
            Some(id) => Some(id),
            None => queue::by_file_id(pool, file_id).await?.map(|i| i.id),
        };

        let doc = self.converter.convert_markdown(&record.name, markdown)?;
        self.store_document(pool, &record.uri, "file", &doc, input_id)
            .await
    }

    /// Retry sweep: attempt every unprocessed queue entry. One entry's
    /// failure never halts the sweep.
    pub async fn process_pending(&self, pool: &SqlitePool) -> Result<(u64, u64)> {
        let pending = queue::unprocessed(pool).await?;
        let total = pending.len();

        if total == 0 {
            return Ok((0, 0));
        }

        let mut processed = 0u64;
        let mut errored = 0u64;

        for (i, input) in pending.iter().enumerate() {
            info!("processing input {}/{} (id {})", i + 1, total, input.id);

            let Some(file_id) = input.input_file_id.as_deref() else {
                queue::add_error(pool, input.id, "input record has no file reference").await?;
                errored += 1;
                continue;
            };

            match self.process_file_record(pool, file_id, Some(input.id)).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    warn!(input = input.id, "pipeline failed: {e:#}");
                    queue::add_error(pool, input.id, &format!("{e:#}")).await?;
                    errored += 1;
                }
            }
        }

        Ok((processed, errored))
    }

    async fn fetch_and_convert(&self, url: &str) -> Result<ConvertedDocument> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("fetch failed for {}: HTTP {}", url, status);
        }
        let body = response.text().await?;
        self.converter.convert_html(url, &body)
    }

    async fn conversion_failed(
        &self,
        pool: &SqlitePool,
        source: &str,
        input_id: Option<i64>,
        err: anyhow::Error,
    ) -> Result<Option<i64>> {
        warn!(source, "conversion failed: {err:#}");
        if let Some(id) = input_id {
            queue::add_error(pool, id, &format!("failed to convert source {}: {err:#}", source))
                .await?;
        }
        Ok(None)
    }

    /// Persist the document record, then chunk, embed, and persist the
    /// ordered chunk rows; back-fill the serialized chunk list; resolve
    /// the queue entry.
    async fn store_document(
        &self,
        pool: &SqlitePool,
        source: &str,
        source_type: &str,
        doc: &ConvertedDocument,
        input_id: Option<i64>,
    ) -> Result<i64> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO documents (source, source_type, source_ref, doc_json, markdown, html, text, doctags, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(source)
        .bind(source_type)
        .bind(input_id)
        .bind(doc.to_json()?)
        .bind(doc.export_markdown())
        .bind(doc.export_html())
        .bind(doc.export_text())
        .bind(doc.export_doctags())
        .bind(now)
        .execute(pool)
        .await?;

        let doc_id = result.last_insert_rowid();

        // Contextualize every chunk up front; embedding failures below
        // must not change the serialized chunk list.
        let chunks: Vec<DocChunk> = self
            .chunker
            .chunk(doc)
            .into_iter()
            .map(|c| DocChunk {
                text: self.chunker.contextualize(&c),
                headings: c.headings,
            })
            .collect();

        info!("processing {} chunks for document {}", chunks.len(), doc_id);
        let mut errors: Vec<String> = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            match embedding::embed_one(self.embedder.as_ref(), &chunk.text).await {
                Ok(vector) => {
                    sqlx::query(
                        "INSERT INTO chunks (document_id, idx, text_chunk, embedding, created_at) VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(doc_id)
                    .bind(i as i64)
                    .bind(&chunk.text)
                    .bind(embedding::vec_to_blob(&vector))
                    .bind(Utc::now().timestamp())
                    .execute(pool)
                    .await?;
                }
                Err(e) => {
                    errors.push(format!("error processing chunk {}: {e:#}", i));
                }
            }
        }

        sqlx::query("UPDATE documents SET chunks_json = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&chunks)?)
            .bind(Utc::now().timestamp())
            .bind(doc_id)
            .execute(pool)
            .await?;

        if !errors.is_empty() {
            warn!(
                "document {}: {} of {} chunks failed",
                doc_id,
                errors.len(),
                chunks.len()
            );
        }

        // Partial chunk loss is a degraded success: the document exists,
        // so the input is processed, with the errors on record.
        if let Some(id) = input_id {
            for error in &errors {
                queue::add_error(pool, id, error).await?;
            }
            queue::mark_processed(pool, id, doc_id).await?;
        }

        Ok(doc_id)
    }
}

/// CLI entry point: convert one ad-hoc source.
pub async fn run_convert(config: &Config, source: &str) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let pool = db::connect(config).await?;
    let result = pipeline.convert_source(&pool, source, None).await?;
    pool.close().await;

    match result {
        Some(doc_id) => println!("Successfully processed source. Document ID: {}", doc_id),
        None => bail!("Failed to process source"),
    }

    Ok(())
}

/// CLI entry point: process one file record by id.
pub async fn run_process_file(config: &Config, file_id: &str) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let pool = db::connect(config).await?;
    let result = pipeline.process_file_record(&pool, file_id, None).await;
    pool.close().await;

    let doc_id = result?;
    println!("Successfully processed file. Document ID: {}", doc_id);
    Ok(())
}

/// CLI entry point: the batch retry sweep over unprocessed inputs.
pub async fn run_process_pending(config: &Config) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let pool = db::connect(config).await?;
    let (processed, errored) = pipeline.process_pending(&pool).await?;
    pool.close().await;

    println!("doc process-pending");
    println!("  processed: {}", processed);
    println!("  errors: {}", errored);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, StorageConfig};
    use crate::migrate;
    use crate::models::InputStatus;
    use async_trait::async_trait;
    use sqlx::Row;
    use tempfile::TempDir;

    struct FakeEmbedder {
        dims: usize,
        fail_on: Option<usize>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl FakeEmbedder {
        fn new(dims: usize, fail_on: Option<usize>) -> Self {
            Self {
                dims,
                fail_on,
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingModel for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail_on == Some(call) {
                bail!("simulated embedding failure");
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.dims];
                    v[0] = t.len() as f32;
                    v
                })
                .collect())
        }
    }

    async fn setup(tmp: &TempDir) -> (Config, SqlitePool) {
        let config = Config {
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
        };
        migrate::run_migrations(&config).await.unwrap();
        let pool = db::connect(&config).await.unwrap();
        (config, pool)
    }

    fn markdown_source(tmp: &TempDir, name: &str, text: &str) -> String {
        let path = tmp.path().join(name);
        std::fs::write(&path, text).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn chunk_indices_are_contiguous_and_ordered() {
        let tmp = TempDir::new().unwrap();
        let (mut config, _) = setup(&tmp).await;
        config.chunking.max_tokens = 5; // force several chunks
        let pool = db::connect(&config).await.unwrap();

        let pipeline = Pipeline::with_parts(
            &config,
            Box::new(StandardConverter),
            Box::new(FakeEmbedder::new(4, None)),
        );

        let source = markdown_source(
            &tmp,
            "doc.md",
            "First paragraph of text.\n\nSecond paragraph of text.\n\nThird paragraph of text.",
        );
        let doc_id = pipeline
            .convert_source(&pool, &source, None)
            .await
            .unwrap()
            .unwrap();

        let rows = sqlx::query("SELECT idx, embedding FROM chunks WHERE document_id = ? ORDER BY idx")
            .bind(doc_id)
            .fetch_all(&pool)
            .await
            .unwrap();

        assert!(rows.len() > 1);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.get::<i64, _>("idx"), i as i64);
            let blob: Vec<u8> = row.get("embedding");
            assert_eq!(embedding::blob_to_vec(&blob).len(), 4);
        }
    }

    #[tokio::test]
    async fn failed_chunk_does_not_abort_document() {
        let tmp = TempDir::new().unwrap();
        let (mut config, _) = setup(&tmp).await;
        config.chunking.max_tokens = 5;
        let pool = db::connect(&config).await.unwrap();

        // Second embedding call fails
        let pipeline = Pipeline::with_parts(
            &config,
            Box::new(StandardConverter),
            Box::new(FakeEmbedder::new(4, Some(1))),
        );

        let source = markdown_source(
            &tmp,
            "doc.md",
            "First paragraph of text.\n\nSecond paragraph of text.\n\nThird paragraph of text.",
        );
        let input_id = queue::create_input(&pool, "md_file", None).await.unwrap();
        let doc_id = pipeline
            .convert_source(&pool, &source, Some(input_id))
            .await
            .unwrap()
            .unwrap();

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        let total: i64 = {
            let json: String =
                sqlx::query_scalar("SELECT chunks_json FROM documents WHERE id = ?")
                    .bind(doc_id)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            serde_json::from_str::<Vec<DocChunk>>(&json).unwrap().len() as i64
        };
        assert_eq!(chunk_count, total - 1);

        let input = queue::get_by_id(&pool, input_id).await.unwrap().unwrap();
        assert!(input.processed);
        assert_eq!(input.status, InputStatus::Processed);
        assert!(input.errors.unwrap().contains("chunk 1"));
    }

    #[tokio::test]
    async fn conversion_failure_leaves_input_retryable() {
        let tmp = TempDir::new().unwrap();
        let (config, pool) = setup(&tmp).await;

        let pipeline = Pipeline::with_parts(
            &config,
            Box::new(StandardConverter),
            Box::new(FakeEmbedder::new(4, None)),
        );

        let input_id = queue::create_input(&pool, "md_file", None).await.unwrap();
        let result = pipeline
            .convert_source(&pool, "/nonexistent/missing.md", Some(input_id))
            .await
            .unwrap();
        assert!(result.is_none());

        let doc_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(doc_count, 0);

        let input = queue::get_by_id(&pool, input_id).await.unwrap().unwrap();
        assert!(!input.processed);
        assert_eq!(input.status, InputStatus::Error);
        assert!(input.errors.is_some());

        // Still visible as retryable via the status query
        let errored = queue::by_status(&pool, InputStatus::Error).await.unwrap();
        assert_eq!(errored.len(), 1);
        assert_eq!(errored[0].id, input_id);
    }
}
