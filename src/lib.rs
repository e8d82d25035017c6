//! # fileweave
//!
//! A content-addressed file versioning and document indexing pipeline.
//!
//! fileweave scans filesystem roots (git repositories and note vaults),
//! deduplicates files by content hash into versioned records, renders a
//! canonical markdown representation into a mirrored vault tree, and
//! feeds that representation through a conversion → chunk → embed
//! pipeline tracked by a durable processing queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐   ┌─────────────┐
//! │ Scanner  │──▶│ Fingerprint │──▶│ Markdown │──▶│  Pipeline    │
//! │ repo/    │   │ + Version   │   │ Renderer │   │ Convert →    │
//! │ vault    │   │ Resolver    │   │ (vault)  │   │ Chunk+Embed │
//! └──────────┘   └──────┬──────┘   └────┬─────┘   └──────┬──────┘
//!                       │               │                │
//!                       ▼               ▼                ▼
//!                 ┌──────────────────────────────────────────┐
//!                 │                 SQLite                   │
//!                 │  files / inputs / documents / chunks     │
//!                 └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fw init                        # create database
//! fw scan repos ~/work           # discover git repositories
//! fw scan vaults ~/notes         # discover note vaults
//! fw process all                 # ingest + version + render + enqueue
//! fw doc process-pending         # convert, chunk, embed the queue
//! fw status                      # what's indexed
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scanner`] | Repo/vault/list scanning with ignore rules |
//! | [`files`] | Fingerprints, version lineage, file record store |
//! | [`render`] | Canonical markdown rendering into the vault tree |
//! | [`queue`] | Processing queue over input records |
//! | [`convert`] | Document conversion and export projections |
//! | [`chunk`] | Block-aware chunking with heading context |
//! | [`embedding`] | Embedding model abstraction |
//! | [`pipeline`] | Convert → chunk → embed orchestration |
//! | [`docs`] | Document retrieval |
//! | [`ingest`] | File processing sweep |
//! | [`stats`] | Status reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod convert;
pub mod db;
pub mod docs;
pub mod embedding;
pub mod files;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod render;
pub mod scanner;
pub mod stats;
