//! # Changelog Indexer
//!
//! Incrementally mirrors rows from PostgreSQL changelog tables into a
//! full-text search index.
//!
//! Each *source* is one (tenant, table, field) triple registered as a
//! document in an Elasticsearch configuration index. On every run the
//! pipeline reads the changelog rows newer than the source's checkpoint,
//! extracts text from the changed field (plain text, JSON, XML, HTML, PDF,
//! Office documents, or sniffed binary content), splits it into chunks,
//! writes the chunks to the search index, and only then advances the
//! checkpoint.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  configs  ┌────────────┐  rows   ┌──────────────┐
//! │ Elasticsearch │──────────▶│  Pipeline  │◀────────│  PostgreSQL  │
//! │ (checkpoints) │◀──────────│            │         │  *_changelog │
//! └───────────────┘  advance  └─────┬──────┘         └──────────────┘
//!                                   │ classify → extract → chunk
//!                      ┌────────────┴───────────┐
//!                      ▼                        ▼
//!              ┌──────────────┐        ┌──────────────┐
//!              │ Search index │        │ Object store │
//!              │ (Azure)      │        │ (S3 / Blob)  │
//!              └──────────────┘        └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed stage errors |
//! | [`classify`] | Content type sniffing |
//! | [`extract`] | Extractor registry |
//! | [`structured`] | XML/JSON trees and path projection |
//! | [`chunk`] | Text chunking |
//! | [`checkpoint`] | Source configurations and checkpoints |
//! | [`db`] | PostgreSQL pool cache |
//! | [`poller`] | Changelog polling |
//! | [`process`] | Row to document conversion |
//! | [`storage`] | Staging of binary originals |
//! | [`indexer`] | Search index writes |
//! | [`pipeline`] | Per-run orchestration |

pub mod checkpoint;
pub mod chunk;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod ingest;
pub mod inspect;
pub mod models;
pub mod pipeline;
pub mod poller;
pub mod process;
pub mod sources;
pub mod storage;
pub mod structured;
