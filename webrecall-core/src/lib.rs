#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

//! # webrecall core
//!
//! Core pipeline for the webrecall crawl-backed semantic memory: every
//! crawled page is cleaned, chunked, embedded, and stored next to a vector
//! index so it can be recalled by meaning later.
//!
//! ## Module organization
//!
//! - [`engine`]: the process-wide facade front ends call into
//! - [`ingest`]: validate → fetch → clean → chunk → embed → store
//! - [`search`]: vector search with tag filtering and URL dedup
//! - [`crawler`] / [`batch`]: deep crawl and concurrent recrawl drivers
//! - [`validate`] / [`blocklist`]: the input gate in front of every write
//! - [`clean`] / [`chunk`]: the text transformations
//! - [`embed`]: embedding providers
//! - [`fetch`]: the external crawl service client
//! - [`storage`]: the backend trait implemented by the storage crate

pub mod batch;
pub mod blocklist;
pub mod chunk;
pub mod clean;
pub mod config;
pub mod constants;
pub mod crawler;
pub mod embed;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod retry;
pub mod search;
pub mod storage;
pub mod types;
pub mod validate;

pub use config::RuntimeConfig;
pub use engine::RecallEngine;
pub use error::{Error, FetchKind, Result};
pub use types::{
    BlockPattern, Chunk, ChunkHit, ContentSummary, DomainCount, FetchedPage, IngestReport,
    KgStatus, RetentionPolicy, SearchHit, StoreOutcome, StoreStats, StoredDocument,
    TargetSearchResult,
};
