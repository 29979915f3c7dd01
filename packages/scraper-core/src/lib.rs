//! Crawl-and-extract pipeline with idempotent checkpointing.
//!
//! Given a list of storefront domains and a list of product identifiers,
//! drives the full (domain, product_id) cross-product through a bounded
//! worker pool: fetch with retry/backoff and identity rotation, extract the
//! embedded product-data JSON, persist one file per pair, and track per-item
//! completion in a SQLite ledger so an interrupted multi-hour run can resume
//! without duplicate work.

pub mod checkpoint;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod inputs;
pub mod orchestrator;
pub mod output;
pub mod proxy;
pub mod retry;
pub mod types;

pub use checkpoint::{CheckpointRecord, CheckpointStats, CheckpointStore, SqliteCheckpoints};
pub use config::ScraperConfig;
pub use extract::ProductExtractor;
pub use fetch::{FetchError, FetchedPage, PageFetcher, ProductClient, ReqwestFetcher};
pub use orchestrator::{Orchestrator, ScrapeReport};
pub use output::OutputWriter;
pub use proxy::ProxyEndpoint;
pub use retry::{RetryDecision, RetryPolicy};
pub use types::{CheckpointStatus, FetchOutcome, ProductTask};
