//! Tiered fact memory for assistants, served over MCP.
//!
//! Strata keeps three layers of memory:
//!
//! | Layer | Storage | Lifetime |
//! |-------|---------|----------|
//! | **Short-term** | per-session ring buffer in process | until evicted or consolidated |
//! | **Long-term facts** | SQLite + FTS5 | until forgotten, or by category TTL for non-manual facts |
//! | **Cache** | SQLite | category TTL (crypto 5m ... history 30d) |
//!
//! # Architecture
//!
//! - **Writes** go through one dedup-gated path: a new fact whose normalized
//!   text is at least 85% similar (LCS ratio) to a live fact of the same
//!   category is merged into it instead of inserted.
//! - **Search** ranks FTS5 candidates by `keyword overlap × confidence × recency`
//!   with a 180-day half-life.
//! - **Consolidation** scores conversation turns by recency, content, length and
//!   position and promotes the important ones into long-term facts.
//! - **Sweeps** run on a background schedule and expire cache entries and stale
//!   facts by category TTL.
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`memory`]: the memory layers themselves
//! - [`engine`]: async facade with deadlines over the memory layers
//! - [`scheduler`]: the periodic background sweep
//! - [`tools`] / [`server`]: the MCP surface

pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod memory;
pub mod scheduler;
pub mod server;
pub mod tools;
