//! Tiered memory: short-term turn buffers, the long-term fact store, and the
//! category-TTL cache layer.

pub mod cache;
pub mod consolidation;
pub mod dedup;
pub mod forget;
pub mod insights;
pub mod search;
pub mod stm;
pub mod store;
pub mod sweep;
pub mod ttl;
pub mod types;
pub mod validation;

/// Current time as epoch seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
