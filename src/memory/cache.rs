//! Key/value cache entries whose lifetime is derived from their category.
//!
//! Reads check expiry lazily, so an entry past its deadline is a miss even if
//! the sweep has not removed it yet.

use rusqlite::{params, Connection, OptionalExtension};

use super::ttl::{classify, TtlPolicy};
use super::types::{CacheEntry, Category};
use crate::error::{MemoryError, Result};

/// Insert or replace a cache entry. `category` defaults to the classifier's
/// verdict on `key` and `value` together.
pub fn cache_put(
    conn: &Connection,
    key: &str,
    value: &str,
    category: Option<Category>,
    policy: &TtlPolicy,
    now: i64,
) -> Result<CacheEntry> {
    if key.trim().is_empty() {
        return Err(MemoryError::Validation("cache key must not be empty".into()));
    }
    let category = category.unwrap_or_else(|| classify(&format!("{key} {value}")));
    let ttl = i64::try_from(policy.ttl_for(category)).unwrap_or(i64::MAX);
    let entry = CacheEntry {
        key: key.to_string(),
        value: value.to_string(),
        category,
        created_at: now,
        expires_at: now.saturating_add(ttl),
    };
    conn.execute(
        "INSERT OR REPLACE INTO cache_entries (key, value, category, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.key,
            entry.value,
            entry.category.as_str(),
            entry.created_at,
            entry.expires_at
        ],
    )?;
    tracing::debug!(key, category = %category, ttl, "cache entry stored");
    Ok(entry)
}

/// Read a live entry. Expired entries read as `None`.
pub fn cache_get(conn: &Connection, key: &str, now: i64) -> Result<Option<CacheEntry>> {
    let entry = load_entry(conn, key)?;
    Ok(entry.filter(|e| !e.is_expired(now)))
}

pub fn cache_remove(conn: &Connection, key: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
    Ok(removed > 0)
}

pub(crate) fn load_entry(conn: &Connection, key: &str) -> Result<Option<CacheEntry>> {
    let row: Option<(String, String, String, i64, i64)> = conn
        .query_row(
            "SELECT key, value, category, created_at, expires_at FROM cache_entries WHERE key = ?1",
            params![key],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;
    Ok(row.map(|(key, value, category, created_at, expires_at)| CacheEntry {
        key,
        value,
        category: category.parse().unwrap_or(Category::Default),
        created_at,
        expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn put_infers_category_and_expiry() {
        let conn = db::open_memory_database().unwrap();
        let entry = cache_put(&conn, "btc", "Bitcoin at 70k", None, &TtlPolicy::default(), 1_000).unwrap();
        assert_eq!(entry.category, Category::Crypto);
        assert_eq!(entry.expires_at, 1_300);
    }

    #[test]
    fn get_is_lazy_about_expiry() {
        let conn = db::open_memory_database().unwrap();
        let policy = TtlPolicy::default();
        cache_put(&conn, "q", "Rain all week", Some(Category::Weather), &policy, 0).unwrap();

        assert!(cache_get(&conn, "q", 1_800).unwrap().is_some());
        assert!(cache_get(&conn, "q", 1_801).unwrap().is_none());
        // still physically present until swept
        assert!(load_entry(&conn, "q").unwrap().is_some());
    }

    #[test]
    fn put_replaces_existing_key() {
        let conn = db::open_memory_database().unwrap();
        let policy = TtlPolicy::default();
        cache_put(&conn, "k", "one", Some(Category::News), &policy, 0).unwrap();
        cache_put(&conn, "k", "two", Some(Category::News), &policy, 10).unwrap();
        let entry = cache_get(&conn, "k", 20).unwrap().unwrap();
        assert_eq!(entry.value, "two");
        assert_eq!(entry.expires_at, 3_610);
        assert!(cache_remove(&conn, "k").unwrap());
        assert!(!cache_remove(&conn, "k").unwrap());
    }

    #[test]
    fn empty_key_is_rejected() {
        let conn = db::open_memory_database().unwrap();
        let err = cache_put(&conn, " ", "v", None, &TtlPolicy::default(), 0).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }
}
