//! Core record types.
//!
//! [`Category`] is the closed set of topical categories that drive both fact
//! grouping for deduplication and cache TTLs. [`Fact`] mirrors the `facts`
//! table, [`ConversationTurn`] lives only in short-term memory, and
//! [`CacheEntry`] mirrors `cache_entries`.

use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Topical category of a fact or cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    News,
    Weather,
    Stock,
    Crypto,
    Sports,
    Science,
    History,
    Programming,
    Math,
    Geography,
    Default,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::News,
        Category::Weather,
        Category::Stock,
        Category::Crypto,
        Category::Sports,
        Category::Science,
        Category::History,
        Category::Programming,
        Category::Math,
        Category::Geography,
        Category::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Weather => "weather",
            Self::Stock => "stock",
            Self::Crypto => "crypto",
            Self::Sports => "sports",
            Self::Science => "science",
            Self::History => "history",
            Self::Programming => "programming",
            Self::Math => "math",
            Self::Geography => "geography",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MemoryError::Validation(format!("unknown category: {s}")))
    }
}

/// Where a fact came from. Manual facts are curated and never TTL-expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    Manual,
    Auto,
    Consolidated,
}

impl FactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Consolidated => "consolidated",
        }
    }
}

impl std::fmt::Display for FactSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FactSource {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            "consolidated" => Ok(Self::Consolidated),
            _ => Err(MemoryError::Validation(format!("unknown fact source: {s}"))),
        }
    }
}

/// A long-term fact, matching the `facts` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// Text as submitted, kept for display.
    pub text: String,
    /// Comparison form used by deduplication.
    pub normalized: String,
    pub category: Category,
    pub tags: Vec<String>,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    pub source: FactSource,
    /// Retrieval hits plus dedup merges.
    pub access_count: u32,
    /// Epoch seconds.
    pub created_at: i64,
    pub updated_at: i64,
    pub last_accessed_at: Option<i64>,
    pub deleted: bool,
    pub deleted_at: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::str::FromStr for Role {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(MemoryError::Validation(format!("unknown role: {s}"))),
        }
    }
}

/// One message in a conversation. Transient unless promoted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// Epoch seconds.
    pub timestamp: i64,
}

/// A cached value whose lifetime is set by its category's TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub category: Category,
    pub created_at: i64,
    pub expires_at: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}
