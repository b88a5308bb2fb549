//! MCP `cache_put`, `cache_get` and `cache_invalidate` tool parameter definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CachePutParams {
    #[schemars(description = "Cache key")]
    pub key: String,

    #[schemars(description = "Value to cache")]
    pub value: String,

    /// Decides the entry's TTL. Inferred from key and value when omitted.
    #[schemars(description = "Category deciding the TTL. Inferred from key and value when omitted.")]
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    #[schemars(description = "Cache key")]
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateParams {
    #[schemars(description = "Cache key to drop")]
    pub key: String,
}
