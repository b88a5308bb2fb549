//! MCP `search_facts` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_facts` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchFactsParams {
    /// Keywords or a natural language question.
    #[schemars(description = "Keywords or a natural language question")]
    pub query: String,

    /// Maximum number of results. Defaults to `retrieval.default_top_k`.
    #[schemars(description = "Maximum number of results (at least 1). Defaults to 5.")]
    pub top_k: Option<usize>,

    #[schemars(description = "Only return facts in this category")]
    pub category: Option<String>,
}
