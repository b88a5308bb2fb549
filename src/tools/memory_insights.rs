//! MCP `memory_insights` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The insights report takes no arguments.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryInsightsParams {}
