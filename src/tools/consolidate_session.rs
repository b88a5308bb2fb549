//! MCP `consolidate_session` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidateSessionParams {
    #[schemars(description = "Session the turns belong to")]
    pub session_id: String,

    #[schemars(description = "User the session belongs to. Defaults to 'default'.")]
    pub user_id: Option<String>,

    /// Turns in chronological order. When empty, the session's buffered
    /// short-term turns are drained and consolidated instead.
    #[schemars(
        description = "Conversation turns in chronological order. When omitted, the session's buffered turns are consolidated."
    )]
    pub turns: Option<Vec<TurnParams>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TurnParams {
    #[schemars(description = "'user' or 'assistant'")]
    pub role: String,

    #[schemars(description = "Message text")]
    pub content: String,

    #[schemars(description = "Epoch seconds. Defaults to now.")]
    pub timestamp: Option<i64>,
}
