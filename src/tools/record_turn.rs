use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecordTurnParams {
    #[schemars(description = "Session the turn belongs to")]
    pub session_id: String,

    #[schemars(description = "User the session belongs to. Defaults to 'default'.")]
    pub user_id: Option<String>,

    #[schemars(description = "'user' or 'assistant'")]
    pub role: String,

    #[schemars(description = "Message text")]
    pub content: String,
}
