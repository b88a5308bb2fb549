use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ClassifyParams {
    #[schemars(description = "Text to classify into a TTL category")]
    pub text: String,
}
