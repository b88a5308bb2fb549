use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunSweepParams {
    #[schemars(description = "Report what would expire without removing anything. Defaults to false.")]
    pub dry_run: Option<bool>,
}
