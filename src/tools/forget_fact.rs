//! MCP `forget_fact` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ForgetFactParams {
    #[schemars(description = "Id of the fact to forget")]
    pub id: String,

    #[schemars(description = "Why the fact is being forgotten, kept in the audit log")]
    pub reason: Option<String>,

    /// Soft delete unless set; a soft-deleted fact stays inspectable.
    #[schemars(description = "Physically remove the fact instead of soft-deleting it. Defaults to false.")]
    pub hard_delete: Option<bool>,
}
