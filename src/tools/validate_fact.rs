//! MCP `validate_fact` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ValidateFactParams {
    #[schemars(description = "Id of the stored fact to validate")]
    pub id: String,

    #[schemars(description = "Observed statements and the URL each was found at")]
    pub observations: Vec<ObservationParams>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ObservationParams {
    #[schemars(description = "Statement as found in the source")]
    pub text: String,

    #[schemars(description = "URL of the source")]
    pub url: String,
}
