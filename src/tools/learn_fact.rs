use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LearnFactParams {
    #[schemars(description = "The fact to remember, as a natural language sentence")]
    pub text: String,

    #[schemars(
        description = "Category: news, weather, stock, crypto, sports, science, history, programming, math, geography, default. Inferred from the text when omitted."
    )]
    pub category: Option<String>,

    #[schemars(description = "Initial confidence 0.0-1.0. Defaults to 1.0.")]
    pub confidence: Option<f64>,

    #[schemars(
        description = "Provenance: 'manual' (curated, never expires), 'auto' or 'consolidated'. Defaults to 'manual'."
    )]
    pub source: Option<String>,

    #[schemars(description = "Free-form labels")]
    pub tags: Option<Vec<String>>,
}
