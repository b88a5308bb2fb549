pub mod cache;
pub mod classify;
pub mod consolidate_session;
pub mod forget_fact;
pub mod learn_fact;
pub mod memory_insights;
pub mod record_turn;
pub mod run_sweep;
pub mod search_facts;
pub mod validate_fact;

use cache::{CacheGetParams, CacheInvalidateParams, CachePutParams};
use classify::ClassifyParams;
use consolidate_session::ConsolidateSessionParams;
use forget_fact::ForgetFactParams;
use learn_fact::LearnFactParams;
use memory_insights::MemoryInsightsParams;
use record_turn::RecordTurnParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use run_sweep::RunSweepParams;
use search_facts::SearchFactsParams;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use validate_fact::ValidateFactParams;

use crate::engine::MemoryEngine;
use crate::error::MemoryError;
use crate::memory::now_ts;
use crate::memory::search::SearchRequest;
use crate::memory::store::NewFact;
use crate::memory::types::{Category, ConversationTurn, FactSource, Role};
use crate::memory::validation::Observation;

const DEFAULT_USER: &str = "default";

/// The Strata MCP tool handler. Every tool delegates to the shared
/// [`MemoryEngine`].
#[derive(Clone)]
pub struct StrataTools {
    tool_router: ToolRouter<Self>,
    engine: MemoryEngine,
}

fn tool_error(err: MemoryError) -> String {
    format!("{err} (status {})", err.http_status())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

fn parse_category(raw: Option<&str>) -> Result<Option<Category>, String> {
    raw.map(|c| c.parse::<Category>().map_err(tool_error)).transpose()
}

#[tool_router]
impl StrataTools {
    pub fn new(engine: MemoryEngine) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    /// Store a fact in long-term memory, merging it into a near-duplicate if one exists.
    #[tool(description = "Store a fact in long-term memory. Near-duplicates of an existing fact in the same category are merged into it and boost its confidence instead of creating a new fact.")]
    async fn learn_fact(
        &self,
        Parameters(params): Parameters<LearnFactParams>,
    ) -> Result<String, String> {
        tracing::info!(text_len = params.text.len(), "learn_fact called");

        let mut fact = NewFact::new(params.text)
            .confidence(params.confidence.unwrap_or(1.0))
            .tags(params.tags.unwrap_or_default());
        if let Some(category) = parse_category(params.category.as_deref())? {
            fact = fact.category(category);
        }
        if let Some(source) = params.source.as_deref() {
            fact = fact.source(source.parse::<FactSource>().map_err(tool_error)?);
        }

        let result = self.engine.learn_fact(fact).await.map_err(tool_error)?;
        to_json(&result)
    }

    /// Ranked search over live facts.
    #[tool(description = "Search long-term facts. Results are ranked by keyword overlap x confidence x recency.")]
    async fn search_facts(
        &self,
        Parameters(params): Parameters<SearchFactsParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, "search_facts called");

        let request = SearchRequest {
            query: params.query,
            top_k: params.top_k,
            category: parse_category(params.category.as_deref())?,
        };
        let response = self.engine.search(request).await.map_err(tool_error)?;
        to_json(&response)
    }

    #[tool(description = "Promote the important turns of a conversation into long-term facts. Pass the turns explicitly, or omit them to consolidate the session's buffered turns that have not been consolidated yet.")]
    async fn consolidate_session(
        &self,
        Parameters(params): Parameters<ConsolidateSessionParams>,
    ) -> Result<String, String> {
        let user_id = params.user_id.unwrap_or_else(|| DEFAULT_USER.to_string());
        tracing::info!(session = %params.session_id, user = %user_id, "consolidate_session called");

        let result = match params.turns {
            Some(turns) => {
                let now = now_ts();
                let turns = turns
                    .into_iter()
                    .map(|t| {
                        Ok(ConversationTurn {
                            user_id: user_id.clone(),
                            session_id: params.session_id.clone(),
                            role: t.role.parse::<Role>().map_err(tool_error)?,
                            content: t.content,
                            timestamp: t.timestamp.unwrap_or(now),
                        })
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                self.engine.consolidate_session(turns).await
            }
            None => {
                self.engine
                    .consolidate_pending(&user_id, &params.session_id)
                    .await
            }
        }
        .map_err(tool_error)?;
        to_json(&result)
    }

    #[tool(description = "Append a conversation turn to short-term memory. Consolidation runs automatically every few turns.")]
    async fn record_turn(
        &self,
        Parameters(params): Parameters<RecordTurnParams>,
    ) -> Result<String, String> {
        let turn = ConversationTurn {
            user_id: params.user_id.unwrap_or_else(|| DEFAULT_USER.to_string()),
            session_id: params.session_id,
            role: params.role.parse::<Role>().map_err(tool_error)?,
            content: params.content,
            timestamp: now_ts(),
        };
        tracing::debug!(session = %turn.session_id, "record_turn called");

        let result = self.engine.record_turn(turn).await.map_err(tool_error)?;
        to_json(&result)
    }

    #[tool(description = "Run one TTL sweep now: remove expired cache entries and expire stale non-manual facts. Use dry_run to only report.")]
    async fn run_sweep(
        &self,
        Parameters(params): Parameters<RunSweepParams>,
    ) -> Result<String, String> {
        let dry_run = params.dry_run.unwrap_or(false);
        tracing::info!(dry_run, "run_sweep called");

        let report = self
            .engine
            .run_sweep(dry_run, Arc::new(AtomicBool::new(false)))
            .await
            .map_err(tool_error)?;
        to_json(&report)
    }

    #[tool(description = "Report on every memory layer: short-term occupancy, long-term counts by category, cache, consolidation rate and dedup savings.")]
    async fn memory_insights(
        &self,
        Parameters(_params): Parameters<MemoryInsightsParams>,
    ) -> Result<String, String> {
        tracing::info!("memory_insights called");
        let report = self.engine.insights().await.map_err(tool_error)?;
        to_json(&report)
    }

    #[tool(description = "Classify text into a TTL category and report that category's TTL in seconds.")]
    async fn classify(
        &self,
        Parameters(params): Parameters<ClassifyParams>,
    ) -> Result<String, String> {
        to_json(&self.engine.classify(&params.text))
    }

    #[tool(description = "Forget a fact by id. Soft delete by default; hard_delete removes it permanently.")]
    async fn forget_fact(
        &self,
        Parameters(params): Parameters<ForgetFactParams>,
    ) -> Result<String, String> {
        tracing::info!(id = %params.id, "forget_fact called");
        let result = self
            .engine
            .forget(&params.id, params.reason, params.hard_delete.unwrap_or(false))
            .await
            .map_err(tool_error)?;
        to_json(&serde_json::json!({
            "id": result.id,
            "deleted": true,
            "hard_deleted": result.hard_deleted,
            "already_deleted": result.already_deleted,
        }))
    }

    #[tool(description = "Cross-check a stored fact against statements from several sources. A validated fact gets a confidence boost.")]
    async fn validate_fact(
        &self,
        Parameters(params): Parameters<ValidateFactParams>,
    ) -> Result<String, String> {
        tracing::info!(id = %params.id, observations = params.observations.len(), "validate_fact called");
        let observations = params
            .observations
            .into_iter()
            .map(|o| Observation::new(o.text, o.url))
            .collect();
        let result = self
            .engine
            .validate_fact(&params.id, observations)
            .await
            .map_err(tool_error)?;
        to_json(&result)
    }

    #[tool(description = "Cache a value. Its lifetime is the TTL of its category.")]
    async fn cache_put(
        &self,
        Parameters(params): Parameters<CachePutParams>,
    ) -> Result<String, String> {
        let category = parse_category(params.category.as_deref())?;
        let entry = self
            .engine
            .cache_put(&params.key, &params.value, category)
            .await
            .map_err(tool_error)?;
        to_json(&entry)
    }

    #[tool(description = "Read a cached value. Expired entries read as a miss.")]
    async fn cache_get(
        &self,
        Parameters(params): Parameters<CacheGetParams>,
    ) -> Result<String, String> {
        match self.engine.cache_get(&params.key).await.map_err(tool_error)? {
            Some(entry) => to_json(&serde_json::json!({ "hit": true, "entry": entry })),
            None => to_json(&serde_json::json!({ "hit": false, "key": params.key })),
        }
    }

    #[tool(description = "Drop a cached value before its TTL expires.")]
    async fn cache_invalidate(
        &self,
        Parameters(params): Parameters<CacheInvalidateParams>,
    ) -> Result<String, String> {
        let removed = self.engine.cache_invalidate(&params.key).await.map_err(tool_error)?;
        to_json(&serde_json::json!({ "key": params.key, "removed": removed }))
    }
}

#[tool_handler]
impl ServerHandler for StrataTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Strata is a tiered fact memory. Use learn_fact to store facts, search_facts \
                 to recall them, record_turn to feed conversation turns, and cache_put / \
                 cache_get / cache_invalidate for short-lived values that expire by category."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
