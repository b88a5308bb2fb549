//! Async facade over the memory layers.
//!
//! Every storage operation runs on tokio's blocking pool against the shared
//! `Arc<Mutex<Connection>>` and is bounded by a deadline. A deadline abandons
//! the wait, not the work: the blocking task runs to completion. Single-fact
//! operations are one transaction and commit whole or not at all.
//! `consolidate_session` and `import_facts` commit once per fact, so a timed
//! out or failed call may leave a prefix of its facts stored.

use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::StrataConfig;
use crate::db;
use crate::error::{MemoryError, Result};
use crate::memory::cache;
use crate::memory::consolidation::{self, ConsolidationResult, FactExtractor, TruncatingExtractor};
use crate::memory::forget::{self, ForgetResult, PurgeResult};
use crate::memory::insights::{self, InsightsReport};
use crate::memory::now_ts;
use crate::memory::search::{self, InspectResponse, SearchRequest, SearchResponse};
use crate::memory::stm::ShortTermMemory;
use crate::memory::store::{self, NewFact, StoreFactResult};
use crate::memory::sweep::{self, SweepOptions, SweepReport};
use crate::memory::ttl::{classify, TtlPolicy, TtlPolicyHandle};
use crate::memory::types::{CacheEntry, Category, ConversationTurn, Fact};
use crate::memory::validation::{validate_claim, Observation, ValidationResult};

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub category: Category,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordTurnResult {
    pub session_len: usize,
    pub evicted: usize,
    /// Present when this turn triggered a consolidation pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidated: Option<ConsolidationResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactValidation {
    pub fact_id: String,
    #[serde(flatten)]
    pub result: ValidationResult,
    /// Confidence of the stored fact after validation.
    pub fact_confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Facts whose id already existed or that matched a live duplicate.
    pub skipped: usize,
}

/// Shared handle to the whole engine. Cheap to clone.
#[derive(Clone)]
pub struct MemoryEngine {
    db: Arc<Mutex<Connection>>,
    config: Arc<StrataConfig>,
    ttl: TtlPolicyHandle,
    stm: Arc<ShortTermMemory>,
    extractor: Arc<dyn FactExtractor>,
    db_path: Option<PathBuf>,
    deadline: Duration,
}

impl MemoryEngine {
    /// Open (or create) the database named by the config.
    pub fn open(config: StrataConfig) -> anyhow::Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");
        Ok(Self::from_connection(conn, config, Some(db_path)))
    }

    /// Engine over a private in-memory database.
    pub fn in_memory(config: StrataConfig) -> anyhow::Result<Self> {
        let conn = db::open_memory_database()?;
        Ok(Self::from_connection(conn, config, None))
    }

    pub fn from_connection(conn: Connection, config: StrataConfig, db_path: Option<PathBuf>) -> Self {
        let ttl = TtlPolicyHandle::new(TtlPolicy::with_overrides(&config.scheduler.ttl));
        let stm = Arc::new(ShortTermMemory::from_config(&config.consolidation));
        let extractor: Arc<dyn FactExtractor> =
            Arc::new(TruncatingExtractor::new(config.consolidation.max_fact_chars));
        let deadline = Duration::from_millis(config.retrieval.request_timeout_ms.max(1));
        Self {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
            ttl,
            stm,
            extractor,
            db_path,
            deadline,
        }
    }

    /// Replace the consolidation extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn FactExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// A handle sharing all state but bounding operations by `deadline`.
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            deadline,
            ..self.clone()
        }
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn ttl_policy(&self) -> &TtlPolicyHandle {
        &self.ttl
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.stm
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.db)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // ── Execution ────────────────────────────────────────────────────────────

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.deadline, task).await {
            Ok(joined) => joined?,
            Err(_) => {
                tracing::warn!(deadline_ms = self.deadline.as_millis() as u64, "operation timed out");
                Err(MemoryError::Timeout(self.deadline))
            }
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        self.blocking(move || {
            let mut conn = db.lock()?;
            f(&mut conn)
        })
        .await
    }

    // ── Facts ────────────────────────────────────────────────────────────────

    /// Dedup-gated write. A lost race on the live uniqueness index is retried
    /// once and resolves to a merge.
    pub async fn learn_fact(&self, fact: NewFact) -> Result<StoreFactResult> {
        let dedup = self.config.dedup.clone();
        let result = self
            .with_conn(move |conn| store::insert_fact_retrying(conn, &fact, &dedup, now_ts()))
            .await?;
        tracing::info!(
            id = %result.id,
            deduped = result.deduped,
            category = %result.category,
            "fact stored"
        );
        Ok(result)
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let retrieval = self.config.retrieval.clone();
        self.with_conn(move |conn| search::search(conn, &request, &retrieval, now_ts()))
            .await
    }

    pub async fn get_fact(&self, id: &str) -> Result<Fact> {
        let id = id.to_string();
        self.with_conn(move |conn| store::get_fact(conn, &id)).await
    }

    pub async fn inspect(&self, id: &str) -> Result<InspectResponse> {
        let id = id.to_string();
        self.with_conn(move |conn| search::inspect_fact(conn, &id)).await
    }

    pub async fn forget(&self, id: &str, reason: Option<String>, hard_delete: bool) -> Result<ForgetResult> {
        let id = id.to_string();
        let result = self
            .with_conn(move |conn| forget::forget_fact(conn, &id, reason.as_deref(), hard_delete))
            .await?;
        tracing::info!(id = %result.id, hard = result.hard_deleted, "fact forgotten");
        Ok(result)
    }

    /// Physically remove facts soft-deleted before `before`.
    pub async fn purge(&self, before: i64, dry_run: bool) -> Result<PurgeResult> {
        self.with_conn(move |conn| forget::purge_deleted(conn, before, dry_run))
            .await
    }

    pub async fn list_facts(&self, include_deleted: bool) -> Result<Vec<Fact>> {
        self.with_conn(move |conn| store::list_facts(conn, include_deleted))
            .await
    }

    /// Restore exported facts, keeping their ids. Existing ids and live
    /// duplicates are skipped.
    pub async fn import_facts(&self, facts: Vec<Fact>) -> Result<ImportSummary> {
        let dedup = self.config.dedup.clone();
        self.with_conn(move |conn| {
            let mut summary = ImportSummary::default();
            for fact in &facts {
                if store::restore_fact(conn, fact, &dedup)? {
                    summary.imported += 1;
                } else {
                    summary.skipped += 1;
                }
            }
            Ok(summary)
        })
        .await
    }

    // ── Conversation ─────────────────────────────────────────────────────────

    /// Push a turn into short-term memory. Every `auto_consolidate_every`
    /// turns the session's unconsolidated window is promoted.
    pub async fn record_turn(&self, turn: ConversationTurn) -> Result<RecordTurnResult> {
        if turn.content.trim().is_empty() {
            return Err(MemoryError::Validation("turn content must not be empty".into()));
        }
        let user_id = turn.user_id.clone();
        let session_id = turn.session_id.clone();

        let outcome = self.stm.push(turn);
        let mut result = RecordTurnResult {
            session_len: outcome.session_len,
            evicted: outcome.evicted.len(),
            consolidated: None,
        };

        if outcome.consolidation_due {
            result.consolidated = Some(self.consolidate_pending(&user_id, &session_id).await?);
        }
        Ok(result)
    }

    /// Consolidate the session's turns that no pass has promoted yet. The
    /// turns stay buffered, and lose pending status only once the pass
    /// succeeds; after a failure the next trigger retries them.
    pub async fn consolidate_pending(&self, user_id: &str, session_id: &str) -> Result<ConsolidationResult> {
        let window = self.stm.pending_turns(user_id, session_id);
        let len = window.len();
        let result = self.consolidate_session(window).await?;
        self.stm.mark_consolidated(user_id, session_id, len);
        Ok(result)
    }

    /// Promote the important turns of `turns` into long-term facts.
    pub async fn consolidate_session(&self, turns: Vec<ConversationTurn>) -> Result<ConsolidationResult> {
        let config = self.config.consolidation.clone();
        let dedup = self.config.dedup.clone();
        let extractor = Arc::clone(&self.extractor);
        self.with_conn(move |conn| {
            let result = consolidation::consolidate(conn, &turns, extractor.as_ref(), &config, &dedup, now_ts())?;
            if let Some(session) = turns.first().map(|t| &t.session_id) {
                tracing::debug!(session = %session, created = result.facts_created, "session consolidated");
            }
            Ok(result)
        })
        .await
    }

    // ── TTL ──────────────────────────────────────────────────────────────────

    pub fn classify(&self, text: &str) -> Classification {
        let category = classify(text);
        Classification {
            category,
            ttl_seconds: self.ttl.snapshot().ttl_for(category),
        }
    }

    /// One sweep pass. Not bounded by the request deadline; `cancel` stops it
    /// between entries.
    pub async fn run_sweep(&self, dry_run: bool, cancel: Arc<AtomicBool>) -> Result<SweepReport> {
        let db = Arc::clone(&self.db);
        let policy = self.ttl.snapshot();
        let options = SweepOptions {
            dry_run,
            include_facts: self.config.scheduler.expire_facts,
        };
        let now = now_ts();
        let mut report =
            tokio::task::spawn_blocking(move || sweep::sweep(&db, &policy, now, options, &cancel)).await??;
        if !dry_run {
            report.stm_turns_pruned = self.stm.prune_expired(now);
        }
        Ok(report)
    }

    pub async fn cache_put(&self, key: &str, value: &str, category: Option<Category>) -> Result<CacheEntry> {
        let key = key.to_string();
        let value = value.to_string();
        let policy = self.ttl.snapshot();
        self.with_conn(move |conn| cache::cache_put(conn, &key, &value, category, &policy, now_ts()))
            .await
    }

    /// Live entry for `key`, or `None` on a miss or an expired entry.
    pub async fn cache_get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_string();
        self.with_conn(move |conn| cache::cache_get(conn, &key, now_ts()))
            .await
    }

    /// Drop `key` before its TTL runs out. Returns whether an entry existed.
    pub async fn cache_invalidate(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| cache::cache_remove(conn, &key))
            .await
    }

    // ── Reporting / validation ───────────────────────────────────────────────

    pub async fn insights(&self) -> Result<InsightsReport> {
        let occupancy = self.stm.occupancy();
        let db_path = self.db_path.clone();
        self.with_conn(move |conn| {
            Ok(insights::insights(conn, occupancy, db_path.as_deref(), now_ts()))
        })
        .await
    }

    /// Cross-check a stored fact against observations. A validated fact gets
    /// the validation boost through the merge path and a `validate` audit
    /// entry; an unvalidated one is left as is.
    pub async fn validate_fact(&self, id: &str, observations: Vec<Observation>) -> Result<FactValidation> {
        let id = id.to_string();
        let config = self.config.validation.clone();
        self.with_conn(move |conn| {
            let fact = store::get_fact(conn, &id)?;
            if fact.deleted {
                return Err(MemoryError::NotFound(format!("fact {id} is deleted")));
            }
            let result = validate_claim(&fact.text, &observations, &config);
            let mut fact_confidence = fact.confidence;

            if result.is_validated {
                let tx = conn.transaction()?;
                let merged = store::merge_fact(&tx, &id, config.confidence_boost)?;
                let details = serde_json::json!({
                    "sources": result.sources,
                    "agreement_score": result.agreement_score,
                    "confidence": result.confidence,
                });
                store::write_audit_log(&tx, "validate", &id, Some(&details), now_ts())?;
                tx.commit()?;
                fact_confidence = merged.confidence;
            }

            tracing::info!(
                id = %id,
                validated = result.is_validated,
                sources = result.sources.len(),
                "fact validated"
            );
            Ok(FactValidation {
                fact_id: id,
                result,
                fact_confidence,
            })
        })
        .await
    }
}
