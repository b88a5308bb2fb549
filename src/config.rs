use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StrataConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub dedup: DedupConfig,
    pub retrieval: RetrievalConfig,
    pub consolidation: ConsolidationConfig,
    pub scheduler: SchedulerConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Fuzzy duplicate detection applied on every fact write.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DedupConfig {
    /// Normalized similarity at or above which two facts are the same fact.
    pub threshold: f64,
    /// Confidence added to an existing fact when a duplicate is merged into it.
    pub confidence_boost: f64,
    /// Upper bound on same-category facts scanned per check.
    pub max_candidates: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub half_life_days: f64,
    pub min_score: f64,
    pub candidate_limit: usize,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub stm_max_turns: usize,
    pub stm_max_age_secs: i64,
    /// Every N turns pushed to a session, a consolidation pass becomes due.
    pub auto_consolidate_every: usize,
    pub cutoff: f64,
    /// When set, select the K most important turns instead of using `cutoff`.
    pub top_k: Option<usize>,
    pub weights: ImportanceWeights,
    pub length_cap: usize,
    pub tail_turns: usize,
    pub fact_confidence: f64,
    pub max_fact_chars: usize,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ImportanceWeights {
    pub recency: f64,
    pub content: f64,
    pub length: f64,
    pub position: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Whether non-manual facts are expired alongside cache entries.
    pub expire_facts: bool,
    /// Per-category TTL overrides in seconds, keyed by category name.
    pub ttl: HashMap<String, u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_sources: usize,
    pub agreement_threshold: f64,
    pub similarity_threshold: f64,
    pub confidence_boost: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8765,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_strata_dir()
            .join("strata.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            confidence_boost: 0.05,
            max_candidates: 5000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            half_life_days: 180.0,
            min_score: 0.0,
            candidate_limit: 200,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            stm_max_turns: 500,
            stm_max_age_secs: 24 * 3600,
            auto_consolidate_every: 20,
            cutoff: 0.6,
            top_k: None,
            weights: ImportanceWeights::default(),
            length_cap: 280,
            tail_turns: 3,
            fact_confidence: 0.7,
            max_fact_chars: 500,
        }
    }
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            recency: 0.25,
            content: 0.35,
            length: 0.2,
            position: 0.2,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            expire_facts: true,
            ttl: HashMap::new(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_sources: 3,
            agreement_threshold: 0.67,
            similarity_threshold: 0.85,
            confidence_boost: 0.1,
        }
    }
}

/// Returns `~/.strata/`, or `./.strata/` when no home directory is known.
pub fn default_strata_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".strata")
}

/// Returns the default config file path: `~/.strata/config.toml`
pub fn default_config_path() -> PathBuf {
    default_strata_dir().join("config.toml")
}

impl StrataConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StrataConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (STRATA_DB, STRATA_LOG_LEVEL,
    /// STRATA_SWEEP_INTERVAL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STRATA_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("STRATA_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("STRATA_SWEEP_INTERVAL") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => self.scheduler.interval_secs = secs,
                _ => tracing::warn!(value = %val, "ignoring invalid STRATA_SWEEP_INTERVAL"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
