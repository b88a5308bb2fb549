//! Multi-source validation of a claim against observed `(text, source_url)`
//! pairs.
//!
//! Observations whose normalized text is similar enough to the claim support
//! it. Each supporting source domain votes once, weighted by a fixed
//! reliability table; the claim is validated when at least `min_sources`
//! domains agree and their mean reliability reaches `agreement_threshold`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dedup::{normalize_text, similarity};
use crate::config::ValidationConfig;

/// Confidence reported when too few sources agree.
pub const INSUFFICIENT_SOURCES_CONFIDENCE: f64 = 0.5;
const DEFAULT_RELIABILITY: f64 = 0.7;
const MAX_CONFLICTING: usize = 5;

const RELIABILITY: &[(&str, f64)] = &[
    ("wikipedia.org", 1.0),
    ("britannica.com", 1.0),
    ("scholar.google.com", 1.0),
    ("arxiv.org", 1.0),
    ("nature.com", 1.0),
    ("science.org", 1.0),
    ("reddit.com", 0.8),
    ("stackoverflow.com", 0.8),
    ("github.com", 0.8),
    ("medium.com", 0.8),
    ("twitter.com", 0.6),
    ("x.com", 0.6),
    ("facebook.com", 0.6),
    ("youtube.com", 0.6),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub text: String,
    pub url: String,
}

impl Observation {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceProvenance {
    pub domain: String,
    pub reliability: f64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub claim: String,
    pub is_validated: bool,
    pub confidence: f64,
    pub agreement_score: f64,
    /// Distinct supporting domains.
    pub sources: Vec<String>,
    /// Up to five observations that did not match the claim.
    pub conflicting: Vec<String>,
    pub provenance: Vec<SourceProvenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Lowercased host of a URL without scheme, port, path, or a leading `www.`.
pub fn extract_domain(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let host = rest
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or("");
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or(host).to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Reliability weight of a source. Subdomains inherit their parent's weight.
pub fn source_reliability(url: &str) -> f64 {
    let domain = extract_domain(url);
    RELIABILITY
        .iter()
        .find(|(known, _)| domain == *known || domain.ends_with(&format!(".{known}")))
        .map_or(DEFAULT_RELIABILITY, |(_, w)| *w)
}

/// Cross-check one claim against the observations.
pub fn validate_claim(claim: &str, observations: &[Observation], config: &ValidationConfig) -> ValidationResult {
    let target = normalize_text(claim);

    let mut supporting: BTreeMap<String, SourceProvenance> = BTreeMap::new();
    let mut conflicting = Vec::new();
    for obs in observations {
        let score = similarity(&target, &normalize_text(&obs.text));
        if score >= config.similarity_threshold {
            let domain = extract_domain(&obs.url);
            if domain.is_empty() {
                continue;
            }
            supporting.entry(domain.clone()).or_insert_with(|| SourceProvenance {
                reliability: source_reliability(&obs.url),
                domain,
                url: obs.url.clone(),
            });
        } else if conflicting.len() < MAX_CONFLICTING {
            conflicting.push(obs.text.clone());
        }
    }

    let provenance: Vec<SourceProvenance> = supporting.into_values().collect();
    let sources: Vec<String> = provenance.iter().map(|p| p.domain.clone()).collect();
    let min_sources = config.min_sources.max(1);

    if sources.len() < min_sources {
        return ValidationResult {
            claim: claim.to_string(),
            is_validated: false,
            confidence: INSUFFICIENT_SOURCES_CONFIDENCE,
            agreement_score: 0.0,
            reason: Some(format!("insufficient sources ({} < {min_sources})", sources.len())),
            sources,
            conflicting,
            provenance,
        };
    }

    let agreement_score =
        provenance.iter().map(|p| p.reliability).sum::<f64>() / provenance.len() as f64;
    let is_validated = agreement_score >= config.agreement_threshold;
    let base = (sources.len() as f64 / min_sources as f64).min(1.0);
    let boost = if is_validated { config.confidence_boost } else { 0.0 };

    ValidationResult {
        claim: claim.to_string(),
        is_validated,
        confidence: (base + boost).min(1.0),
        agreement_score,
        reason: (!is_validated).then(|| "source agreement below threshold".to_string()),
        sources,
        conflicting,
        provenance,
    }
}
