//! Category classification and per-category time-to-live policy.
//!
//! [`classify`] runs an ordered keyword rule table; the first rule that
//! matches wins, and volatile categories (crypto, stock, weather, sports) are
//! checked before the generic ones so that "Bitcoin hits new high today"
//! lands in `crypto` rather than `news`.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock};

use super::types::Category;

/// TTL used when neither the category nor `default` has an entry.
pub const FALLBACK_TTL_SECS: u64 = 86_400;

const RULES: &[(Category, &str)] = &[
    (
        Category::Crypto,
        r"(?i)\b(bitcoin|ethereum|crypto\w*|blockchain|btc|eth|altcoins?|defi|nfts?|solana|dogecoin|kryptowalut\w*)\b",
    ),
    (
        Category::Stock,
        r"(?i)\b(stocks?|shares?|nasdaq|nyse|dow jones|s&p ?500|tickers?|dividends?|earnings|ipo|market cap|akcj\w*|gie[lł]d\w*)\b",
    ),
    (
        Category::Weather,
        r"(?i)\b(weather|forecast|temperatures?|rain\w*|snow\w*|storms?|humidity|sunny|cloudy|winds?|pogod\w*|deszcz\w*)\b",
    ),
    (
        Category::Sports,
        r"(?i)\b(match(es)?|football|soccer|basketball|tennis|nba|nfl|fifa|league|tournament|olympic\w*|championship|goals?|mecz\w*)\b",
    ),
    (
        Category::Programming,
        r"(?i)\b(code|coding|programming|python|rust|javascript|typescript|java|golang|functions?|compilers?|api|algorithms?|sql|git|debug\w*|async|runtime|library|framework|programowani\w*)\b",
    ),
    (
        Category::Math,
        r"(?i)\b(math\w*|equations?|theorems?|integrals?|derivatives?|algebra|geometry|calculus|prime numbers?|matematy\w*|twierdzeni\w*)\b",
    ),
    (
        Category::Science,
        r"(?i)\b(science|scientific|physics|chemistry|biology|atoms?|molecules?|dna|research|experiments?|quantum|nauk\w*|fizyk\w*)\b",
    ),
    (
        Category::Geography,
        r"(?i)\b(country|countries|city|cities|continents?|capital|population|borders?|mountains?|rivers?|oceans?|islands?|geograf\w*|stolic\w*|pa[nń]stw\w*)\b",
    ),
    (
        Category::History,
        r"(?i)\b(history|historical|century|ancient|wars?|empires?|dynast(y|ies)|revolution|medieval|histori\w*|wojn\w*)\b",
    ),
    (
        Category::News,
        r"(?i)\b(news|breaking|today|latest|yesterday|headlines?|announced|reports?|wiadomo\w*|dzisiaj)\b",
    ),
];

fn compiled_rules() -> &'static [(Category, Regex)] {
    static COMPILED: OnceLock<Vec<(Category, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(category, pattern)| match Regex::new(pattern) {
                Ok(re) => Some((*category, re)),
                Err(e) => {
                    tracing::error!(category = %category, error = %e, "invalid classifier pattern");
                    None
                }
            })
            .collect()
    })
}

/// Assign a category to free text. Never fails; unmatched text is `default`.
pub fn classify(text: &str) -> Category {
    compiled_rules()
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Default)
}

/// Category → TTL in seconds.
#[derive(Debug, Clone, Serialize)]
pub struct TtlPolicy {
    ttls: BTreeMap<Category, u64>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        let ttls = BTreeMap::from([
            (Category::News, 3_600),
            (Category::Weather, 1_800),
            (Category::Stock, 300),
            (Category::Crypto, 300),
            (Category::Sports, 1_800),
            (Category::Science, 604_800),
            (Category::History, 2_592_000),
            (Category::Programming, 86_400),
            (Category::Math, 2_592_000),
            (Category::Geography, 2_592_000),
            (Category::Default, FALLBACK_TTL_SECS),
        ]);
        Self { ttls }
    }
}

impl TtlPolicy {
    /// Defaults with configured overrides applied. Unknown category names are
    /// logged and skipped.
    pub fn with_overrides(overrides: &HashMap<String, u64>) -> Self {
        let mut policy = Self::default();
        for (name, secs) in overrides {
            match name.parse::<Category>() {
                Ok(category) => {
                    policy.ttls.insert(category, *secs);
                }
                Err(_) => tracing::warn!(category = %name, "ignoring TTL override for unknown category"),
            }
        }
        policy
    }

    pub fn ttl_for(&self, category: Category) -> u64 {
        self.ttls
            .get(&category)
            .or_else(|| self.ttls.get(&Category::Default))
            .copied()
            .unwrap_or(FALLBACK_TTL_SECS)
    }

    pub fn entries(&self) -> impl Iterator<Item = (Category, u64)> + '_ {
        self.ttls.iter().map(|(c, s)| (*c, *s))
    }
}

/// Shared, swappable TTL policy. Readers take a cheap `Arc` snapshot; an
/// update replaces the whole table at once.
#[derive(Debug, Clone)]
pub struct TtlPolicyHandle {
    inner: Arc<RwLock<Arc<TtlPolicy>>>,
}

impl TtlPolicyHandle {
    pub fn new(policy: TtlPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    pub fn snapshot(&self) -> Arc<TtlPolicy> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, policy: TtlPolicy) {
        let policy = Arc::new(policy);
        match self.inner.write() {
            Ok(mut guard) => *guard = policy,
            Err(poisoned) => *poisoned.into_inner() = policy,
        }
        tracing::info!("TTL policy replaced");
    }
}

impl Default for TtlPolicyHandle {
    fn default() -> Self {
        Self::new(TtlPolicy::default())
    }
}
