//! Rule Set Cache
//!
//! Short-lived cache in front of the rule source. One slot holds every
//! enabled rule set. Reads hand out independent copies so nothing a caller
//! does can leak back into the cache.

use super::{RuleSet, RuleSource};
use crate::error::EngineResult;
use parking_lot::RwLock;
use std::time::{Duration, Instant};

/// Cached rule sets with their load time
#[derive(Clone)]
struct CacheEntry {
    rule_sets: Vec<RuleSet>,
    loaded_at: Instant,
}

impl CacheEntry {
    fn new(rule_sets: Vec<RuleSet>) -> Self {
        Self {
            rule_sets,
            loaded_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() >= ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: usize,

    /// Number of cache misses
    pub misses: usize,

    /// Number of entries expired
    pub expirations: usize,

    /// Number of explicit invalidations
    pub invalidations: usize,

    /// Number of loads from the source
    pub loads: usize,

    /// Rule sets currently cached
    pub cached_rule_sets: usize,

    /// Seconds since the cached rule sets were loaded, if any are cached
    pub age_secs: Option<u64>,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Process-local cache of enabled rule sets
pub struct RuleSetCache {
    slot: RwLock<Option<CacheEntry>>,
    ttl: Duration,
    stats: RwLock<CacheStats>,
}

impl RuleSetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn from_secs(ttl_secs: u64) -> Self {
        Self::new(Duration::from_secs(ttl_secs))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A copy of the cached rule sets, if present and fresh
    pub fn get(&self) -> Option<Vec<RuleSet>> {
        let mut slot = self.slot.write();
        let mut stats = self.stats.write();

        if slot.as_ref().is_some_and(|entry| entry.is_expired(self.ttl)) {
            *slot = None;
            stats.expirations += 1;
        }

        match slot.as_ref() {
            Some(entry) => {
                stats.hits += 1;
                Some(entry.rule_sets.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Store a copy of the rule sets
    pub fn set(&self, rule_sets: &[RuleSet]) {
        *self.slot.write() = Some(CacheEntry::new(rule_sets.to_vec()));
    }

    pub fn invalidate(&self) {
        let dropped = self.slot.write().take().is_some();
        self.stats.write().invalidations += 1;
        tracing::info!(dropped, "rule_set_cache_invalidated");
    }

    /// Cached rule sets, loading enabled ones from the source on a miss
    pub async fn get_or_load(&self, source: &dyn RuleSource) -> EngineResult<Vec<RuleSet>> {
        if let Some(hit) = self.get() {
            return Ok(hit);
        }

        let loaded = source.load_enabled_rule_sets().await?;
        self.set(&loaded);
        self.stats.write().loads += 1;
        tracing::debug!(
            source = %source.describe(),
            rule_sets = loaded.len(),
            "rule_sets_loaded"
        );
        Ok(loaded)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().clone();
        if let Some(entry) = self.slot.read().as_ref() {
            stats.cached_rule_sets = entry.rule_sets.len();
            stats.age_secs = Some(entry.loaded_at.elapsed().as_secs());
        }
        stats
    }
}

impl Default for RuleSetCache {
    fn default() -> Self {
        Self::from_secs(60)
    }
}

/// Keep enabled rule sets, each with only its enabled rules, in priority order
pub fn filter_enabled(rule_sets: Vec<RuleSet>) -> Vec<RuleSet> {
    rule_sets
        .into_iter()
        .filter(|rs| rs.enabled)
        .map(|mut rs| {
            rs.rules.retain(|r| r.enabled);
            rs.sort_rules();
            rs
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Rule, StaticRuleSource};

    fn rule_sets() -> Vec<RuleSet> {
        let mut disabled_rule = Rule::new("Off", "Message");
        disabled_rule.enabled = false;
        let mut disabled_set = RuleSet::new("Disabled");
        disabled_set.enabled = false;

        vec![
            RuleSet::new("Main")
                .with_rule(Rule::new("On", "Message"))
                .with_rule(disabled_rule),
            disabled_set,
        ]
    }

    #[test]
    fn test_reads_are_independent_copies() {
        let cache = RuleSetCache::from_secs(60);
        cache.set(&rule_sets());

        let mut first = cache.get().unwrap();
        first[0].name = "Mutated".to_string();
        first[0].rules.clear();

        let second = cache.get().unwrap();
        assert_eq!(second[0].name, "Main");
        assert_eq!(second[0].rules.len(), 2);
    }

    #[test]
    fn test_zero_ttl_always_misses() {
        let cache = RuleSetCache::from_secs(0);
        cache.set(&rule_sets());
        assert!(cache.get().is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_get_or_load_filters_and_caches() {
        let cache = RuleSetCache::from_secs(60);
        let source = StaticRuleSource::new(rule_sets());

        let loaded = cache.get_or_load(&source).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].rules.len(), 1);

        let _ = cache.get_or_load(&source).await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.cached_rule_sets, 1);
        assert_eq!(stats.age_secs, Some(0));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = RuleSetCache::from_secs(60);
        let source = StaticRuleSource::new(rule_sets());

        let _ = cache.get_or_load(&source).await.unwrap();
        cache.invalidate();
        let _ = cache.get_or_load(&source).await.unwrap();
        assert_eq!(cache.stats().loads, 2);
        assert_eq!(cache.stats().invalidations, 1);

        cache.invalidate();
        let stats = cache.stats();
        assert_eq!(stats.cached_rule_sets, 0);
        assert_eq!(stats.age_secs, None);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..CacheStats::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
