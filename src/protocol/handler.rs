//! Handler for `ruleflow`
//!
//! Owns the engine, the action supervisor and the action registry, and is
//! shared by the REST API and the CLI. Counters are lock-free atomics.

use crate::actions::{ActionRegistry, ActionRunner, ActionStatus, ActionSupervisor};
use crate::engine::{
    EntityCatalog, EntityDirectory, EntityLookup, InferenceEngine, StaticDirectory, TurnInput,
    TurnOutcome,
};
use crate::error::EngineResult;
use crate::rules::{CacheStats, JsonFileRuleSource, RuleSetCache, RuleSource};
use crate::store::open_store;
use crate::Config;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared entry point for every surface
pub struct Handler {
    engine: InferenceEngine,
    supervisor: ActionSupervisor,
    registry: Arc<ActionRegistry>,
    reap_interval: Option<Duration>,
    start_time: Instant,
    turn_count: AtomicU64,
    failed_turns: AtomicU64,
}

impl Handler {
    pub fn new(engine: InferenceEngine, registry: Arc<ActionRegistry>) -> Self {
        let runner: Arc<dyn ActionRunner> = registry.clone();
        let supervisor = ActionSupervisor::new(Arc::clone(engine.store()), runner);
        Self {
            engine,
            supervisor,
            registry,
            reap_interval: None,
            start_time: Instant::now(),
            turn_count: AtomicU64::new(0),
            failed_turns: AtomicU64::new(0),
        }
    }

    /// Build every component from configuration
    pub fn from_config(config: &Config) -> EngineResult<Self> {
        let store = open_store(&config.store)?;
        let source: Arc<dyn RuleSource> = Arc::new(JsonFileRuleSource::new(&config.engine.rules_path));
        let cache = Arc::new(RuleSetCache::from_secs(config.cache.rule_set_ttl_secs));

        let lookup: Arc<dyn EntityLookup> = match &config.engine.catalog_path {
            Some(path) => Arc::new(EntityCatalog::from_file(path)?),
            None => Arc::new(EntityCatalog::new()),
        };
        let directory: Arc<dyn EntityDirectory> = match &config.engine.directory_path {
            Some(path) => Arc::new(StaticDirectory::from_file(path)?),
            None => Arc::new(StaticDirectory::default()),
        };

        let registry = Arc::new(ActionRegistry::from_config(&config.actions, Arc::clone(&store)));
        let engine = InferenceEngine::new(&config.engine, store, source, cache, lookup, directory);

        tracing::info!(
            rules = %config.engine.rules_path.display(),
            actions = registry.len(),
            "handler_ready"
        );
        Ok(Self::new(engine, registry).with_reap_interval(config.store.reap_interval_secs))
    }

    /// Purge expired attributes every `secs` seconds while serving (0 = never)
    pub fn with_reap_interval(mut self, secs: u64) -> Self {
        self.reap_interval = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn reap_interval(&self) -> Option<Duration> {
        self.reap_interval
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn supervisor(&self) -> &ActionSupervisor {
        &self.supervisor
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// Get uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn total_turns(&self) -> u64 {
        self.turn_count.load(Ordering::Relaxed)
    }

    pub fn failed_turns(&self) -> u64 {
        self.failed_turns.load(Ordering::Relaxed)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache().stats()
    }

    pub async fn infer(&self, input: &TurnInput) -> EngineResult<TurnOutcome> {
        self.turn_count.fetch_add(1, Ordering::Relaxed);
        let result = self.engine.infer(input).await;
        if let Err(e) = &result {
            self.failed_turns.fetch_add(1, Ordering::Relaxed);
            tracing::error!(session_id = %input.session_id, code = e.code(), error = %e, "inference_failed");
        }
        result
    }

    pub async fn load_state(&self, session_id: &str) -> EngineResult<BTreeMap<String, String>> {
        self.engine.load_state(session_id).await
    }

    pub async fn set_state(
        &self,
        session_id: &str,
        parameters: &BTreeMap<String, String>,
    ) -> EngineResult<BTreeMap<String, String>> {
        self.engine.set_state(session_id, parameters).await
    }

    pub async fn dtmf_menu(
        &self,
        session_id: &str,
        selected: &str,
    ) -> EngineResult<BTreeMap<String, String>> {
        self.engine.dtmf_menu(session_id, selected).await
    }

    pub async fn dtmf_input(
        &self,
        session_id: &str,
        input: Option<&str>,
    ) -> EngineResult<BTreeMap<String, String>> {
        self.engine.dtmf_input(session_id, input).await
    }

    pub async fn start_action(&self, session_id: &str) -> ActionStatus {
        self.supervisor.start(session_id).await
    }

    pub async fn check_timeout(&self, session_id: &str) -> EngineResult<BTreeMap<String, String>> {
        self.supervisor.check_timeout(session_id).await
    }

    /// Physically remove expired session attributes
    pub async fn reap_expired(&self) -> EngineResult<usize> {
        Ok(self.engine.store().purge_expired().await?)
    }

    /// Drop cached rule sets so the next turn reloads them
    pub fn invalidate_rules(&self) -> CacheStats {
        self.engine.cache().invalidate();
        self.cache_stats()
    }

    /// Wait for dispatched actions to finish
    pub async fn shutdown(&self) {
        self.registry.drain().await;
        tracing::info!(turns = self.total_turns(), "handler_stopped");
    }
}
