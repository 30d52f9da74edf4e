//! The resolution service: fallback chain, invalidation and notification.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::cache::{CacheJanitor, ConfigCache, ResolvedValue, ValueSource};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, ServiceConfig};
use crate::error::{ResolveError, SetError, ShutdownError};
use crate::events::{
    ConfigEvent, EventBus, EventHandler, EventType, KeyPattern, LifecycleState, SubscriptionId,
};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::{ConfigSchema, ConfigValue, SchemaRegistry};
use crate::resolution::env::{env_var_name, EnvSource};
use crate::resolution::restart::{RestartRequirement, RestartTracker};
use crate::resolution::stats::{ResolutionStats, ServiceStats};
use crate::store::{ConfigStore, StoreRecord};
use crate::validation::{
    ConfigSet, ConfigValidator, Conflict, ImpactAssessment, ValidationReport,
};

/// Result of an accepted [`ConfigService::set_and_notify`].
#[derive(Debug, Clone, Serialize)]
pub struct SetOutcome {
    pub key: String,
    pub old_value: Option<ConfigValue>,
    pub new_value: ConfigValue,
    pub record: StoreRecord,
    /// Validation result, including any warnings.
    pub report: ValidationReport,
    /// Warning-level conflicts involving the key.
    pub warnings: Vec<Conflict>,
    pub impact: ImpactAssessment,
    /// An environment override still takes precedence over the stored value.
    pub shadowed_by_environment: bool,
    /// False if the change event could not be queued.
    pub event_published: bool,
}

/// Resolves configuration values and propagates changes.
///
/// Reads go cache → environment → store → schema default, caching
/// whichever step succeeds. Writes invalidate, record restart needs and
/// publish events; subscribers are never awaited.
pub struct ConfigService {
    config: ServiceConfig,
    schemas: Arc<SchemaRegistry>,
    cache: Arc<ConfigCache>,
    store: Arc<dyn ConfigStore>,
    env: Arc<dyn EnvSource>,
    bus: EventBus,
    validator: ConfigValidator,
    restarts: RestartTracker,
    stats: ResolutionStats,
    tasks: Shutdown,
    started_at: Instant,
    stopped: AtomicBool,
}

impl ConfigService {
    /// Build the service and start its background tasks. Must be called
    /// inside a Tokio runtime.
    ///
    /// Settings are validated first, so a zero cleanup interval or queue
    /// size is an error rather than a runtime panic.
    pub fn new(
        config: ServiceConfig,
        schemas: Arc<SchemaRegistry>,
        store: Arc<dyn ConfigStore>,
        env: Arc<dyn EnvSource>,
    ) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let cache = Arc::new(ConfigCache::from_config(&config.cache));
        let bus = EventBus::start(&config.event_bus);
        let validator = ConfigValidator::new(schemas.clone(), &config.validation);

        let tasks = Shutdown::new();
        let cleanup_interval = Duration::from_secs(config.cache.cleanup_interval_secs);
        let janitor = CacheJanitor::new(cache.clone(), cleanup_interval);
        tasks.track(tokio::spawn(janitor.run(tasks.subscribe())));

        tracing::info!(
            schemas = schemas.len(),
            env_prefix = %config.resolution.env_prefix,
            cache_entries = config.cache.max_entries,
            "Configuration service started"
        );
        bus.publish(ConfigEvent::lifecycle(LifecycleState::Started));

        Ok(Self {
            config,
            schemas,
            cache,
            store,
            env,
            bus,
            validator,
            restarts: RestartTracker::new(),
            stats: ResolutionStats::default(),
            tasks,
            started_at: Instant::now(),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn validator(&self) -> &ConfigValidator {
        &self.validator
    }

    // ---- reads ----

    /// The current value, or `None` if no source has one.
    pub async fn resolve(&self, key: &str) -> Option<ConfigValue> {
        self.resolve_with_metadata(key).await.ok().map(|r| r.value)
    }

    /// The current value, or `fallback` if no source has one.
    pub async fn resolve_or(&self, key: &str, fallback: impl Into<ConfigValue>) -> ConfigValue {
        match self.resolve(key).await {
            Some(value) => value,
            None => {
                self.stats.record_caller_fallback();
                fallback.into()
            }
        }
    }

    pub async fn resolve_i64(&self, key: &str) -> Option<i64> {
        self.resolve(key).await.and_then(|v| v.as_i64())
    }

    pub async fn resolve_f64(&self, key: &str) -> Option<f64> {
        self.resolve(key).await.and_then(|v| v.as_f64())
    }

    pub async fn resolve_bool(&self, key: &str) -> Option<bool> {
        self.resolve(key).await.and_then(|v| v.as_bool())
    }

    pub async fn resolve_string(&self, key: &str) -> Option<String> {
        self.resolve(key).await.map(|v| match v {
            ConfigValue::String(s) => s,
            other => other.to_raw_string(),
        })
    }

    /// Run the fallback chain and report where the value came from.
    pub async fn resolve_with_metadata(&self, key: &str) -> Result<ResolvedValue, ResolveError> {
        let schema = self.schemas.get(key);
        if schema.is_none() {
            self.stats.record_missing_schema();
            tracing::warn!(key = %key, "No schema registered; resolving without type information");
        }

        if let Some(hit) = self.cache.get(key) {
            self.record(ValueSource::Cache);
            return Ok(hit.from_cache());
        }

        let ttl = schema
            .as_ref()
            .and_then(|s| s.cache_ttl)
            .unwrap_or_else(|| self.cache.default_ttl());

        match self.resolve_uncached(key, schema.as_deref(), ttl).await {
            Some(resolved) => {
                self.cache.set(key, resolved.clone(), Some(ttl));
                self.record(resolved.source);
                tracing::debug!(
                    key = %key,
                    source = %resolved.source,
                    "Resolved configuration value"
                );
                Ok(resolved)
            }
            None => {
                self.stats.record_not_found();
                metrics::record_not_found();
                tracing::debug!(key = %key, "Configuration value not found");
                Err(ResolveError::NotFound(key.to_string()))
            }
        }
    }

    async fn resolve_uncached(
        &self,
        key: &str,
        schema: Option<&ConfigSchema>,
        ttl: Duration,
    ) -> Option<ResolvedValue> {
        let requires_restart = schema.map(|s| s.requires_restart).unwrap_or(false);
        let resolved = |value: ConfigValue, source: ValueSource, last_updated: Option<SystemTime>| {
            ResolvedValue {
                key: key.to_string(),
                value_type: schema.map(|s| s.value_type).unwrap_or_else(|| value.value_type()),
                value,
                source,
                requires_restart,
                last_updated,
                resolved_at: SystemTime::now(),
                ttl,
            }
        };

        if schema.map(|s| s.allow_env_override).unwrap_or(true) {
            if let Some(value) = self.from_environment(key, schema) {
                return Some(resolved(value, ValueSource::Environment, None));
            }
        }

        if let Some((value, record)) = self.from_store(key, schema).await {
            return Some(resolved(value, ValueSource::Store, Some(record.last_updated_at)));
        }

        schema
            .and_then(|s| s.default_value.clone())
            .map(|value| resolved(value, ValueSource::Default, None))
    }

    fn from_environment(&self, key: &str, schema: Option<&ConfigSchema>) -> Option<ConfigValue> {
        let name = env_var_name(&self.config.resolution.env_prefix, key);
        let raw = self.env.get(&name)?;
        let Some(schema) = schema else {
            return Some(ConfigValue::String(raw));
        };
        match schema.value_type.parse(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                self.stats.record_coercion_failure();
                metrics::record_coercion_failure("environment");
                tracing::warn!(
                    key = %key,
                    variable = %name,
                    expected = %schema.value_type,
                    reason = %e.reason,
                    "Environment override does not match declared type; using raw string"
                );
                Some(ConfigValue::String(raw))
            }
        }
    }

    async fn from_store(
        &self,
        key: &str,
        schema: Option<&ConfigSchema>,
    ) -> Option<(ConfigValue, StoreRecord)> {
        let record = match self.store.get_by_key(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                self.stats.record_store_error();
                metrics::record_store_error();
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Store lookup failed; continuing fallback chain"
                );
                return None;
            }
        };

        let value_type = schema.map(|s| s.value_type).unwrap_or(record.value_type);
        match value_type.parse(&record.raw_value) {
            Ok(value) => Some((value, record)),
            Err(e) => {
                self.stats.record_coercion_failure();
                metrics::record_coercion_failure("store");
                tracing::warn!(
                    key = %key,
                    expected = %value_type,
                    reason = %e.reason,
                    "Stored value does not match declared type; ignoring it"
                );
                None
            }
        }
    }

    fn record(&self, source: ValueSource) {
        self.stats.record_source(source);
        metrics::record_resolution(source.as_str());
    }

    /// Resolve every registered key that has a value.
    pub async fn effective_config(&self) -> ConfigSet {
        let mut set = ConfigSet::new();
        for key in self.schemas.keys() {
            if let Some(value) = self.resolve(&key).await {
                set.insert(key, value);
            }
        }
        set
    }

    // ---- maintenance ----

    /// Drop the cached value for `key`. Returns whether an entry was cached.
    pub fn refresh(&self, key: &str) -> bool {
        let removed = self.cache.invalidate(key);
        self.bus.publish(ConfigEvent::invalidated(key, "refresh"));
        tracing::debug!(key = %key, removed, "Cache entry refreshed");
        removed
    }

    /// Drop every cached value. Returns how many entries were dropped.
    pub fn refresh_all(&self) -> usize {
        let removed = self.cache.clear();
        self.bus.publish(ConfigEvent::invalidated(crate::events::WILDCARD_KEY, "refresh_all"));
        tracing::info!(removed, "Configuration cache cleared");
        removed
    }

    // ---- notification ----

    /// Propagate a change made elsewhere.
    ///
    /// Always invalidates the cached entry, records a restart requirement
    /// when the schema asks for one and publishes a `Changed` event.
    /// Returns whether the event was queued.
    pub fn notify_change(&self, key: &str, old: Option<ConfigValue>, new: ConfigValue) -> bool {
        self.notify_change_from(key, old, new, "service")
    }

    /// [`notify_change`](Self::notify_change) with an explicit origin for the event.
    pub fn notify_change_from(
        &self,
        key: &str,
        old: Option<ConfigValue>,
        new: ConfigValue,
        origin: &str,
    ) -> bool {
        self.cache.invalidate(key);
        self.stats.record_notification();

        let schema = self.schemas.get(key);
        let requires_restart = schema.as_ref().map(|s| s.requires_restart).unwrap_or(false);
        if let Some(schema) = schema.as_ref().filter(|s| s.requires_restart) {
            let reason = format!("{} changed by {}", key, origin);
            if self.restarts.add(RestartRequirement::for_schema(schema, reason.clone())) {
                metrics::record_restart_pending(self.restarts.len());
                tracing::warn!(
                    key = %key,
                    pending = self.restarts.len(),
                    "Change requires a restart"
                );
                let keys = self.restarts.pending_keys();
                self.bus.publish(ConfigEvent::restart_required(keys, reason));
            }
        }

        let shown = match (&schema, &new) {
            (Some(schema), value) => schema.redact(value),
            (None, value) => value.to_raw_string(),
        };
        let event = ConfigEvent::changed(key, old, new)
            .with_source(origin)
            .with_restart(requires_restart);
        let published = self.bus.publish(event);
        tracing::info!(
            key = %key,
            value = %shown,
            origin = %origin,
            requires_restart,
            published,
            "Configuration changed"
        );
        published
    }

    // ---- subscriptions ----

    /// Subscribe to `Changed` events for keys matching `pattern`.
    pub fn subscribe(
        &self,
        pattern: impl Into<KeyPattern>,
        handler: impl EventHandler,
    ) -> SubscriptionId {
        self.bus.subscribe(EventType::Changed, pattern, handler)
    }

    pub fn subscribe_events(
        &self,
        event_type: EventType,
        pattern: impl Into<KeyPattern>,
        handler: impl EventHandler,
    ) -> SubscriptionId {
        self.bus.subscribe(event_type, pattern, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn pause(&self, id: SubscriptionId) -> bool {
        self.bus.pause(id)
    }

    pub fn resume(&self, id: SubscriptionId) -> bool {
        self.bus.resume(id)
    }

    // ---- restart bookkeeping ----

    pub fn is_restart_required(&self) -> bool {
        self.restarts.is_required()
    }

    pub fn pending_restart_keys(&self) -> Vec<String> {
        self.restarts.pending_keys()
    }

    pub fn restart_requirements(&self) -> Vec<RestartRequirement> {
        self.restarts.requirements()
    }

    pub fn clear_restart_requirement(&self, key: &str) -> bool {
        let removed = self.restarts.remove(key);
        metrics::record_restart_pending(self.restarts.len());
        removed
    }

    pub fn clear_restart_requirements(&self) -> usize {
        let cleared = self.restarts.clear();
        metrics::record_restart_pending(0);
        cleared
    }

    // ---- administration ----

    pub fn validate_value(&self, key: &str, value: &ConfigValue) -> ValidationReport {
        self.validator.validate(key, value)
    }

    pub fn detect_conflicts(&self, set: &ConfigSet) -> Vec<Conflict> {
        self.validator.detect_conflicts(set)
    }

    /// Assess changing `key` from its current effective value to `new`.
    pub async fn assess_impact(&self, key: &str, new: &ConfigValue) -> ImpactAssessment {
        let old = self.resolve(key).await;
        self.validator.assess_impact(key, old.as_ref(), new)
    }

    pub fn safe_fallback(&self) -> BTreeMap<String, ConfigValue> {
        self.validator.safe_fallback()
    }

    /// Validate, persist, then notify.
    ///
    /// Nothing is written and no event is published unless the value passes
    /// validation and conflict checks. The change event is published only
    /// after the store confirms the update.
    pub async fn set_and_notify(
        &self,
        key: &str,
        value: ConfigValue,
        actor: &str,
        reason: &str,
    ) -> Result<SetOutcome, SetError> {
        let result = self.try_set(key, value, actor, reason).await;
        self.stats.record_write(result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(key = %key, actor = %actor, error = %e, "Configuration write rejected");
        }
        result
    }

    async fn try_set(
        &self,
        key: &str,
        value: ConfigValue,
        actor: &str,
        reason: &str,
    ) -> Result<SetOutcome, SetError> {
        let schema = self
            .schemas
            .get(key)
            .ok_or_else(|| SetError::UnknownKey(key.to_string()))?;

        let report = self.validator.validate_value(key, &value, &schema);
        if !report.is_valid {
            return Err(SetError::Validation {
                key: key.to_string(),
                report,
                safe_fallback_available: self.validator.should_use_safe_fallback(),
            });
        }
        let new_value = report.coerced_value.clone().unwrap_or(value);

        let old_value = self.resolve(key).await;
        let mut proposed = self.effective_config().await;
        proposed.insert(key.to_string(), new_value.clone());
        let (errors, warnings): (Vec<_>, Vec<_>) = self
            .validator
            .detect_conflicts(&proposed)
            .into_iter()
            .filter(|c| c.involves(key))
            .partition(Conflict::is_error);
        if !errors.is_empty() {
            return Err(SetError::Conflict {
                key: key.to_string(),
                conflicts: errors,
            });
        }

        let record = self.store.update(key, &new_value, actor, reason).await?;

        let impact = self.validator.assess_impact(key, old_value.as_ref(), &new_value);
        let shadowed_by_environment = schema.allow_env_override
            && self
                .env
                .get(&env_var_name(&self.config.resolution.env_prefix, key))
                .is_some();
        if shadowed_by_environment {
            tracing::warn!(key = %key, "Stored value is shadowed by an environment override");
        }

        let event_published =
            self.notify_change_from(key, old_value.clone(), new_value.clone(), actor);

        Ok(SetOutcome {
            key: key.to_string(),
            old_value,
            new_value,
            record,
            report,
            warnings,
            impact,
            shadowed_by_environment,
            event_published,
        })
    }

    // ---- introspection & lifecycle ----

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            resolution: self.stats.snapshot(),
            cache: self.cache.stats(),
            events: self.bus.stats(),
            pending_restarts: self.restarts.len(),
            validation_success_rate: self.validator.success_rate(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    /// Announce shutdown, stop the cache janitor and drain the event bus,
    /// each within the configured timeout. Calling it twice is a no-op.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let timeout = Duration::from_millis(self.config.lifecycle.shutdown_timeout_ms);
        tracing::info!(?timeout, "Configuration service shutting down");

        self.bus.publish(ConfigEvent::lifecycle(LifecycleState::Stopping));
        let janitor = self.tasks.complete(timeout).await;
        let bus = self.bus.shutdown(timeout).await;

        match janitor.and(bus) {
            Ok(()) => {
                tracing::info!("Configuration service stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Configuration service did not stop cleanly");
                Err(e)
            }
        }
    }
}
