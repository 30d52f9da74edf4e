//! Subscriptions and their delivery statistics.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use uuid::Uuid;

use crate::error::CallbackError;
use crate::events::matcher::KeyPattern;
use crate::events::types::{ConfigEvent, EventType};

/// Identifier returned by `subscribe`.
pub type SubscriptionId = Uuid;

/// A subscriber callback.
///
/// Handlers run on the blocking pool, one event at a time per
/// subscription, even when a previous call overran its timeout. Returning
/// an error or panicking is recorded against the subscription and never
/// affects other subscribers.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: &ConfigEvent) -> Result<(), CallbackError>;
}

impl<F> EventHandler for F
where
    F: Fn(&ConfigEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    fn handle(&self, event: &ConfigEvent) -> Result<(), CallbackError> {
        self(event)
    }
}

/// A registered interest in events.
pub struct Subscription {
    pub id: SubscriptionId,
    pub event_type: EventType,
    pub pattern: KeyPattern,
    pub(crate) handler: Arc<dyn EventHandler>,
    pub created_at: SystemTime,
    active: AtomicBool,
    trigger_count: AtomicU64,
    failure_count: AtomicU64,
    dropped_count: AtomicU64,
    last_triggered_at: Mutex<Option<SystemTime>>,
}

impl Subscription {
    pub fn new(event_type: EventType, pattern: KeyPattern, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            pattern,
            handler,
            created_at: SystemTime::now(),
            active: AtomicBool::new(true),
            trigger_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            last_triggered_at: Mutex::new(None),
        }
    }

    /// True if this subscription should receive `event` right now.
    pub fn wants(&self, event: &ConfigEvent) -> bool {
        self.is_active()
            && self.event_type == event.event_type()
            && self.pattern.matches(event.routing_key())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub(crate) fn record_trigger(&self) {
        self.trigger_count.fetch_add(1, Ordering::Relaxed);
        *self.last_triggered_at.lock().unwrap_or_else(|p| p.into_inner()) = Some(SystemTime::now());
    }

    pub(crate) fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// An event was dropped because this subscription's queue was full.
    pub(crate) fn record_drop(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Point-in-time view for admin tooling.
    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            event_type: self.event_type,
            pattern: self.pattern.as_raw(),
            active: self.is_active(),
            created_at: self.created_at,
            last_triggered_at: *self.last_triggered_at.lock().unwrap_or_else(|p| p.into_inner()),
            trigger_count: self.trigger_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("pattern", &self.pattern)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Serializable snapshot of a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub event_type: EventType,
    pub pattern: String,
    pub active: bool,
    pub created_at: SystemTime,
    pub last_triggered_at: Option<SystemTime>,
    pub trigger_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConfigValue;

    fn noop() -> Arc<dyn EventHandler> {
        Arc::new(|_: &ConfigEvent| Ok(()))
    }

    #[test]
    fn test_wants_checks_type_pattern_and_state() {
        let sub = Subscription::new(EventType::Changed, KeyPattern::parse("rate_*"), noop());
        let hit = ConfigEvent::changed("rate_limit_burst", None, ConfigValue::Integer(5));
        let other_key = ConfigEvent::changed("log_level", None, ConfigValue::from("debug"));
        let other_type = ConfigEvent::invalidated("rate_limit_burst", "refresh");

        assert!(sub.wants(&hit));
        assert!(!sub.wants(&other_key));
        assert!(!sub.wants(&other_type));

        sub.set_active(false);
        assert!(!sub.wants(&hit));
    }

    #[test]
    fn test_info_reflects_counters() {
        let sub = Subscription::new(EventType::Changed, KeyPattern::Any, noop());
        sub.record_trigger();
        sub.record_trigger();
        sub.record_failure();
        sub.record_drop();

        let info = sub.info();
        assert_eq!(info.trigger_count, 2);
        assert_eq!(info.failure_count, 1);
        assert_eq!(info.dropped_count, 1);
        assert_eq!(info.pattern, "*");
        assert!(info.last_triggered_at.is_some());
    }
}
