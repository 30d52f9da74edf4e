//! Change events routed by the bus.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::registry::ConfigValue;

/// Routing key used by events that do not concern a single key.
pub const WILDCARD_KEY: &str = "*";

/// Event kinds a subscription can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Changed,
    Invalidated,
    RestartRequired,
    ServiceLifecycle,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Changed => "changed",
            EventType::Invalidated => "invalidated",
            EventType::RestartRequired => "restart_required",
            EventType::ServiceLifecycle => "service_lifecycle",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service lifecycle transitions announced on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Started,
    Stopping,
}

/// A transient notification consumed once by dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigEvent {
    Changed {
        key: String,
        old_value: Option<ConfigValue>,
        new_value: ConfigValue,
        /// Who or what caused the change (actor id, "file_watcher", ...).
        source: String,
        requires_restart: bool,
        timestamp: SystemTime,
        metadata: BTreeMap<String, String>,
    },
    Invalidated {
        /// The invalidated key, or `"*"` for the whole cache.
        key: String,
        reason: String,
        timestamp: SystemTime,
        metadata: BTreeMap<String, String>,
    },
    RestartRequired {
        keys: Vec<String>,
        reason: String,
        timestamp: SystemTime,
        metadata: BTreeMap<String, String>,
    },
    ServiceLifecycle {
        state: LifecycleState,
        timestamp: SystemTime,
        metadata: BTreeMap<String, String>,
    },
}

impl ConfigEvent {
    pub fn changed(
        key: impl Into<String>,
        old_value: Option<ConfigValue>,
        new_value: ConfigValue,
    ) -> Self {
        ConfigEvent::Changed {
            key: key.into(),
            old_value,
            new_value,
            source: "service".to_string(),
            requires_restart: false,
            timestamp: SystemTime::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn invalidated(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigEvent::Invalidated {
            key: key.into(),
            reason: reason.into(),
            timestamp: SystemTime::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn restart_required(keys: Vec<String>, reason: impl Into<String>) -> Self {
        ConfigEvent::RestartRequired {
            keys,
            reason: reason.into(),
            timestamp: SystemTime::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn lifecycle(state: LifecycleState) -> Self {
        ConfigEvent::ServiceLifecycle {
            state,
            timestamp: SystemTime::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the origin of a `Changed` event. No-op for other variants.
    pub fn with_source(mut self, origin: impl Into<String>) -> Self {
        if let ConfigEvent::Changed { source, .. } = &mut self {
            *source = origin.into();
        }
        self
    }

    /// Mark a `Changed` event as needing a restart. No-op for other variants.
    pub fn with_restart(mut self, restart: bool) -> Self {
        if let ConfigEvent::Changed { requires_restart, .. } = &mut self {
            *requires_restart = restart;
        }
        self
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata_mut().insert(name.into(), value.into());
        self
    }

    fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
        match self {
            ConfigEvent::Changed { metadata, .. }
            | ConfigEvent::Invalidated { metadata, .. }
            | ConfigEvent::RestartRequired { metadata, .. }
            | ConfigEvent::ServiceLifecycle { metadata, .. } => metadata,
        }
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        match self {
            ConfigEvent::Changed { metadata, .. }
            | ConfigEvent::Invalidated { metadata, .. }
            | ConfigEvent::RestartRequired { metadata, .. }
            | ConfigEvent::ServiceLifecycle { metadata, .. } => metadata,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            ConfigEvent::Changed { .. } => EventType::Changed,
            ConfigEvent::Invalidated { .. } => EventType::Invalidated,
            ConfigEvent::RestartRequired { .. } => EventType::RestartRequired,
            ConfigEvent::ServiceLifecycle { .. } => EventType::ServiceLifecycle,
        }
    }

    /// Key used for pattern matching. Multi-key and lifecycle events route
    /// as the wildcard key.
    pub fn routing_key(&self) -> &str {
        match self {
            ConfigEvent::Changed { key, .. } | ConfigEvent::Invalidated { key, .. } => key,
            ConfigEvent::RestartRequired { .. } | ConfigEvent::ServiceLifecycle { .. } => {
                WILDCARD_KEY
            }
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            ConfigEvent::Changed { timestamp, .. }
            | ConfigEvent::Invalidated { timestamp, .. }
            | ConfigEvent::RestartRequired { timestamp, .. }
            | ConfigEvent::ServiceLifecycle { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_keys() {
        let changed = ConfigEvent::changed("cfg_test", None, ConfigValue::Integer(1));
        assert_eq!(changed.routing_key(), "cfg_test");
        assert_eq!(changed.event_type(), EventType::Changed);

        let restart = ConfigEvent::restart_required(vec!["a".into(), "b".into()], "pool resized");
        assert_eq!(restart.routing_key(), WILDCARD_KEY);

        let lifecycle = ConfigEvent::lifecycle(LifecycleState::Started);
        assert_eq!(lifecycle.routing_key(), WILDCARD_KEY);
    }

    #[test]
    fn test_builders_only_touch_changed() {
        let event = ConfigEvent::changed("k", None, ConfigValue::Boolean(true))
            .with_source("admin")
            .with_restart(true)
            .with_metadata("reason", "incident");
        match &event {
            ConfigEvent::Changed { source, requires_restart, .. } => {
                assert_eq!(source, "admin");
                assert!(*requires_restart);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(event.metadata().get("reason").map(String::as_str), Some("incident"));

        let invalidated = ConfigEvent::invalidated("k", "refresh").with_source("ignored");
        assert_eq!(invalidated.event_type(), EventType::Invalidated);
    }
}
