//! Administrative writes from validation through to subscriber delivery.

use std::time::Duration;

use dynconf::events::ConfigEvent;
use dynconf::validation::{ConfigSet, ConflictSeverity, ImpactLevel};
use dynconf::{ConfigStore, ConfigValue, SetError, ValueSource};

mod common;

use common::Recorder;

const DELIVERY: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_invalid_value_is_not_written_or_announced() {
    let t = common::build_service();
    let recorder = Recorder::new();
    t.service.subscribe("*", recorder.handler());

    let err = t
        .service
        .set_and_notify(
            "job_failure_rate_threshold",
            ConfigValue::Float(1.5),
            "alice",
            "tune alerts",
        )
        .await
        .unwrap_err();

    match err {
        SetError::Validation { key, report, .. } => {
            assert_eq!(key, "job_failure_rate_threshold");
            assert!(!report.is_valid);
            assert_eq!(report.errors.len(), 1);
            assert_eq!(report.suggested_value, Some(ConfigValue::Float(1.0)));
        }
        other => panic!("unexpected error {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.store.writes(), 0);
    assert_eq!(recorder.len(), 0);
    assert_eq!(t.service.stats().resolution.rejected_writes, 1);
}

#[tokio::test]
async fn test_nan_is_rejected_before_writing() {
    let t = common::build_service();

    let err = t
        .service
        .set_and_notify("job_failure_rate_threshold", ConfigValue::Float(f64::NAN), "alice", "")
        .await
        .unwrap_err();
    assert!(matches!(err, SetError::Validation { ref report, .. } if !report.is_valid));
    assert_eq!(t.store.writes(), 0);
    assert_eq!(t.service.resolve_f64("job_failure_rate_threshold").await, Some(0.1));
}

#[tokio::test]
async fn test_valid_value_is_persisted_and_announced() {
    let t = common::build_service();
    let recorder = Recorder::new();
    t.service.subscribe("job_*", recorder.handler());

    let outcome = t
        .service
        .set_and_notify(
            "job_failure_rate_threshold",
            ConfigValue::Float(0.15),
            "alice",
            "tune alerts",
        )
        .await
        .unwrap();

    assert_eq!(outcome.old_value, Some(ConfigValue::Float(0.1)));
    assert_eq!(outcome.new_value, ConfigValue::Float(0.15));
    assert!(outcome.event_published);
    assert!(!outcome.shadowed_by_environment);
    assert!((outcome.impact.relative_change.unwrap() - 0.5).abs() < 1e-9);
    assert_eq!(outcome.record.raw_value, "0.15");
    assert_eq!(t.store.writes(), 1);

    assert!(common::wait_for(DELIVERY, || recorder.len() == 1).await);
    match &recorder.events()[0] {
        ConfigEvent::Changed {
            key,
            old_value,
            new_value,
            source,
            ..
        } => {
            assert_eq!(key, "job_failure_rate_threshold");
            assert_eq!(old_value, &Some(ConfigValue::Float(0.1)));
            assert_eq!(new_value, &ConfigValue::Float(0.15));
            assert_eq!(source, "alice");
        }
        other => panic!("unexpected event {:?}", other),
    }

    let resolved = t
        .service
        .resolve_with_metadata("job_failure_rate_threshold")
        .await
        .unwrap();
    assert_eq!(resolved.value, ConfigValue::Float(0.15));
    assert_eq!(resolved.source, ValueSource::Store);

    let audit = t.store.audit_log().await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].actor, "alice");
    assert_eq!(audit[0].reason, "tune alerts");
}

#[tokio::test]
async fn test_conflict_detection() {
    let t = common::build_service();

    let mut bad = ConfigSet::new();
    bad.insert("max_concurrent_jobs".into(), ConfigValue::Integer(20));
    bad.insert("queue_size_limit".into(), ConfigValue::Integer(10));
    let conflicts = t.service.detect_conflicts(&bad);
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].rule, "concurrency_exceeds_queue");
    assert_eq!(conflicts[0].severity, ConflictSeverity::Error);
    assert!(conflicts[0].involves("queue_size_limit"));

    let mut good = ConfigSet::new();
    good.insert("max_concurrent_jobs".into(), ConfigValue::Integer(5));
    good.insert("queue_size_limit".into(), ConfigValue::Integer(50));
    assert!(t.service.detect_conflicts(&good).is_empty());

    let partial: ConfigSet = [("max_concurrent_jobs".to_string(), ConfigValue::Integer(500))]
        .into_iter()
        .collect();
    assert!(t.service.detect_conflicts(&partial).is_empty());
}

#[tokio::test]
async fn test_conflicting_write_is_rejected() {
    let t = common::build_service();
    let recorder = Recorder::new();
    t.service.subscribe("*", recorder.handler());

    // Default queue_size_limit is 100.
    let err = t
        .service
        .set_and_notify("max_concurrent_jobs", ConfigValue::Integer(150), "bob", "")
        .await
        .unwrap_err();
    match err {
        SetError::Conflict { key, conflicts } => {
            assert_eq!(key, "max_concurrent_jobs");
            assert_eq!(conflicts.len(), 1);
            assert!(conflicts[0].is_error());
        }
        other => panic!("unexpected error {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.store.writes(), 0);
    assert_eq!(recorder.len(), 0);
}

#[tokio::test]
async fn test_warning_conflicts_are_reported_not_blocking() {
    let t = common::build_service();

    // 4096 MB × 10 jobs exceeds the default memory ceiling.
    let outcome = t
        .service
        .set_and_notify("memory_per_job_mb", ConfigValue::Integer(4096), "carol", "bigger jobs")
        .await
        .unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].rule, "memory_exceeds_ceiling");
    assert_eq!(t.store.writes(), 1);
}

#[tokio::test]
async fn test_store_failure_publishes_nothing() {
    let t = common::build_service();
    let recorder = Recorder::new();
    t.service.subscribe("*", recorder.handler());
    t.store.set_unavailable(true);

    let err = t
        .service
        .set_and_notify("alert_cooldown_minutes", ConfigValue::Integer(30), "dave", "")
        .await
        .unwrap_err();
    assert!(matches!(err, SetError::Store(_)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.len(), 0);
    assert_eq!(t.service.resolve_i64("alert_cooldown_minutes").await, Some(15));
}

#[tokio::test]
async fn test_unknown_key_is_rejected() {
    let t = common::build_service();
    let err = t
        .service
        .set_and_notify("does_not_exist", ConfigValue::Integer(1), "erin", "")
        .await
        .unwrap_err();
    assert!(matches!(err, SetError::UnknownKey(ref k) if k == "does_not_exist"));
    assert_eq!(t.store.writes(), 0);
}

#[tokio::test]
async fn test_write_shadowed_by_environment() {
    let t = common::build_service();
    t.env.set("PREFIX_SESSION_TIMEOUT_MINUTES", "90");

    let outcome = t
        .service
        .set_and_notify("session_timeout_minutes", ConfigValue::Integer(60), "frank", "")
        .await
        .unwrap();
    assert!(outcome.shadowed_by_environment);
    assert_eq!(outcome.old_value, Some(ConfigValue::Integer(90)));
    assert_eq!(t.service.resolve_i64("session_timeout_minutes").await, Some(90));
}

#[tokio::test]
async fn test_string_input_is_coerced_before_writing() {
    let t = common::build_service();
    let outcome = t
        .service
        .set_and_notify("maintenance_mode", ConfigValue::from("true"), "grace", "window")
        .await
        .unwrap();
    assert_eq!(outcome.new_value, ConfigValue::Boolean(true));
    assert_eq!(outcome.impact.level, ImpactLevel::Critical);
    assert_eq!(t.service.resolve_bool("maintenance_mode").await, Some(true));
}

#[tokio::test]
async fn test_impact_and_safe_fallback() {
    let t = common::build_service();

    let impact = t
        .service
        .assess_impact("max_concurrent_jobs", &ConfigValue::Integer(10))
        .await;
    assert_eq!(impact.level, ImpactLevel::None);

    let impact = t
        .service
        .assess_impact("max_concurrent_jobs", &ConfigValue::Integer(40))
        .await;
    assert!(impact.level >= ImpactLevel::High);
    assert!(!impact.affected_components.is_empty());

    let safe = t.service.safe_fallback();
    assert!(!safe.is_empty());
    for (key, value) in &safe {
        assert!(t.service.validate_value(key, value).is_valid, "{} safe value invalid", key);
    }
}
