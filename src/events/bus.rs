//! Asynchronous event bus.
//!
//! A bounded publish queue feeds one dispatch task. The dispatcher matches
//! each event against the subscription registry and pushes it onto the
//! bounded queue of every matching subscription. Each subscription has its
//! own delivery task, so its events arrive in publication order while a
//! slow subscriber only delays itself. Callbacks run on the blocking pool.

use dashmap::DashMap;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};

use crate::config::EventBusConfig;
use crate::error::{CallbackError, ShutdownError};
use crate::events::matcher::KeyPattern;
use crate::events::subscription::{EventHandler, Subscription, SubscriptionId, SubscriptionInfo};
use crate::events::types::{ConfigEvent, EventType};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Delivery counters, updated by the dispatcher and the delivery tasks.
#[derive(Debug, Default)]
struct BusCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    timed_out: AtomicU64,
    queue_full: AtomicU64,
    subscriber_queue_full: AtomicU64,
    rejected: AtomicU64,
    unmatched: AtomicU64,
    skipped_inactive: AtomicU64,
}

/// Point-in-time bus statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BusStats {
    pub subscriptions: usize,
    pub active_subscriptions: usize,
    pub published: u64,
    pub delivered: u64,
    /// Callbacks that returned an error, panicked or timed out.
    pub failed: u64,
    pub panicked: u64,
    pub timed_out: u64,
    /// Publishes refused because the queue was full.
    pub queue_full: u64,
    /// Routed events dropped because a subscriber's own queue was full.
    pub subscriber_queue_full: u64,
    /// Publishes refused because the bus was shutting down.
    pub rejected: u64,
    /// Events that matched no subscription.
    pub unmatched: u64,
    /// Events skipped because the subscription was paused or removed after routing.
    pub skipped_inactive: u64,
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

type EventQueue = mpsc::Sender<Arc<ConfigEvent>>;

struct BusInner {
    subscriptions: DashMap<SubscriptionId, Arc<Subscription>>,
    /// Per-subscription delivery queues. Cleared by the dispatcher on exit.
    queues: DashMap<SubscriptionId, EventQueue>,
    counters: BusCounters,
    accepting: AtomicBool,
}

/// Publish/subscribe hub for configuration events.
pub struct EventBus {
    inner: Arc<BusInner>,
    queue_tx: mpsc::Sender<ConfigEvent>,
    queue_capacity: usize,
    subscriber_queue_capacity: usize,
    callback_timeout: Duration,
    runtime: Handle,
    shutdown: Shutdown,
}

impl EventBus {
    /// Spawn the dispatcher. Must be called inside a Tokio runtime.
    pub fn start(config: &EventBusConfig) -> Self {
        let inner = Arc::new(BusInner {
            subscriptions: DashMap::new(),
            queues: DashMap::new(),
            counters: BusCounters::default(),
            accepting: AtomicBool::new(true),
        });
        let queue_capacity = config.queue_capacity.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        let shutdown = Shutdown::new();
        let callback_timeout = Duration::from_millis(config.callback_timeout_ms);
        let runtime = Handle::current();

        shutdown.track(runtime.spawn(dispatch_loop(
            inner.clone(),
            queue_rx,
            shutdown.subscribe(),
        )));

        tracing::debug!(
            queue_capacity,
            subscriber_queue_capacity = config.subscriber_queue_capacity,
            ?callback_timeout,
            "Event bus started"
        );

        Self {
            inner,
            queue_tx,
            queue_capacity,
            subscriber_queue_capacity: config.subscriber_queue_capacity.max(1),
            callback_timeout,
            runtime,
            shutdown,
        }
    }

    /// Enqueue an event without blocking.
    ///
    /// Returns false if the queue is full or the bus is shutting down.
    pub fn publish(&self, event: ConfigEvent) -> bool {
        if !self.inner.accepting.load(Ordering::Acquire) {
            self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::record_event_dropped("closed");
            return false;
        }

        let event_type = event.event_type();
        match self.queue_tx.try_send(event) {
            Ok(()) => {
                self.inner.counters.published.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_published(event_type.as_str());
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.inner.counters.queue_full.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_dropped("queue_full");
                tracing::warn!(
                    event_type = %event_type,
                    key = event.routing_key(),
                    "Event queue full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_dropped("closed");
                false
            }
        }
    }

    /// Register a handler for events of `event_type` whose routing key matches `pattern`.
    pub fn subscribe(
        &self,
        event_type: EventType,
        pattern: impl Into<KeyPattern>,
        handler: impl EventHandler,
    ) -> SubscriptionId {
        let subscription = Arc::new(Subscription::new(
            event_type,
            pattern.into(),
            Arc::new(handler),
        ));
        let id = subscription.id;
        tracing::debug!(
            subscription = %id,
            event_type = %event_type,
            pattern = %subscription.pattern,
            "Subscription added"
        );
        self.inner.subscriptions.insert(id, subscription.clone());

        // A stopped bus keeps the registration but never delivers to it.
        if self.is_accepting() {
            let (tx, rx) = mpsc::channel(self.subscriber_queue_capacity);
            self.inner.queues.insert(id, tx);
            let delivery =
                deliver_loop(self.inner.clone(), subscription, rx, self.callback_timeout);
            self.shutdown.track(self.runtime.spawn(delivery));
            if !self.is_accepting() {
                self.inner.queues.remove(&id);
            }
        }
        id
    }

    /// Remove a subscription. Events already queued for it are skipped.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.inner.subscriptions.remove(&id) {
            Some((_, subscription)) => {
                subscription.set_active(false);
                self.inner.queues.remove(&id);
                tracing::debug!(subscription = %id, "Subscription removed");
                true
            }
            None => false,
        }
    }

    /// Stop delivering to a subscription without removing it.
    pub fn pause(&self, id: SubscriptionId) -> bool {
        self.set_active(id, false)
    }

    pub fn resume(&self, id: SubscriptionId) -> bool {
        self.set_active(id, true)
    }

    fn set_active(&self, id: SubscriptionId, active: bool) -> bool {
        match self.inner.subscriptions.get(&id) {
            Some(subscription) => {
                subscription.set_active(active);
                true
            }
            None => false,
        }
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<SubscriptionInfo> {
        self.inner.subscriptions.get(&id).map(|s| s.info())
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner.subscriptions.iter().map(|s| s.info()).collect()
    }

    pub fn stats(&self) -> BusStats {
        let c = &self.inner.counters;
        let subscriptions = self.inner.subscriptions.len();
        let active_subscriptions = self
            .inner
            .subscriptions
            .iter()
            .filter(|s| s.is_active())
            .count();
        BusStats {
            subscriptions,
            active_subscriptions,
            published: c.published.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            panicked: c.panicked.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            queue_full: c.queue_full.load(Ordering::Relaxed),
            subscriber_queue_full: c.subscriber_queue_full.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            unmatched: c.unmatched.load(Ordering::Relaxed),
            skipped_inactive: c.skipped_inactive.load(Ordering::Relaxed),
            queue_depth: self.queue_capacity.saturating_sub(self.queue_tx.capacity()),
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting events, deliver what is queued, and join the delivery tasks.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        if !self.inner.accepting.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("Event bus draining");
        let result = self.shutdown.complete(timeout).await;
        tracing::info!(stats = ?self.stats(), "Event bus stopped");
        result
    }
}

async fn dispatch_loop(
    inner: Arc<BusInner>,
    mut queue_rx: mpsc::Receiver<ConfigEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            maybe = queue_rx.recv() => match maybe {
                Some(event) => route(&inner, event),
                None => break,
            },
            _ = shutdown_rx.recv() => {
                queue_rx.close();
                while let Some(event) = queue_rx.recv().await {
                    route(&inner, event);
                }
                break;
            }
        }
    }
    // Dropping the queue senders lets each delivery task finish its backlog and exit.
    inner.queues.clear();
    tracing::debug!("Dispatcher stopped");
}

fn route(inner: &BusInner, event: ConfigEvent) {
    let event = Arc::new(event);
    let matched: Vec<Arc<Subscription>> = inner
        .subscriptions
        .iter()
        .filter(|s| s.wants(&event))
        .map(|s| s.value().clone())
        .collect();

    if matched.is_empty() {
        inner.counters.unmatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            event_type = %event.event_type(),
            key = event.routing_key(),
            "No subscribers"
        );
        return;
    }

    for subscription in matched {
        let Some(queue) = inner.queues.get(&subscription.id) else {
            continue;
        };
        match queue.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                subscription.record_drop();
                inner
                    .counters
                    .subscriber_queue_full
                    .fetch_add(1, Ordering::Relaxed);
                metrics::record_event_dropped("subscriber_queue_full");
                tracing::warn!(
                    subscription = %subscription.id,
                    event_type = %event.event_type(),
                    key = event.routing_key(),
                    "Subscriber queue full, dropping event"
                );
            }
            // Unsubscribed while routing.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

async fn deliver_loop(
    inner: Arc<BusInner>,
    subscription: Arc<Subscription>,
    mut rx: mpsc::Receiver<Arc<ConfigEvent>>,
    callback_timeout: Duration,
) {
    while let Some(event) = rx.recv().await {
        if !subscription.is_active() {
            inner.counters.skipped_inactive.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let (result, overrun) =
            invoke(subscription.handler.clone(), event.clone(), callback_timeout).await;
        record(&inner, &subscription, &event, result);

        // The next event waits until the timed-out call has actually returned.
        if let Some(call) = overrun {
            let _ = call.await;
            tracing::debug!(subscription = %subscription.id, "Overrunning callback finished");
        }
    }
    tracing::trace!(subscription = %subscription.id, "Delivery task stopped");
}

fn record(
    inner: &BusInner,
    subscription: &Subscription,
    event: &ConfigEvent,
    result: Result<(), CallbackError>,
) {
    subscription.record_trigger();
    let c = &inner.counters;
    match result {
        Ok(()) => {
            c.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            subscription.record_failure();
            c.failed.fetch_add(1, Ordering::Relaxed);
            match e {
                CallbackError::Panicked(_) => c.panicked.fetch_add(1, Ordering::Relaxed),
                CallbackError::TimedOut(_) => c.timed_out.fetch_add(1, Ordering::Relaxed),
                CallbackError::Failed(_) => 0,
            };
            metrics::record_callback_failure(e.kind());
            tracing::warn!(
                subscription = %subscription.id,
                event_type = %event.event_type(),
                key = event.routing_key(),
                error = %e,
                "Subscriber callback failed"
            );
        }
    }
}

type CallOutcome = std::thread::Result<Result<(), CallbackError>>;

/// Run one callback on the blocking pool, converting panics and overruns into errors.
///
/// On timeout the still-running call is handed back so the caller can wait for it.
async fn invoke(
    handler: Arc<dyn EventHandler>,
    event: Arc<ConfigEvent>,
    callback_timeout: Duration,
) -> (Result<(), CallbackError>, Option<JoinHandle<CallOutcome>>) {
    let mut call = tokio::task::spawn_blocking(move || {
        std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event)))
    });

    match tokio::time::timeout(callback_timeout, &mut call).await {
        Ok(joined) => (flatten(joined), None),
        Err(_) => (Err(CallbackError::TimedOut(callback_timeout)), Some(call)),
    }
}

fn flatten(joined: Result<CallOutcome, JoinError>) -> Result<(), CallbackError> {
    match joined {
        Err(join_error) => Err(CallbackError::Panicked(join_error.to_string())),
        Ok(Err(payload)) => Err(CallbackError::Panicked(panic_message(payload.as_ref()))),
        Ok(Ok(result)) => result,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConfigValue;
    use std::sync::Mutex;
    use std::time::Instant;

    fn config() -> EventBusConfig {
        EventBusConfig {
            queue_capacity: 64,
            subscriber_queue_capacity: 64,
            callback_timeout_ms: 200,
        }
    }

    fn changed(key: &str, value: i64) -> ConfigEvent {
        ConfigEvent::changed(key, None, ConfigValue::Integer(value))
    }

    fn recording(seen: &Arc<Mutex<Vec<i64>>>, event: &ConfigEvent) {
        if let ConfigEvent::Changed { new_value, .. } = event {
            if let Some(v) = new_value.as_i64() {
                seen.lock().unwrap().push(v);
            }
        }
    }

    #[tokio::test]
    async fn test_delivers_in_publication_order() {
        let bus = EventBus::start(&config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(EventType::Changed, "counter", move |e: &ConfigEvent| {
            recording(&sink, e);
            Ok(())
        });

        for i in 0..20 {
            assert!(bus.publish(changed("counter", i)));
        }
        bus.shutdown(Duration::from_secs(2)).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
        assert_eq!(bus.stats().delivered, 20);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let bus = EventBus::start(&config());
        let ok_calls = Arc::new(AtomicU64::new(0));
        let counter = ok_calls.clone();

        let panicking = bus.subscribe(
            EventType::Changed,
            "*",
            |_: &ConfigEvent| -> Result<(), CallbackError> { panic!("subscriber bug") },
        );
        let failing = bus.subscribe(EventType::Changed, "*", |_: &ConfigEvent| {
            Err(CallbackError::Failed("rejected".into()))
        });
        bus.subscribe(EventType::Changed, "*", move |_: &ConfigEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(changed("a", 1));
        bus.publish(changed("b", 2));
        bus.shutdown(Duration::from_secs(2)).await.unwrap();

        assert_eq!(ok_calls.load(Ordering::SeqCst), 2);
        assert_eq!(bus.subscription(panicking).unwrap().failure_count, 2);
        assert_eq!(bus.subscription(failing).unwrap().failure_count, 2);
        let stats = bus.stats();
        assert_eq!(stats.failed, 4);
        assert_eq!(stats.panicked, 2);
    }

    #[tokio::test]
    async fn test_slow_callback_times_out() {
        let bus = EventBus::start(&config());
        let id = bus.subscribe(EventType::Changed, "*", |_: &ConfigEvent| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });

        bus.publish(changed("slow", 1));
        bus.shutdown(Duration::from_secs(2)).await.unwrap();

        assert_eq!(bus.stats().timed_out, 1);
        assert_eq!(bus.subscription(id).unwrap().failure_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_subscriber_does_not_delay_others() {
        let bus = EventBus::start(&EventBusConfig {
            callback_timeout_ms: 2_000,
            ..config()
        });
        bus.subscribe(EventType::Changed, "*", |_: &ConfigEvent| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        let arrived = Arc::new(Mutex::new(None));
        let slot = arrived.clone();
        bus.subscribe(EventType::Changed, "*", move |_: &ConfigEvent| {
            *slot.lock().unwrap() = Some(Instant::now());
            Ok(())
        });

        let sent = Instant::now();
        assert!(bus.publish(changed("shared", 1)));
        bus.shutdown(Duration::from_secs(3)).await.unwrap();

        let latency = arrived.lock().unwrap().unwrap().duration_since(sent);
        assert!(latency < Duration::from_millis(200), "fast subscriber waited {:?}", latency);
        assert_eq!(bus.stats().delivered, 2);
    }

    #[tokio::test]
    async fn test_timed_out_call_finishes_before_next_event() {
        let bus = EventBus::start(&EventBusConfig {
            callback_timeout_ms: 100,
            ..config()
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(EventType::Changed, "ordered", move |e: &ConfigEvent| {
            let first = matches!(
                e,
                ConfigEvent::Changed { new_value, .. } if new_value.as_i64() == Some(1)
            );
            if first {
                std::thread::sleep(Duration::from_millis(300));
            }
            recording(&sink, e);
            Ok(())
        });

        assert!(bus.publish(changed("ordered", 1)));
        assert!(bus.publish(changed("ordered", 2)));
        bus.shutdown(Duration::from_secs(2)).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        let stats = bus.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_full_subscriber_queue_drops_events() {
        let bus = EventBus::start(&EventBusConfig {
            queue_capacity: 16,
            subscriber_queue_capacity: 1,
            callback_timeout_ms: 2_000,
        });
        let started = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (flag, gate, sink) = (started.clone(), release.clone(), seen.clone());
        let id = bus.subscribe(EventType::Changed, "*", move |e: &ConfigEvent| {
            flag.store(true, Ordering::SeqCst);
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            recording(&sink, e);
            Ok(())
        });

        assert!(bus.publish(changed("burst", 1)));
        let deadline = Instant::now() + Duration::from_secs(2);
        while !started.load(Ordering::SeqCst) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(started.load(Ordering::SeqCst));

        // Event 2 fills the one-slot queue; 3 and 4 are dropped.
        for i in 2..=4 {
            assert!(bus.publish(changed("burst", i)));
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        while bus.stats().subscriber_queue_full < 2 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        release.store(true, Ordering::SeqCst);
        bus.shutdown(Duration::from_secs(2)).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(bus.stats().subscriber_queue_full, 2);
        assert_eq!(bus.subscription(id).unwrap().dropped_count, 2);
    }

    #[tokio::test]
    async fn test_paused_subscription_is_skipped() {
        let bus = EventBus::start(&config());
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let id = bus.subscribe(EventType::Changed, "*", move |_: &ConfigEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.pause(id));
        bus.publish(changed("a", 1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bus.resume(id));
        bus.publish(changed("a", 2));
        bus.shutdown(Duration::from_secs(2)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!bus.pause(SubscriptionId::new_v4()));
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_rejected() {
        let bus = EventBus::start(&config());
        bus.shutdown(Duration::from_secs(1)).await.unwrap();

        assert!(!bus.publish(changed("late", 1)));
        assert_eq!(bus.stats().rejected, 1);
        // A second shutdown is a no-op.
        bus.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_fails_fast() {
        let bus = EventBus::start(&EventBusConfig {
            queue_capacity: 1,
            subscriber_queue_capacity: 1,
            callback_timeout_ms: 1_000,
        });

        // current_thread runtime: the dispatcher cannot run between these calls.
        assert!(bus.publish(changed("a", 1)));
        assert!(!bus.publish(changed("a", 2)));
        assert_eq!(bus.stats().queue_full, 1);
        bus.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}
