//! Drift detection against the in-memory cloud, on a paused clock.

mod common;

use awsmessaging::app::messaging::{MessagingService, ResourceAttributes, ResourceKind};
use common::{config_with_interval, record, Harness};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

async fn seconds(n: u64) {
    tokio::time::sleep(Duration::from_secs(n)).await;
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_names_keep_the_snapshot() {
    let h = Harness::new(&config_with_interval(30));
    let queues = h.queues();
    for name in ["A", "B"] {
        queues.create_queue(name, &Default::default()).await.unwrap();
    }
    let changed = record(h.manager.events(), "AWS.Resource.Changed");
    let before = queues.core().current_map();

    seconds(31).await;

    assert_eq!(h.cloud.calls("SQS:ListQueues"), 1);
    assert!(changed.lock().unwrap().is_empty());
    assert!(Arc::ptr_eq(&before, &queues.core().current_map()));
}

#[tokio::test(start_paused = true)]
async fn test_drift_swaps_cache_and_fires_once() {
    let h = Harness::new(&config_with_interval(30));
    let queues = h.queues();
    for name in ["A", "B"] {
        queues.create_queue(name, &Default::default()).await.unwrap();
    }
    let changed = record(h.manager.events(), "AWS.Resource.Changed");

    h.cloud.remove_queue("B");
    h.cloud.seed_queue("C");
    seconds(31).await;

    {
        let events = changed.lock().unwrap();
        assert_eq!(events.len(), 1);
        let payload = &events[0].payload;
        assert_eq!(payload[0], json!("Queue"));
        assert_eq!(payload[1], json!("SQS"));
        let keys: BTreeSet<_> = payload[2].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, BTreeSet::from(["A".to_string(), "C".to_string()]));
    }
    assert!(queues.core().cache().contains("C"));
    assert!(!queues.core().cache().contains("B"));

    // Converged: the next cycle sees the same names and stays quiet.
    seconds(30).await;
    assert_eq!(changed.lock().unwrap().len(), 1);
    assert_eq!(h.cloud.calls("SQS:ListQueues"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_never_polls() {
    let h = Harness::new(&config_with_interval(0));
    h.cloud.seed_queue("outside");

    seconds(3600).await;

    assert_eq!(h.cloud.calls("SQS:ListQueues"), 0);
    let watcher = h.context.existing_watcher(ResourceKind::Queue).unwrap();
    assert!(!watcher.is_running());
    assert_eq!(watcher.interval_secs(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_negative_interval_never_polls() {
    let h = Harness::new(&config_with_interval(-1));
    h.cloud.seed_queue("outside");

    seconds(3600).await;

    assert_eq!(h.cloud.calls("SQS:ListQueues"), 0);
    let watcher = h.context.existing_watcher(ResourceKind::Queue).unwrap();
    assert!(!watcher.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_keeps_polling() {
    let h = Harness::new(&config_with_interval(30));
    let changed = record(h.manager.events(), "AWS.Resource.Changed");
    h.cloud.fail("SQS:ListQueues", "throttled");

    seconds(31).await;
    assert_eq!(h.cloud.calls("SQS:ListQueues"), 1);
    assert!(h.queues().core().cache().is_empty());

    h.cloud.clear_failure("SQS:ListQueues");
    h.cloud.seed_queue("late");
    seconds(30).await;

    assert_eq!(h.cloud.calls("SQS:ListQueues"), 2);
    assert!(h.queues().core().cache().contains("late"));
    assert_eq!(changed.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_one_watcher_per_kind() {
    let h = Harness::new(&config_with_interval(30));
    let watcher = h.queues().core().watcher().cloned().unwrap();
    let shared = h.context.existing_watcher(ResourceKind::Queue).unwrap();
    assert!(Arc::ptr_eq(&watcher, &shared));
    assert!(watcher.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_dispose_is_idempotent_and_stops_polling() {
    let h = Harness::new(&config_with_interval(30));
    let watcher = h.context.existing_watcher(ResourceKind::Queue).unwrap();

    h.manager.dispose();
    watcher.dispose();
    h.context.dispose();
    assert!(!watcher.is_running());

    h.cloud.seed_queue("ignored");
    seconds(120).await;
    assert_eq!(h.cloud.calls("SQS:ListQueues"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_poll_once_reports_swaps() {
    let h = Harness::new(&config_with_interval(0));
    let watcher = h.context.existing_watcher(ResourceKind::Queue).unwrap();

    assert!(!watcher.poll_once().await.unwrap());
    h.cloud.seed_queue("fresh");
    assert!(watcher.poll_once().await.unwrap());
    assert!(h.queues().core().cache().contains("fresh"));
}

#[tokio::test(start_paused = true)]
async fn test_create_during_poll_is_not_dropped() {
    let h = Harness::new(&config_with_interval(0));
    let watcher = h.context.existing_watcher(ResourceKind::Queue).unwrap();
    let queues = h.queues();
    h.cloud.seed_queue("outside");
    h.cloud.set_latency(Duration::from_millis(50));

    let attrs = ResourceAttributes::new();
    let (swapped, created) = tokio::join!(watcher.poll_once(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        queues.create_queue("orders", &attrs).await
    });

    assert!(!swapped.unwrap());
    created.unwrap();
    assert!(queues.core().cache().contains("orders"));
    queues.get_queue_info("orders", true).await.unwrap();
    assert_eq!(h.cloud.calls("SQS:CreateQueue"), 1);

    // The next cycle reconciles against a listing that includes the new queue.
    assert!(watcher.poll_once().await.unwrap());
    let cache = queues.core().cache();
    assert!(cache.contains("orders") && cache.contains("outside"));
}
