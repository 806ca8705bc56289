//! Cache-first create/get/delete semantics of the generic service client, driven
//! through the queue client over the in-memory cloud.

mod common;

use awsmessaging::app::messaging::{
    MessagingError, MessagingService, ResourceAttributes, ResourceKind,
};
use common::{event_names, record, Harness};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn no_attributes() -> ResourceAttributes {
    ResourceAttributes::new()
}

#[tokio::test]
async fn test_create_orders_queue_scenario() {
    let h = Harness::idle();
    let queues = h.queues();
    let events = record(queues.core().events(), "**");

    let info = queues.create_queue("orders", &no_attributes()).await.unwrap();

    assert_eq!(info.name, "orders");
    assert_eq!(
        info.arn.as_deref(),
        Some("arn:aws:sqs:us-east-1:123456789012:orders")
    );
    assert_eq!(
        info.url.as_deref(),
        Some("https://sqs.us-east-1.amazonaws.com/123456789012/orders")
    );
    assert!(info.is_live());
    assert!(queues.core().cache().contains("orders"));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "AWS.Queue.Created");
    assert_eq!(events[0].payload, vec![json!("orders")]);
}

#[tokio::test]
async fn test_cache_hit_never_reaches_remote() {
    let h = Harness::idle();
    let queues = h.queues();
    queues.create_queue("orders", &no_attributes()).await.unwrap();
    let creates = h.cloud.calls("SQS:CreateQueue");
    let lookups = h.cloud.calls("SQS:GetQueueAttributes");

    for _ in 0..3 {
        let info = queues.get_queue_info("orders", true).await.unwrap();
        assert_eq!(info.map(|i| i.name), Some("orders".to_string()));
    }

    assert_eq!(h.cloud.calls("SQS:CreateQueue"), creates);
    assert_eq!(h.cloud.calls("SQS:GetQueueAttributes"), lookups);
}

#[tokio::test]
async fn test_sequential_creates_issue_one_remote_call() {
    let h = Harness::idle();
    let queues = h.queues();

    let first = queues.create_queue("orders", &no_attributes()).await.unwrap();
    let second = queues.create_queue("orders", &no_attributes()).await.unwrap();

    assert_eq!(first.arn, second.arn);
    assert_eq!(h.cloud.calls("SQS:CreateQueue"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_creates_are_single_flight() {
    let h = Harness::idle();
    h.cloud.set_latency(Duration::from_millis(50));
    let queues = h.queues();
    let events = record(queues.core().events(), "AWS.Queue.Created");

    let attrs = no_attributes();
    let (a, b, c) = tokio::join!(
        queues.create_queue("orders", &attrs),
        queues.create_queue("orders", &attrs),
        queues.create_queue("orders", &attrs),
    );

    let arns: BTreeSet<_> = [a, b, c]
        .into_iter()
        .map(|r| r.unwrap().arn.unwrap())
        .collect();
    assert_eq!(arns.len(), 1);
    assert_eq!(h.cloud.calls("SQS:CreateQueue"), 1);
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_create_queued_behind_delete_recreates() {
    let h = Harness::idle();
    let queues = h.queues();
    queues.create_queue("orders", &no_attributes()).await.unwrap();
    h.cloud.set_latency(Duration::from_millis(50));
    let events = record(queues.core().events(), "AWS.Queue.*");

    let attrs = no_attributes();
    let (deleted, created) = tokio::join!(queues.delete_queue("orders"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        queues.create_queue("orders", &attrs).await
    });

    assert!(deleted.unwrap());
    assert!(created.unwrap().is_live());
    assert!(queues.core().cache().contains("orders"));
    assert_eq!(h.cloud.queue_names(), vec!["orders".to_string()]);
    assert_eq!(h.cloud.calls("SQS:CreateQueue"), 2);
    assert_eq!(
        event_names(&events),
        vec!["AWS.Queue.Deleted", "AWS.Queue.Created"]
    );
}

#[tokio::test]
async fn test_get_info_without_create_resolves_none() {
    let h = Harness::idle();
    let queues = h.queues();

    assert_eq!(queues.get_queue_info("missing", false).await.unwrap(), None);
    assert_eq!(h.cloud.calls("SQS:CreateQueue"), 0);
    assert!(h.cloud.queue_names().is_empty());
}

#[tokio::test]
async fn test_get_info_creates_when_missing() {
    let h = Harness::idle();
    let queues = h.queues();

    let info = queues.get_queue_info("jobs", true).await.unwrap().unwrap();
    assert_eq!(info.name, "jobs");
    assert_eq!(h.cloud.queue_names(), vec!["jobs".to_string()]);
}

#[tokio::test]
async fn test_delete_unknown_name_fails_without_remote_call() {
    let h = Harness::idle();
    h.cloud.seed_queue("ghost");
    let queues = h.queues();

    let err = queues.delete_queue("ghost").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Queue 'ghost' was not found");
    assert_eq!(h.cloud.calls("SQS:DeleteQueue"), 0);
    assert_eq!(h.cloud.queue_names(), vec!["ghost".to_string()]);
}

#[tokio::test]
async fn test_delete_removes_and_emits() {
    let h = Harness::idle();
    let queues = h.queues();
    queues.create_queue("orders", &no_attributes()).await.unwrap();
    let events = record(queues.core().events(), "AWS.Queue.*");

    assert!(queues.delete_queue("orders").await.unwrap());

    assert!(!queues.core().cache().contains("orders"));
    assert!(h.cloud.queue_names().is_empty());
    assert_eq!(event_names(&events), vec!["AWS.Queue.Deleted"]);
    assert_eq!(events.lock().unwrap()[0].payload, vec![json!("orders")]);
}

#[tokio::test]
async fn test_remote_create_failure_leaves_cache_unchanged() {
    let h = Harness::idle();
    h.cloud.fail("SQS:CreateQueue", "boom");
    let queues = h.queues();
    let events = record(queues.core().events(), "**");

    let err = queues.create_queue("orders", &no_attributes()).await.unwrap_err();

    match err {
        MessagingError::Remote(remote) => {
            assert_eq!(remote.operation, "CreateQueue");
            assert_eq!(remote.code, "InjectedFailure");
            assert_eq!(remote.resource.as_deref(), Some("orders"));
        }
        other => panic!("expected a remote error, got {:?}", other),
    }
    assert!(queues.core().cache().is_empty());
    assert!(events.lock().unwrap().is_empty());

    // The failure is not sticky: the next attempt goes to the remote again.
    h.cloud.clear_failure("SQS:CreateQueue");
    queues.create_queue("orders", &no_attributes()).await.unwrap();
    assert_eq!(h.cloud.calls("SQS:CreateQueue"), 2);
}

#[tokio::test]
async fn test_remote_delete_failure_keeps_entry() {
    let h = Harness::idle();
    let queues = h.queues();
    queues.create_queue("orders", &no_attributes()).await.unwrap();
    h.cloud.fail("SQS:DeleteQueue", "denied");

    assert!(queues.delete_queue("orders").await.is_err());
    assert!(queues.core().cache().contains("orders"));
}

#[tokio::test]
async fn test_create_merges_default_attributes() {
    let h = Harness::idle();
    let queues = h.queues();

    queues.create_queue("slow", &no_attributes()).await.unwrap();
    let mut overrides = no_attributes();
    overrides.insert("MessageRetentionPeriod".into(), "60".into());
    overrides.insert("Name".into(), "ignored".into());
    queues.create_queue("fast", &overrides).await.unwrap();

    let slow = h.cloud.queue_attributes("slow").unwrap();
    assert_eq!(slow.get("MessageRetentionPeriod").map(String::as_str), Some("120"));
    assert_eq!(
        slow.get("ReceiveMessageWaitTimeSeconds").map(String::as_str),
        Some("10")
    );

    let fast = h.cloud.queue_attributes("fast").unwrap();
    assert_eq!(fast.get("MessageRetentionPeriod").map(String::as_str), Some("60"));
    assert!(!fast.contains_key("Name"));
}

#[tokio::test]
async fn test_get_all_info_skips_entries_whose_attributes_fail() {
    let h = Harness::idle();
    for name in ["a", "b", "c"] {
        h.cloud.seed_queue(name);
    }
    h.cloud.fail_attributes_for("b");
    let queues = h.queues();

    let map = queues.core().get_all_info().await.unwrap();

    let keys: BTreeSet<_> = map.keys().cloned().collect();
    assert_eq!(keys, BTreeSet::from(["a".to_string(), "c".to_string()]));
    assert_eq!(
        map["a"].arn.as_deref(),
        Some("arn:aws:sqs:us-east-1:123456789012:a")
    );
    // get_all_info builds a map; it does not touch the cache
    assert!(queues.core().cache().is_empty());
}

#[tokio::test]
async fn test_list_all_fails_when_listing_fails() {
    let h = Harness::idle();
    h.cloud.fail("SQS:ListQueues", "throttled");

    assert!(h.queues().list_queues().await.is_err());
    assert!(h.queues().core().get_all_info().await.is_err());
}

#[tokio::test]
async fn test_preload_fills_empty_caches_quietly() {
    let h = Harness::idle();
    h.cloud.seed_queue("existing");
    h.cloud.seed_topic("alerts");
    let changed = record(h.manager.events(), "AWS.Resource.Changed");

    h.manager.preload().await;

    assert!(h.queues().core().cache().contains("existing"));
    assert!(h.topics().core().cache().contains("alerts"));
    assert!(changed.lock().unwrap().is_empty());

    // A populated cache is left alone.
    h.cloud.seed_queue("later");
    h.manager.preload().await;
    assert!(!h.queues().core().cache().contains("later"));
    assert_eq!(h.cloud.calls("SQS:ListQueues"), 1);
}

#[tokio::test]
async fn test_clients_of_one_kind_share_a_cache() {
    let h = Harness::idle();
    let shared = h.context.cache_for(ResourceKind::Queue);
    assert!(Arc::ptr_eq(&shared, h.queues().core().cache()));

    h.queues().create_queue("orders", &no_attributes()).await.unwrap();
    assert!(shared.contains("orders"));
}
