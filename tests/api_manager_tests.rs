//! Service lookup, event aggregation and teardown on the manager.

mod common;

use awsmessaging::app::messaging::{
    AlarmClient, MessagingService, QueueClient, ResourceAttributes, TopicClient,
};
use common::{config_with_interval, event_names, record, Harness};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_manager_bus_sees_client_events_unchanged() {
    let h = Harness::idle();
    let all = record(h.manager.events(), "AWS.**");
    let direct = record(h.queues().core().events(), "**");

    h.queues()
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    h.topics()
        .create_topic("alerts", &ResourceAttributes::new())
        .await
        .unwrap();

    assert_eq!(event_names(&all), vec!["AWS.Queue.Created", "AWS.Topic.Created"]);
    assert_eq!(all.lock().unwrap()[0].payload, vec![json!("orders")]);
    assert_eq!(event_names(&direct), vec!["AWS.Queue.Created"]);
}

#[tokio::test]
async fn test_lifecycle_events_do_not_fire_resource_changed() {
    let h = Harness::idle();
    let changed = record(h.manager.events(), "AWS.Resource.Changed");

    h.queues()
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    h.queues().delete_queue("orders").await.unwrap();

    assert!(changed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_service_by_name() {
    let h = Harness::idle();

    assert_eq!(h.manager.service_names(), vec!["SQS", "SNS", "CloudWatch"]);
    assert_eq!(h.manager.get_service("SNS").unwrap().name(), "SNS");
    assert_eq!(h.manager.get_service("cloudwatch").unwrap().name(), "CloudWatch");
    assert!(h.manager.get_service("Kinesis").is_none());

    assert!(h.manager.service::<QueueClient>("SQS").is_some());
    assert!(h.manager.service::<TopicClient>("SQS").is_none());
}

#[tokio::test]
async fn test_unknown_services_are_skipped() {
    let mut config = config_with_interval(0);
    config.app_settings.services = vec!["sqsclient".into(), "Kinesis".into()];
    let h = Harness::new(&config);

    assert_eq!(h.manager.service_names(), vec!["SQS"]);
    assert!(h.manager.first_of::<QueueClient>().is_some());
    assert!(h.manager.first_of::<TopicClient>().is_none());
    assert!(h.manager.first_of::<AlarmClient>().is_none());
}

#[tokio::test]
async fn test_workflows_need_their_sibling_services() {
    let mut config = config_with_interval(0);
    config.app_settings.services = vec!["SNS".into()];
    let h = Harness::new(&config);

    let err = h
        .topics()
        .subscribe_topic_to_queue("alerts", "orders")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown service: SQS");
}

#[tokio::test]
async fn test_dispose_forgets_services() {
    let h = Harness::idle();
    let queues = h.queues();

    h.manager.dispose();

    assert!(h.manager.service_names().is_empty());
    assert!(h.manager.get_service("SQS").is_none());
    // A client still held elsewhere keeps working against its cache.
    queues
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    assert!(queues.core().cache().contains("orders"));
}
