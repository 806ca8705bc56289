mod common;

use awsmessaging::app::messaging::{
    AlarmForQueueRequest, AlarmState, MessagingError, MessagingService, ResourceAttributes,
};
use common::{event_names, record, Harness};
use pretty_assertions::assert_eq;
use serde_json::json;

const ALERTS_ARN: &str = "arn:aws:sns:us-east-1:123456789012:alerts";

#[tokio::test]
async fn test_create_alarm_on_queue_metric() {
    let h = Harness::idle();
    let queue = h
        .queues()
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    let alarms = h.alarms();
    let events = record(alarms.core().events(), "**");

    let alarm = alarms
        .create_alarm(&queue, "NumberOfMessagesReceived", 60, 5, 1.0, ALERTS_ARN)
        .await
        .unwrap();

    assert_eq!(alarm.name, "ordersNumberOfMessagesReceivedAlarm");
    assert_eq!(
        alarm.arn.as_deref(),
        Some("arn:aws:cloudwatch:us-east-1:123456789012:alarm:ordersNumberOfMessagesReceivedAlarm")
    );

    let stored = h
        .cloud
        .alarm_attributes("ordersNumberOfMessagesReceivedAlarm")
        .unwrap();
    let attr = |key: &str| stored.get(key).map(String::as_str);
    assert_eq!(attr("Namespace"), Some("AWS/SQS"));
    assert_eq!(attr("MetricName"), Some("NumberOfMessagesReceived"));
    assert_eq!(attr("DimensionName"), Some("QueueName"));
    assert_eq!(attr("DimensionValue"), Some("orders"));
    assert_eq!(attr("Period"), Some("60"));
    assert_eq!(attr("EvaluationPeriods"), Some("5"));
    assert_eq!(attr("Threshold"), Some("1"));
    assert_eq!(attr("AlarmActions"), Some(ALERTS_ARN));
    assert_eq!(attr("ComparisonOperator"), Some("GreaterThanOrEqualToThreshold"));
    assert_eq!(attr("Statistic"), Some("Sum"));

    assert_eq!(event_names(&events), vec!["AWS.Alarm.Created"]);
    assert_eq!(
        events.lock().unwrap()[0].payload,
        vec![json!("ordersNumberOfMessagesReceivedAlarm")]
    );
}

#[tokio::test]
async fn test_topic_alarm_uses_sns_namespace() {
    let h = Harness::idle();
    let topic = h
        .topics()
        .create_topic("alerts", &ResourceAttributes::new())
        .await
        .unwrap();

    let alarm = h
        .alarms()
        .create_alarm(&topic, "NumberOfNotificationsFailed", 300, 1, 3.0, ALERTS_ARN)
        .await
        .unwrap();

    let stored = h.cloud.alarm_attributes(&alarm.name).unwrap();
    assert_eq!(stored.get("Namespace").map(String::as_str), Some("AWS/SNS"));
    assert_eq!(stored.get("DimensionName").map(String::as_str), Some("TopicName"));
}

#[tokio::test]
async fn test_alarm_for_missing_queue_is_not_found() {
    let h = Harness::idle();
    let request: AlarmForQueueRequest = serde_json::from_value(json!({
        "queue": "ghost",
        "metric": "NumberOfMessagesSent",
        "topic": "alerts",
    }))
    .unwrap();

    let err = h.alarms().create_alarm_for_queue(&request).await.unwrap_err();

    assert!(matches!(err, MessagingError::NotFound { ref name, .. } if name == "ghost"));
    assert!(h.cloud.topic_names().is_empty());
    assert!(h.cloud.alarm_names().is_empty());
}

#[tokio::test]
async fn test_alarm_for_queue_workflow_wires_notifications() {
    let h = Harness::idle();
    h.queues()
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    let request: AlarmForQueueRequest = serde_json::from_value(json!({
        "queue": "orders",
        "metric": "ApproximateNumberOfMessagesVisible",
        "period": 60,
        "evalPeriod": 2,
        "threshold": 100.0,
        "topic": "alerts",
        "notifications": {
            "emails": ["ops@example.com"],
            "https": ["https://hooks.example.com/alarm"],
        },
    }))
    .unwrap();
    let events = record(h.manager.events(), "AWS.*.*");

    let alarm = h.alarms().create_alarm_for_queue(&request).await.unwrap();

    assert_eq!(alarm.name, "ordersApproximateNumberOfMessagesVisibleAlarm");
    let mut subscribed = h.cloud.topic_subscriptions("alerts");
    subscribed.sort();
    assert_eq!(
        subscribed,
        vec![
            ("email".to_string(), "ops@example.com".to_string()),
            ("https".to_string(), "https://hooks.example.com/alarm".to_string()),
        ]
    );
    let stored = h.cloud.alarm_attributes(&alarm.name).unwrap();
    assert_eq!(stored.get("AlarmActions").map(String::as_str), Some(ALERTS_ARN));
    assert_eq!(stored.get("EvaluationPeriods").map(String::as_str), Some("2"));
    assert_eq!(
        event_names(&events),
        vec![
            "AWS.Topic.Created",
            "AWS.Topic.Subscribed",
            "AWS.Topic.Subscribed",
            "AWS.Alarm.Created",
        ]
    );
}

#[tokio::test]
async fn test_failed_notification_subscribe_does_not_block_alarm() {
    let h = Harness::idle();
    h.queues()
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    h.cloud.fail("SNS:Subscribe", "denied");
    let request: AlarmForQueueRequest = serde_json::from_value(json!({
        "queue": "orders",
        "metric": "NumberOfMessagesSent",
        "topic": "alerts",
        "notifications": { "sms": ["+15550100"] },
    }))
    .unwrap();

    let alarm = h.alarms().create_alarm_for_queue(&request).await.unwrap();

    assert_eq!(h.cloud.alarm_names(), vec![alarm.name]);
    assert!(h.cloud.topic_subscriptions("alerts").is_empty());
}

#[tokio::test]
async fn test_set_state_and_describe() {
    let h = Harness::idle();
    let queue = h
        .queues()
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    let alarms = h.alarms();
    let alarm = alarms
        .create_alarm(&queue, "NumberOfMessagesSent", 60, 1, 1.0, ALERTS_ARN)
        .await
        .unwrap();
    assert_eq!(h.cloud.alarm_state(&alarm.name), Some(AlarmState::InsufficientData));

    let state: AlarmState = "on".parse().unwrap();
    assert!(alarms
        .set_state(&alarm.name, state, "manual test", Some(r#"{"source":"test"}"#))
        .await
        .unwrap());

    assert_eq!(h.cloud.alarm_state(&alarm.name), Some(AlarmState::Alarm));
    let described = alarms.describe_alarm(&alarm.name).await.unwrap();
    assert_eq!(described.get("StateValue").map(String::as_str), Some("ALARM"));
    assert_eq!(described.get("StateReason").map(String::as_str), Some("manual test"));
}

#[tokio::test]
async fn test_set_state_rejects_non_json_reason_data() {
    let h = Harness::idle();
    let queue = h
        .queues()
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    let alarms = h.alarms();
    let alarm = alarms
        .create_alarm(&queue, "NumberOfMessagesSent", 60, 1, 1.0, ALERTS_ARN)
        .await
        .unwrap();

    let err = alarms
        .set_state(&alarm.name, AlarmState::Ok, "manual", Some("not json"))
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::InvalidArgument(_)));
    assert_eq!(h.cloud.alarm_state(&alarm.name), Some(AlarmState::InsufficientData));
}

#[tokio::test]
async fn test_describe_unknown_alarm_is_not_found() {
    let h = Harness::idle();
    assert!(h.alarms().describe_alarm("nope").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_alarm() {
    let h = Harness::idle();
    let queue = h
        .queues()
        .create_queue("orders", &ResourceAttributes::new())
        .await
        .unwrap();
    let alarms = h.alarms();
    let alarm = alarms
        .create_alarm(&queue, "NumberOfMessagesSent", 60, 1, 1.0, ALERTS_ARN)
        .await
        .unwrap();

    assert!(alarms.delete_alarm(&alarm.name).await.unwrap());
    assert!(h.cloud.alarm_names().is_empty());
    assert_eq!(alarms.get_alarm_info(&alarm.name).await.unwrap(), None);
}
