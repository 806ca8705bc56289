//! In-memory stand-in for SQS, SNS and CloudWatch.
//!
//! Used when `appSettings.mocking` is on and by the test suite. One [`MockCloud`]
//! is shared by the three mock providers so that, like the real services, an SNS
//! publish to a topic with an `sqs` subscription lands in the subscribed queue.
//!
//! Besides the provider-facing operations the cloud exposes helpers to seed or
//! remove resources behind the cache's back, count calls per operation, inject
//! failures and add latency.

mod providers;

pub use providers::{MockAlarmProvider, MockQueueProvider, MockTopicProvider};

use crate::app::messaging::alarm::AlarmState;
use crate::app::messaging::errors::{MessagingResult, RemoteError};
use crate::app::messaging::queue::{QueueMessage, ReceiveOptions};
use crate::app::messaging::resource_info::ResourceAttributes;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
}

#[derive(Debug, Clone, Default)]
struct MockQueue {
    url: String,
    arn: String,
    attributes: ResourceAttributes,
    messages: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
    permissions: BTreeMap<String, (Vec<String>, Vec<String>)>,
}

#[derive(Debug, Clone, Default)]
struct MockTopic {
    arn: String,
    attributes: ResourceAttributes,
    subscriptions: BTreeMap<String, (String, String)>,
}

#[derive(Debug, Clone)]
struct MockAlarm {
    arn: String,
    attributes: ResourceAttributes,
    state: AlarmState,
    reason: String,
}

#[derive(Debug, Default)]
struct MockState {
    queues: BTreeMap<String, MockQueue>,
    topics: BTreeMap<String, MockTopic>,
    alarms: BTreeMap<String, MockAlarm>,
    calls: HashMap<String, usize>,
    failures: HashMap<String, String>,
    attribute_failures: HashSet<String>,
    latency: Duration,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::new_v4())
    }
}

/// The shared in-memory account.
#[derive(Debug)]
pub struct MockCloud {
    region: String,
    account_id: String,
    state: Mutex<MockState>,
}

impl MockCloud {
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn queue_url(&self, name: &str) -> String {
        format!(
            "https://sqs.{}.amazonaws.com/{}/{}",
            self.region, self.account_id, name
        )
    }

    pub fn queue_arn(&self, name: &str) -> String {
        format!("arn:aws:sqs:{}:{}:{}", self.region, self.account_id, name)
    }

    pub fn topic_arn(&self, name: &str) -> String {
        format!("arn:aws:sns:{}:{}:{}", self.region, self.account_id, name)
    }

    pub fn alarm_arn(&self, name: &str) -> String {
        format!(
            "arn:aws:cloudwatch:{}:{}:alarm:{}",
            self.region, self.account_id, name
        )
    }

    // ------------------------------------------------------------------------
    // Test controls
    // ------------------------------------------------------------------------

    /// Number of calls made to `operation`, e.g. `"SQS:CreateQueue"`.
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Make every call to `operation` fail with `message` until cleared.
    pub fn fail(&self, operation: &str, message: &str) {
        self.lock()
            .failures
            .insert(operation.to_string(), message.to_string());
    }

    pub fn clear_failure(&self, operation: &str) {
        self.lock().failures.remove(operation);
    }

    /// Make attribute lookups for the named resource fail.
    pub fn fail_attributes_for(&self, name: &str) {
        self.lock().attribute_failures.insert(name.to_string());
    }

    /// Delay applied to every provider call.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn latency(&self) -> Duration {
        self.lock().latency
    }

    /// Create a queue directly, as if someone else made it.
    pub fn seed_queue(&self, name: &str) {
        let (url, arn) = (self.queue_url(name), self.queue_arn(name));
        let mut state = self.lock();
        state
            .queues
            .entry(name.to_string())
            .or_insert_with(|| new_queue(url, arn, &ResourceAttributes::new()));
    }

    pub fn remove_queue(&self, name: &str) -> bool {
        self.lock().queues.remove(name).is_some()
    }

    pub fn seed_topic(&self, name: &str) {
        let arn = self.topic_arn(name);
        let mut state = self.lock();
        state
            .topics
            .entry(name.to_string())
            .or_insert_with(|| new_topic(arn, &ResourceAttributes::new()));
    }

    pub fn remove_topic(&self, name: &str) -> bool {
        self.lock().topics.remove(name).is_some()
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.lock().queues.keys().cloned().collect()
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.lock().topics.keys().cloned().collect()
    }

    pub fn alarm_names(&self) -> Vec<String> {
        self.lock().alarms.keys().cloned().collect()
    }

    /// Messages waiting (not in flight) on a queue.
    pub fn queue_depth(&self, name: &str) -> usize {
        self.lock()
            .queues
            .get(name)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Messages received but not yet deleted.
    pub fn in_flight(&self, name: &str) -> usize {
        self.lock()
            .queues
            .get(name)
            .map(|q| q.in_flight.len())
            .unwrap_or(0)
    }

    pub fn queue_attributes(&self, name: &str) -> Option<ResourceAttributes> {
        self.lock().queues.get(name).map(|q| q.attributes.clone())
    }

    pub fn permission_labels(&self, name: &str) -> Vec<String> {
        self.lock()
            .queues
            .get(name)
            .map(|q| q.permissions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `(protocol, endpoint)` for each subscription on a topic.
    pub fn topic_subscriptions(&self, name: &str) -> Vec<(String, String)> {
        self.lock()
            .topics
            .get(name)
            .map(|t| t.subscriptions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn alarm_state(&self, name: &str) -> Option<AlarmState> {
        self.lock().alarms.get(name).map(|a| a.state)
    }

    pub fn alarm_attributes(&self, name: &str) -> Option<ResourceAttributes> {
        self.lock().alarms.get(name).map(|a| a.attributes.clone())
    }

    // ------------------------------------------------------------------------
    // Provider-facing operations
    // ------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Count the call and apply any injected failure.
    fn enter(&self, service: &str, operation: &str) -> MessagingResult<MutexGuard<'_, MockState>> {
        let key = format!("{}:{}", service, operation);
        let mut state = self.lock();
        *state.calls.entry(key.clone()).or_insert(0) += 1;
        if let Some(message) = state.failures.get(&key) {
            return Err(RemoteError::new(service, operation, "InjectedFailure", message.clone())
                .retryable(true)
                .into());
        }
        Ok(state)
    }

    async fn delay(&self) {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn not_found(service: &str, operation: &str, code: &str, name: &str) -> RemoteError {
        RemoteError::new(service, operation, code, format!("{} does not exist", name))
            .with_resource(name)
    }

    pub(crate) fn create_queue(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<(String, String, ResourceAttributes)> {
        let (url, arn) = (self.queue_url(name), self.queue_arn(name));
        let mut state = self.enter("SQS", "CreateQueue")?;
        let queue = state
            .queues
            .entry(name.to_string())
            .or_insert_with(|| new_queue(url, arn, attributes));
        Ok((queue.url.clone(), queue.arn.clone(), queue.attributes.clone()))
    }

    pub(crate) fn list_queues(&self) -> MessagingResult<Vec<(String, String)>> {
        let state = self.enter("SQS", "ListQueues")?;
        Ok(state
            .queues
            .iter()
            .map(|(name, q)| (name.clone(), q.url.clone()))
            .collect())
    }

    pub(crate) fn queue_attributes_for(&self, name: &str) -> MessagingResult<ResourceAttributes> {
        let state = self.enter("SQS", "GetQueueAttributes")?;
        if state.attribute_failures.contains(name) {
            return Err(RemoteError::new("SQS", "GetQueueAttributes", "AccessDenied", "denied")
                .with_resource(name)
                .into());
        }
        let queue = state.queues.get(name).ok_or_else(|| {
            Self::not_found("SQS", "GetQueueAttributes", "AWS.SimpleQueueService.NonExistentQueue", name)
        })?;
        let mut attrs = queue.attributes.clone();
        attrs.insert(
            "ApproximateNumberOfMessages".into(),
            queue.messages.len().to_string(),
        );
        attrs.insert(
            "ApproximateNumberOfMessagesNotVisible".into(),
            queue.in_flight.len().to_string(),
        );
        Ok(attrs)
    }

    pub(crate) fn set_queue_attributes(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<()> {
        let mut state = self.enter("SQS", "SetQueueAttributes")?;
        let queue = state.queues.get_mut(name).ok_or_else(|| {
            Self::not_found("SQS", "SetQueueAttributes", "AWS.SimpleQueueService.NonExistentQueue", name)
        })?;
        queue
            .attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    pub(crate) fn delete_queue(&self, name: &str) -> MessagingResult<()> {
        let mut state = self.enter("SQS", "DeleteQueue")?;
        state.queues.remove(name).map(|_| ()).ok_or_else(|| {
            Self::not_found("SQS", "DeleteQueue", "AWS.SimpleQueueService.NonExistentQueue", name)
                .into()
        })
    }

    pub(crate) fn send_message(&self, name: &str, body: &str) -> MessagingResult<String> {
        let mut state = self.enter("SQS", "SendMessage")?;
        let id = state.next_id("msg");
        let queue = state.queues.get_mut(name).ok_or_else(|| {
            Self::not_found("SQS", "SendMessage", "AWS.SimpleQueueService.NonExistentQueue", name)
        })?;
        queue.messages.push_back(StoredMessage {
            id: id.clone(),
            body: body.to_string(),
        });
        Ok(id)
    }

    pub(crate) fn receive_messages(
        &self,
        name: &str,
        options: &ReceiveOptions,
    ) -> MessagingResult<Vec<QueueMessage>> {
        let mut state = self.enter("SQS", "ReceiveMessage")?;
        let max = options.max_number_of_messages.unwrap_or(1).clamp(1, 10) as usize;
        let mut receipts = Vec::with_capacity(max);
        for _ in 0..max {
            receipts.push(state.next_id("rcpt"));
        }
        let queue = state.queues.get_mut(name).ok_or_else(|| {
            Self::not_found("SQS", "ReceiveMessage", "AWS.SimpleQueueService.NonExistentQueue", name)
        })?;

        let mut received = Vec::new();
        for receipt in receipts {
            let Some(msg) = queue.messages.pop_front() else {
                break;
            };
            received.push(QueueMessage {
                message_id: msg.id.clone(),
                receipt_handle: receipt.clone(),
                body: msg.body.clone(),
                attributes: ResourceAttributes::new(),
            });
            queue.in_flight.insert(receipt, msg);
        }
        Ok(received)
    }

    pub(crate) fn delete_message(&self, name: &str, receipt_handle: &str) -> MessagingResult<()> {
        let mut state = self.enter("SQS", "DeleteMessage")?;
        let queue = state.queues.get_mut(name).ok_or_else(|| {
            Self::not_found("SQS", "DeleteMessage", "AWS.SimpleQueueService.NonExistentQueue", name)
        })?;
        queue.in_flight.remove(receipt_handle).map(|_| ()).ok_or_else(|| {
            RemoteError::new(
                "SQS",
                "DeleteMessage",
                "ReceiptHandleIsInvalid",
                format!("unknown receipt handle {}", receipt_handle),
            )
            .with_resource(name)
            .into()
        })
    }

    pub(crate) fn purge_queue(&self, name: &str) -> MessagingResult<()> {
        let mut state = self.enter("SQS", "PurgeQueue")?;
        let queue = state.queues.get_mut(name).ok_or_else(|| {
            Self::not_found("SQS", "PurgeQueue", "AWS.SimpleQueueService.NonExistentQueue", name)
        })?;
        queue.messages.clear();
        queue.in_flight.clear();
        Ok(())
    }

    pub(crate) fn add_permission(
        &self,
        name: &str,
        label: &str,
        accounts: &[String],
        actions: &[&str],
    ) -> MessagingResult<()> {
        let mut state = self.enter("SQS", "AddPermission")?;
        let queue = state.queues.get_mut(name).ok_or_else(|| {
            Self::not_found("SQS", "AddPermission", "AWS.SimpleQueueService.NonExistentQueue", name)
        })?;
        queue.permissions.insert(
            label.to_string(),
            (
                accounts.to_vec(),
                actions.iter().map(|a| a.to_string()).collect(),
            ),
        );
        Ok(())
    }

    pub(crate) fn remove_permission(&self, name: &str, label: &str) -> MessagingResult<()> {
        let mut state = self.enter("SQS", "RemovePermission")?;
        let queue = state.queues.get_mut(name).ok_or_else(|| {
            Self::not_found("SQS", "RemovePermission", "AWS.SimpleQueueService.NonExistentQueue", name)
        })?;
        queue.permissions.remove(label).map(|_| ()).ok_or_else(|| {
            RemoteError::new(
                "SQS",
                "RemovePermission",
                "InvalidParameterValue",
                format!("no permission labelled {}", label),
            )
            .with_resource(name)
            .into()
        })
    }

    pub(crate) fn create_topic(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<(String, ResourceAttributes)> {
        let arn = self.topic_arn(name);
        let mut state = self.enter("SNS", "CreateTopic")?;
        let topic = state
            .topics
            .entry(name.to_string())
            .or_insert_with(|| new_topic(arn, attributes));
        Ok((topic.arn.clone(), topic.attributes.clone()))
    }

    pub(crate) fn list_topics(&self) -> MessagingResult<Vec<(String, String)>> {
        let state = self.enter("SNS", "ListTopics")?;
        Ok(state
            .topics
            .iter()
            .map(|(name, t)| (name.clone(), t.arn.clone()))
            .collect())
    }

    pub(crate) fn topic_attributes_for(&self, name: &str) -> MessagingResult<ResourceAttributes> {
        let state = self.enter("SNS", "GetTopicAttributes")?;
        if state.attribute_failures.contains(name) {
            return Err(RemoteError::new("SNS", "GetTopicAttributes", "AuthorizationError", "denied")
                .with_resource(name)
                .into());
        }
        let topic = state
            .topics
            .get(name)
            .ok_or_else(|| Self::not_found("SNS", "GetTopicAttributes", "NotFound", name))?;
        let mut attrs = topic.attributes.clone();
        attrs.insert(
            "SubscriptionsConfirmed".into(),
            topic.subscriptions.len().to_string(),
        );
        Ok(attrs)
    }

    pub(crate) fn delete_topic(&self, name: &str) -> MessagingResult<()> {
        let mut state = self.enter("SNS", "DeleteTopic")?;
        // SNS deletes are idempotent
        state.topics.remove(name);
        Ok(())
    }

    /// Publish to a topic, delivering into every subscribed queue this cloud knows.
    pub(crate) fn publish(
        &self,
        name: &str,
        subject: Option<&str>,
        body: &str,
    ) -> MessagingResult<String> {
        let mut state = self.enter("SNS", "Publish")?;
        let id = state.next_id("sns");
        let topic = state
            .topics
            .get(name)
            .ok_or_else(|| Self::not_found("SNS", "Publish", "NotFound", name))?;

        let envelope = json!({
            "Type": "Notification",
            "MessageId": id,
            "TopicArn": topic.arn,
            "Subject": subject,
            "Message": body,
        })
        .to_string();

        let targets: Vec<String> = topic
            .subscriptions
            .values()
            .filter(|(protocol, _)| protocol == "sqs")
            .map(|(_, endpoint)| endpoint.clone())
            .collect();

        for target in targets {
            let delivery_id = state.next_id("msg");
            if let Some(queue) = state.queues.values_mut().find(|q| q.arn == target) {
                queue.messages.push_back(StoredMessage {
                    id: delivery_id,
                    body: envelope.clone(),
                });
            }
        }
        Ok(id)
    }

    pub(crate) fn subscribe(&self, name: &str, protocol: &str, endpoint: &str) -> MessagingResult<String> {
        let mut state = self.enter("SNS", "Subscribe")?;
        let suffix = state.next_id("sub");
        let topic = state
            .topics
            .get_mut(name)
            .ok_or_else(|| Self::not_found("SNS", "Subscribe", "NotFound", name))?;
        let subscription_arn = format!("{}:{}", topic.arn, suffix);
        topic.subscriptions.insert(
            subscription_arn.clone(),
            (protocol.to_string(), endpoint.to_string()),
        );
        Ok(subscription_arn)
    }

    pub(crate) fn unsubscribe(&self, subscription_arn: &str) -> MessagingResult<()> {
        let mut state = self.enter("SNS", "Unsubscribe")?;
        let removed = state
            .topics
            .values_mut()
            .any(|t| t.subscriptions.remove(subscription_arn).is_some());
        if removed {
            Ok(())
        } else {
            Err(Self::not_found("SNS", "Unsubscribe", "NotFound", subscription_arn).into())
        }
    }

    pub(crate) fn put_alarm(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<String> {
        let arn = self.alarm_arn(name);
        let mut state = self.enter("CloudWatch", "PutMetricAlarm")?;
        let mut attrs = attributes.clone();
        attrs.insert("AlarmArn".into(), arn.clone());
        attrs.insert("AlarmName".into(), name.to_string());
        // Putting an existing alarm replaces its definition
        let alarm = state
            .alarms
            .entry(name.to_string())
            .or_insert_with(|| MockAlarm {
                arn: arn.clone(),
                attributes: ResourceAttributes::new(),
                state: AlarmState::InsufficientData,
                reason: String::new(),
            });
        alarm.attributes = attrs;
        Ok(alarm.arn.clone())
    }

    pub(crate) fn describe_alarms(
        &self,
        only: Option<&str>,
    ) -> MessagingResult<Vec<(String, String, ResourceAttributes)>> {
        let state = self.enter("CloudWatch", "DescribeAlarms")?;
        Ok(state
            .alarms
            .iter()
            .filter(|(name, _)| only.map_or(true, |o| o == name.as_str()))
            .map(|(name, alarm)| {
                let mut attrs = alarm.attributes.clone();
                attrs.insert("StateValue".into(), alarm.state.as_str().to_string());
                attrs.insert("StateReason".into(), alarm.reason.clone());
                (name.clone(), alarm.arn.clone(), attrs)
            })
            .collect())
    }

    pub(crate) fn alarm_attributes_checked(&self, name: &str) -> MessagingResult<ResourceAttributes> {
        if self.lock().attribute_failures.contains(name) {
            return Err(RemoteError::new("CloudWatch", "DescribeAlarms", "AccessDenied", "denied")
                .with_resource(name)
                .into());
        }
        self.describe_alarms(Some(name))?
            .into_iter()
            .next()
            .map(|(_, _, attrs)| attrs)
            .ok_or_else(|| Self::not_found("CloudWatch", "DescribeAlarms", "ResourceNotFound", name).into())
    }

    pub(crate) fn delete_alarm(&self, name: &str) -> MessagingResult<()> {
        let mut state = self.enter("CloudWatch", "DeleteAlarms")?;
        state.alarms.remove(name).map(|_| ()).ok_or_else(|| {
            Self::not_found("CloudWatch", "DeleteAlarms", "ResourceNotFound", name).into()
        })
    }

    pub(crate) fn set_alarm_state(
        &self,
        name: &str,
        new_state: AlarmState,
        reason: &str,
    ) -> MessagingResult<()> {
        let mut state = self.enter("CloudWatch", "SetAlarmState")?;
        let alarm = state.alarms.get_mut(name).ok_or_else(|| {
            Self::not_found("CloudWatch", "SetAlarmState", "ResourceNotFound", name)
        })?;
        alarm.state = new_state;
        alarm.reason = reason.to_string();
        Ok(())
    }
}

fn new_queue(url: String, arn: String, attributes: &ResourceAttributes) -> MockQueue {
    let mut attrs = attributes.clone();
    attrs.insert("QueueArn".into(), arn.clone());
    attrs.insert(
        "CreatedTimestamp".into(),
        chrono::Utc::now().timestamp().to_string(),
    );
    MockQueue {
        url,
        arn,
        attributes: attrs,
        ..Default::default()
    }
}

fn new_topic(arn: String, attributes: &ResourceAttributes) -> MockTopic {
    let mut attrs = attributes.clone();
    attrs.insert("TopicArn".into(), arn.clone());
    MockTopic {
        arn,
        attributes: attrs,
        subscriptions: BTreeMap::new(),
    }
}
