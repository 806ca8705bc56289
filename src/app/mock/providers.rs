use super::MockCloud;
use crate::app::aws::sqs::send_message_policy;
use crate::app::config::SqsSettings;
use crate::app::messaging::alarm::{AlarmProvider, AlarmState};
use crate::app::messaging::errors::{MessagingError, MessagingResult};
use crate::app::messaging::provider::{CreatedResource, RemoteHandle, RemoteResourceProvider};
use crate::app::messaging::queue::{QueueMessage, QueueProvider, ReceiveOptions};
use crate::app::messaging::resource_info::{name_from_arn, name_from_url, ResourceAttributes};
use crate::app::messaging::topic::TopicProvider;
use async_trait::async_trait;
use std::sync::Arc;

fn queue_name(handle: &RemoteHandle) -> &str {
    match &handle.url {
        Some(url) => name_from_url(url),
        None => &handle.name,
    }
}

fn arn_name(handle: &RemoteHandle) -> &str {
    match &handle.arn {
        Some(arn) => name_from_arn(arn),
        None => &handle.name,
    }
}

// ============================================================================
// SQS
// ============================================================================

pub struct MockQueueProvider {
    cloud: Arc<MockCloud>,
    allow_queue_to_receive_messages: bool,
}

impl MockQueueProvider {
    pub fn new(cloud: Arc<MockCloud>, settings: &SqsSettings) -> Self {
        Self {
            cloud,
            allow_queue_to_receive_messages: settings.allow_queue_to_receive_messages,
        }
    }
}

#[async_trait]
impl RemoteResourceProvider for MockQueueProvider {
    fn service(&self) -> &str {
        "SQS"
    }

    async fn list_all(&self) -> MessagingResult<Vec<RemoteHandle>> {
        self.cloud.delay().await;
        Ok(self
            .cloud
            .list_queues()?
            .into_iter()
            .map(|(name, url)| RemoteHandle::named(name).with_url(url))
            .collect())
    }

    async fn create_resource(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<CreatedResource> {
        self.cloud.delay().await;
        let (url, arn, mut attributes) = self.cloud.create_queue(name, attributes)?;
        if self.allow_queue_to_receive_messages {
            let policy = send_message_policy(&arn);
            let update = ResourceAttributes::from([("Policy".to_string(), policy.clone())]);
            self.cloud.set_queue_attributes(name, &update)?;
            attributes.insert("Policy".into(), policy);
        }
        Ok(CreatedResource {
            arn,
            url: Some(url),
            attributes,
        })
    }

    async fn delete_resource(&self, handle: &RemoteHandle) -> MessagingResult<()> {
        self.cloud.delay().await;
        self.cloud.delete_queue(queue_name(handle))
    }

    async fn get_attributes(&self, handle: &RemoteHandle) -> MessagingResult<ResourceAttributes> {
        self.cloud.delay().await;
        self.cloud.queue_attributes_for(queue_name(handle))
    }
}

#[async_trait]
impl QueueProvider for MockQueueProvider {
    async fn send_message(&self, queue: &RemoteHandle, body: &str) -> MessagingResult<String> {
        self.cloud.delay().await;
        self.cloud.send_message(queue_name(queue), body)
    }

    async fn receive_messages(
        &self,
        queue: &RemoteHandle,
        options: &ReceiveOptions,
    ) -> MessagingResult<Vec<QueueMessage>> {
        self.cloud.delay().await;
        self.cloud.receive_messages(queue_name(queue), options)
    }

    async fn delete_message(&self, queue: &RemoteHandle, receipt_handle: &str) -> MessagingResult<()> {
        self.cloud.delete_message(queue_name(queue), receipt_handle)
    }

    async fn purge(&self, queue: &RemoteHandle) -> MessagingResult<()> {
        self.cloud.delay().await;
        self.cloud.purge_queue(queue_name(queue))
    }

    async fn add_permission(
        &self,
        queue: &RemoteHandle,
        label: &str,
        account_ids: &[String],
        actions: &[&str],
    ) -> MessagingResult<()> {
        self.cloud
            .add_permission(queue_name(queue), label, account_ids, actions)
    }

    async fn remove_permission(&self, queue: &RemoteHandle, label: &str) -> MessagingResult<()> {
        self.cloud.remove_permission(queue_name(queue), label)
    }
}

// ============================================================================
// SNS
// ============================================================================

pub struct MockTopicProvider {
    cloud: Arc<MockCloud>,
}

impl MockTopicProvider {
    pub fn new(cloud: Arc<MockCloud>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl RemoteResourceProvider for MockTopicProvider {
    fn service(&self) -> &str {
        "SNS"
    }

    async fn list_all(&self) -> MessagingResult<Vec<RemoteHandle>> {
        self.cloud.delay().await;
        Ok(self
            .cloud
            .list_topics()?
            .into_iter()
            .map(|(name, arn)| RemoteHandle::named(name).with_arn(arn))
            .collect())
    }

    async fn create_resource(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<CreatedResource> {
        self.cloud.delay().await;
        let (arn, attributes) = self.cloud.create_topic(name, attributes)?;
        Ok(CreatedResource {
            arn,
            url: None,
            attributes,
        })
    }

    async fn delete_resource(&self, handle: &RemoteHandle) -> MessagingResult<()> {
        self.cloud.delay().await;
        self.cloud.delete_topic(arn_name(handle))
    }

    async fn get_attributes(&self, handle: &RemoteHandle) -> MessagingResult<ResourceAttributes> {
        self.cloud.delay().await;
        self.cloud.topic_attributes_for(arn_name(handle))
    }
}

#[async_trait]
impl TopicProvider for MockTopicProvider {
    async fn publish(
        &self,
        topic: &RemoteHandle,
        subject: Option<&str>,
        body: &str,
    ) -> MessagingResult<String> {
        self.cloud.delay().await;
        self.cloud.publish(arn_name(topic), subject, body)
    }

    async fn subscribe(
        &self,
        topic: &RemoteHandle,
        protocol: &str,
        endpoint: &str,
    ) -> MessagingResult<String> {
        self.cloud.subscribe(arn_name(topic), protocol, endpoint)
    }

    async fn unsubscribe(&self, subscription_arn: &str) -> MessagingResult<()> {
        self.cloud.unsubscribe(subscription_arn)
    }
}

// ============================================================================
// CloudWatch
// ============================================================================

pub struct MockAlarmProvider {
    cloud: Arc<MockCloud>,
}

impl MockAlarmProvider {
    pub fn new(cloud: Arc<MockCloud>) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl RemoteResourceProvider for MockAlarmProvider {
    fn service(&self) -> &str {
        "CloudWatch"
    }

    async fn list_all(&self) -> MessagingResult<Vec<RemoteHandle>> {
        self.cloud.delay().await;
        Ok(self
            .cloud
            .describe_alarms(None)?
            .into_iter()
            .map(|(name, arn, _)| RemoteHandle::named(name).with_arn(arn))
            .collect())
    }

    async fn create_resource(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<CreatedResource> {
        self.cloud.delay().await;
        // Same validation the SDK provider applies before PutMetricAlarm
        crate::app::messaging::alarm::AlarmDefinition::from_attributes(name, attributes)?;
        let arn = self.cloud.put_alarm(name, attributes)?;
        let attributes = self.cloud.alarm_attributes_checked(name)?;
        Ok(CreatedResource {
            arn,
            url: None,
            attributes,
        })
    }

    async fn delete_resource(&self, handle: &RemoteHandle) -> MessagingResult<()> {
        self.cloud.delay().await;
        self.cloud.delete_alarm(&handle.name)
    }

    async fn get_attributes(&self, handle: &RemoteHandle) -> MessagingResult<ResourceAttributes> {
        self.cloud.delay().await;
        self.cloud.alarm_attributes_checked(&handle.name)
    }
}

#[async_trait]
impl AlarmProvider for MockAlarmProvider {
    async fn set_alarm_state(
        &self,
        alarm_name: &str,
        state: AlarmState,
        reason: &str,
        reason_data: &str,
    ) -> MessagingResult<()> {
        if serde_json::from_str::<serde_json::Value>(reason_data).is_err() {
            return Err(MessagingError::InvalidArgument(
                "state reason data must be JSON".into(),
            ));
        }
        self.cloud.set_alarm_state(alarm_name, state, reason)
    }

    async fn describe_alarm(&self, alarm_name: &str) -> MessagingResult<Option<ResourceAttributes>> {
        Ok(self
            .cloud
            .describe_alarms(Some(alarm_name))?
            .into_iter()
            .next()
            .map(|(_, _, attrs)| attrs))
    }
}
