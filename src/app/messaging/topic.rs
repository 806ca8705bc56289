//! SNS topics and their subscriptions.

use super::cache::ResourceContext;
use super::errors::{MessagingError, MessagingResult};
use super::provider::{RemoteHandle, RemoteResourceProvider};
use super::queue::QueueClient;
use super::resource_info::{ResourceAttributes, ResourceInfo, ResourceKind};
use super::service_client::{MessagingService, ResourceStrategy, ServiceClient, ServiceClientParts};
use crate::app::config::ServiceSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Protocol used to deliver topic messages into an SQS queue.
pub const SQS_PROTOCOL: &str = "sqs";

/// What was asked of SNS when subscribing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionRequest {
    pub endpoint: String,
    pub protocol: String,
    pub topic_arn: String,
}

#[async_trait]
pub trait TopicProvider: RemoteResourceProvider {
    /// Returns the message id.
    async fn publish(
        &self,
        topic: &RemoteHandle,
        subject: Option<&str>,
        body: &str,
    ) -> MessagingResult<String>;

    /// Returns the subscription ARN.
    async fn subscribe(
        &self,
        topic: &RemoteHandle,
        protocol: &str,
        endpoint: &str,
    ) -> MessagingResult<String>;

    async fn unsubscribe(&self, subscription_arn: &str) -> MessagingResult<()>;
}

pub struct TopicStrategy;

impl ResourceStrategy for TopicStrategy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Topic
    }
}

pub struct TopicClient {
    core: Arc<ServiceClient>,
    topics: Arc<dyn TopicProvider>,
    subscriptions: Mutex<HashMap<String, SubscriptionRequest>>,
}

impl TopicClient {
    pub fn new<P>(
        name: impl Into<String>,
        provider: Arc<P>,
        settings: ServiceSettings,
        context: Arc<ResourceContext>,
    ) -> Self
    where
        P: TopicProvider + 'static,
    {
        let core = ServiceClient::new(ServiceClientParts {
            name: name.into(),
            service_type: "SNS".into(),
            strategy: Arc::new(TopicStrategy),
            provider: provider.clone() as Arc<dyn RemoteResourceProvider>,
            settings,
            context,
        });
        Self {
            core,
            topics: provider,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn create_topic(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<ResourceInfo> {
        self.core.create(name, attributes).await
    }

    pub async fn get_topic_info(
        &self,
        name: &str,
        create_if_missing: bool,
    ) -> MessagingResult<Option<ResourceInfo>> {
        self.core.get_info(name, create_if_missing).await
    }

    pub fn require_topic(&self, name: &str) -> MessagingResult<ResourceInfo> {
        self.core
            .cached(name)
            .ok_or_else(|| MessagingError::not_found(ResourceKind::Topic, name))
    }

    pub async fn delete_topic(&self, name: &str) -> MessagingResult<bool> {
        self.core.delete(name).await
    }

    pub async fn list_topics(&self) -> MessagingResult<Vec<RemoteHandle>> {
        self.core.list_all().await
    }

    pub async fn publish(
        &self,
        topic: &ResourceInfo,
        subject: Option<&str>,
        body: &str,
    ) -> MessagingResult<String> {
        let handle = self.core.strategy().remote_handle(topic);
        self.topics
            .publish(&handle, subject, body)
            .await
            .map_err(|e| {
                let e = e.for_resource(&topic.name);
                svc_error!(
                    self.core.name(),
                    "Problem publishing the message to the topic {}: {}",
                    topic.name,
                    e
                );
                e
            })
    }

    /// Subscribe `endpoint` to the topic. Records the subscription and emits
    /// `Topic.Subscribed`; resolves with the subscription ARN.
    pub async fn subscribe(
        &self,
        topic: &ResourceInfo,
        protocol: &str,
        endpoint: &str,
    ) -> MessagingResult<String> {
        let topic_arn = topic.arn.clone().ok_or_else(|| {
            MessagingError::InvalidArgument(format!("topic {} has no ARN", topic.name))
        })?;
        let handle = self.core.strategy().remote_handle(topic);
        let subscription_arn = self
            .topics
            .subscribe(&handle, protocol, endpoint)
            .await
            .map_err(|e| {
                let e = e.for_resource(&topic.name);
                svc_error!(self.core.name(), "subscribe to {} failed: {}", topic.name, e);
                e
            })?;

        let request = SubscriptionRequest {
            endpoint: endpoint.to_string(),
            protocol: protocol.to_string(),
            topic_arn,
        };
        let payload = json!({
            "subscriptionRequest": request,
            "subscriptionArn": subscription_arn,
        });
        self.lock_subscriptions()
            .insert(subscription_arn.clone(), request);

        svc_info!(
            self.core.name(),
            "{} endpoint {} subscribed to {}",
            protocol,
            endpoint,
            topic.name
        );
        self.core.emit_lifecycle("Subscribed", vec![payload]);
        Ok(subscription_arn)
    }

    /// Deliver the topic's messages into `queue`.
    pub async fn subscribe_to_queue(
        &self,
        topic: &ResourceInfo,
        queue: &ResourceInfo,
    ) -> MessagingResult<String> {
        let queue_arn = queue.arn.as_deref().ok_or_else(|| {
            MessagingError::InvalidArgument(format!("queue {} has no ARN", queue.name))
        })?;
        self.subscribe(topic, SQS_PROTOCOL, queue_arn).await
    }

    /// Get-or-create both the topic and the queue (through the manager's queue
    /// service), then subscribe the queue to the topic.
    pub async fn subscribe_topic_to_queue(
        &self,
        topic_name: &str,
        queue_name: &str,
    ) -> MessagingResult<String> {
        let manager = self.core.manager().ok_or_else(|| {
            MessagingError::UnknownService("no manager registered for topic client".into())
        })?;
        let queues = manager
            .first_of::<QueueClient>()
            .ok_or_else(|| MessagingError::UnknownService("SQS".into()))?;

        let topic = self.get_topic_info(topic_name, true).await?.ok_or_else(|| {
            MessagingError::not_found(ResourceKind::Topic, topic_name)
        })?;
        let queue = queues
            .get_queue_info(queue_name, true)
            .await?
            .ok_or_else(|| MessagingError::not_found(ResourceKind::Queue, queue_name))?;
        self.subscribe_to_queue(&topic, &queue).await
    }

    pub async fn unsubscribe(&self, subscription_arn: &str) -> MessagingResult<bool> {
        self.topics
            .unsubscribe(subscription_arn)
            .await
            .map_err(|e| {
                svc_error!(self.core.name(), "unsubscribe {} failed: {}", subscription_arn, e);
                e
            })?;
        self.lock_subscriptions().remove(subscription_arn);
        self.core.emit_lifecycle(
            "Unsubscribed",
            vec![Value::String(subscription_arn.to_string())],
        );
        Ok(true)
    }

    /// Subscriptions made through this client, by subscription ARN.
    pub fn subscriptions(&self) -> HashMap<String, SubscriptionRequest> {
        self.lock_subscriptions().clone()
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SubscriptionRequest>> {
        match self.subscriptions.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MessagingService for TopicClient {
    fn core(&self) -> &Arc<ServiceClient> {
        &self.core
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
