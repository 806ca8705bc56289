//! SQS queues.

use super::cache::ResourceContext;
use super::errors::{MessagingError, MessagingResult};
use super::provider::{RemoteHandle, RemoteResourceProvider};
use super::resource_info::{ResourceAttributes, ResourceInfo, ResourceKind};
use super::service_client::{MessagingService, ResourceStrategy, ServiceClient, ServiceClientParts};
use crate::app::config::SqsSettings;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// Actions granted by [`QueueClient::share`].
pub const SHARE_ACTIONS: [&str; 2] = ["ReceiveMessage", "SendMessage"];

/// A message pulled off a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    #[serde(default)]
    pub attributes: ResourceAttributes,
}

/// Receive request options. Unset fields use the service defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveOptions {
    pub max_number_of_messages: Option<i32>,
    pub visibility_timeout: Option<i32>,
    pub wait_time_seconds: Option<i32>,
}

impl ReceiveOptions {
    /// Parse from a loosely keyed map; keys are matched case-insensitively and
    /// `waitTime` is accepted for `waitTimeSeconds`. Unknown keys and values that
    /// are not integers are ignored.
    pub fn from_attributes(attributes: &ResourceAttributes) -> Self {
        let mut options = Self::default();
        for (key, value) in attributes {
            let slot = match key.to_ascii_lowercase().as_str() {
                "maxnumberofmessages" => &mut options.max_number_of_messages,
                "visibilitytimeout" => &mut options.visibility_timeout,
                "waittime" | "waittimeseconds" => &mut options.wait_time_seconds,
                _ => continue,
            };
            match value.trim().parse::<i32>() {
                Ok(parsed) => *slot = Some(parsed),
                Err(_) => tracing::debug!("Ignoring receive option {}={}", key, value),
            }
        }
        options
    }
}

/// SQS operations beyond the generic resource lifecycle.
#[async_trait]
pub trait QueueProvider: RemoteResourceProvider {
    /// Returns the message id.
    async fn send_message(&self, queue: &RemoteHandle, body: &str) -> MessagingResult<String>;

    async fn receive_messages(
        &self,
        queue: &RemoteHandle,
        options: &ReceiveOptions,
    ) -> MessagingResult<Vec<QueueMessage>>;

    async fn delete_message(&self, queue: &RemoteHandle, receipt_handle: &str) -> MessagingResult<()>;

    async fn purge(&self, queue: &RemoteHandle) -> MessagingResult<()>;

    async fn add_permission(
        &self,
        queue: &RemoteHandle,
        label: &str,
        account_ids: &[String],
        actions: &[&str],
    ) -> MessagingResult<()>;

    async fn remove_permission(&self, queue: &RemoteHandle, label: &str) -> MessagingResult<()>;
}

/// Queue defaults: retention period and long-poll wait time from configuration.
pub struct QueueStrategy {
    message_retention_period: u32,
    receive_wait_seconds: u32,
}

impl QueueStrategy {
    pub fn new(settings: &SqsSettings) -> Self {
        Self {
            message_retention_period: settings.message_retention_period,
            receive_wait_seconds: settings.receive_wait_seconds,
        }
    }
}

impl ResourceStrategy for QueueStrategy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Queue
    }

    fn default_attributes(&self) -> ResourceAttributes {
        let mut attrs = ResourceAttributes::new();
        attrs.insert(
            "MessageRetentionPeriod".into(),
            self.message_retention_period.to_string(),
        );
        attrs.insert(
            "ReceiveMessageWaitTimeSeconds".into(),
            self.receive_wait_seconds.to_string(),
        );
        attrs
    }
}

pub struct QueueClient {
    core: Arc<ServiceClient>,
    queues: Arc<dyn QueueProvider>,
    settings: SqsSettings,
}

impl QueueClient {
    pub fn new<P>(
        name: impl Into<String>,
        provider: Arc<P>,
        settings: SqsSettings,
        context: Arc<ResourceContext>,
    ) -> Self
    where
        P: QueueProvider + 'static,
    {
        let core = ServiceClient::new(ServiceClientParts {
            name: name.into(),
            service_type: "SQS".into(),
            strategy: Arc::new(QueueStrategy::new(&settings)),
            provider: provider.clone() as Arc<dyn RemoteResourceProvider>,
            settings: settings.common.clone(),
            context,
        });
        Self {
            core,
            queues: provider,
            settings,
        }
    }

    pub fn settings(&self) -> &SqsSettings {
        &self.settings
    }

    /// Create a queue (or return the cached one). A `Name` attribute is ignored.
    pub async fn create_queue(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<ResourceInfo> {
        let mut attributes = attributes.clone();
        attributes.remove("Name");
        self.core.create(name, &attributes).await
    }

    /// Create several queues concurrently. Results are in input order.
    pub async fn create_queues(&self, names: &[String]) -> Vec<MessagingResult<ResourceInfo>> {
        let empty = ResourceAttributes::new();
        join_all(names.iter().map(|name| self.create_queue(name, &empty))).await
    }

    pub async fn get_queue_info(
        &self,
        name: &str,
        create_if_missing: bool,
    ) -> MessagingResult<Option<ResourceInfo>> {
        self.core.get_info(name, create_if_missing).await
    }

    /// Cached queue or `NotFound`.
    pub fn require_queue(&self, name: &str) -> MessagingResult<ResourceInfo> {
        self.core
            .cached(name)
            .ok_or_else(|| MessagingError::not_found(ResourceKind::Queue, name))
    }

    pub async fn delete_queue(&self, name: &str) -> MessagingResult<bool> {
        self.core.delete(name).await
    }

    pub async fn list_queues(&self) -> MessagingResult<Vec<RemoteHandle>> {
        self.core.list_all().await
    }

    /// Remove every message from a cached queue and emit `Queue.Purged`.
    pub async fn purge(&self, name: &str) -> MessagingResult<bool> {
        let queue = self.require_queue(name)?;
        let handle = self.handle(&queue);
        self.queues.purge(&handle).await.map_err(|e| {
            let e = e.for_resource(name);
            svc_error!(self.core.name(), "purge {} failed: {}", name, e);
            e
        })?;
        svc_info!(self.core.name(), "Queue {} purged", name);
        self.core
            .emit_lifecycle("Purged", vec![Value::String(name.to_string())]);
        Ok(true)
    }

    /// Send `body` to the queue; resolves with the message id.
    pub async fn publish(&self, queue: &ResourceInfo, body: &str) -> MessagingResult<String> {
        let handle = self.handle(queue);
        self.queues.send_message(&handle, body).await.map_err(|e| {
            let e = e.for_resource(&queue.name);
            svc_error!(self.core.name(), "publish to {} failed: {}", queue.name, e);
            e
        })
    }

    /// One receive call. When `deleteMessageAfterConsuming` is on, every returned
    /// message is deleted before this resolves.
    pub async fn receive(
        &self,
        queue: &ResourceInfo,
        options: Option<&ResourceAttributes>,
    ) -> MessagingResult<Vec<QueueMessage>> {
        let mut messages = Vec::new();
        self.receive_each(queue, options, |msg| messages.push(msg.clone()))
            .await?;
        Ok(messages)
    }

    /// One receive call, invoking `on_message` per message and then deleting it if
    /// configured to. A failed delete is logged, not returned.
    pub async fn receive_each<F>(
        &self,
        queue: &ResourceInfo,
        options: Option<&ResourceAttributes>,
        mut on_message: F,
    ) -> MessagingResult<usize>
    where
        F: FnMut(&QueueMessage) + Send,
    {
        let options = ReceiveOptions::from_attributes(
            options.unwrap_or(&self.settings.receive_attributes),
        );
        let handle = self.handle(queue);
        let messages = self
            .queues
            .receive_messages(&handle, &options)
            .await
            .map_err(|e| {
                let e = e.for_resource(&queue.name);
                svc_error!(self.core.name(), "receive from {} failed: {}", queue.name, e);
                e
            })?;

        for msg in &messages {
            on_message(msg);
            if self.settings.delete_message_after_consuming {
                if let Err(e) = self.queues.delete_message(&handle, &msg.receipt_handle).await {
                    svc_warn!(
                        self.core.name(),
                        "Could not delete message {} from {}: {}",
                        msg.message_id,
                        queue.name,
                        e
                    );
                }
            }
        }
        Ok(messages.len())
    }

    pub async fn delete_message(
        &self,
        queue: &ResourceInfo,
        receipt_handle: &str,
    ) -> MessagingResult<()> {
        let handle = self.handle(queue);
        self.queues
            .delete_message(&handle, receipt_handle)
            .await
            .map_err(|e| {
                let e = e.for_resource(&queue.name);
                svc_error!(self.core.name(), "delete message on {} failed: {}", queue.name, e);
                e
            })
    }

    /// Grant `principal` send/receive on the queue. Resolves with the permission label.
    pub async fn share(&self, queue: &ResourceInfo, principal: &str) -> MessagingResult<String> {
        let label = share_label(&queue.name, principal);
        let handle = self.handle(queue);
        self.queues
            .add_permission(&handle, &label, &[principal.to_string()], &SHARE_ACTIONS)
            .await
            .map_err(|e| {
                let e = e.for_resource(&queue.name);
                svc_error!(self.core.name(), "share {} failed: {}", queue.name, e);
                e
            })?;
        svc_info!(self.core.name(), "Queue {} shared with {}", queue.name, principal);
        Ok(label)
    }

    pub async fn unshare(&self, queue: &ResourceInfo, label: &str) -> MessagingResult<bool> {
        let handle = self.handle(queue);
        self.queues
            .remove_permission(&handle, label)
            .await
            .map_err(|e| {
                let e = e.for_resource(&queue.name);
                svc_error!(self.core.name(), "unshare {} failed: {}", queue.name, e);
                e
            })?;
        Ok(true)
    }

    fn handle(&self, queue: &ResourceInfo) -> RemoteHandle {
        self.core.strategy().remote_handle(queue)
    }
}

impl MessagingService for QueueClient {
    fn core(&self) -> &Arc<ServiceClient> {
        &self.core
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub fn share_label(queue: &str, principal: &str) -> String {
    format!("AddPermission-{}-{}", queue, principal)
}
