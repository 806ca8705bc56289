use super::region;
use super::sdk_errors::{remote_error, remote_failure};
use crate::app::config::SqsSettings;
use crate::app::messaging::errors::MessagingResult;
use crate::app::messaging::provider::{CreatedResource, RemoteHandle, RemoteResourceProvider};
use crate::app::messaging::queue::{QueueMessage, QueueProvider, ReceiveOptions};
use crate::app::messaging::resource_info::{name_from_url, ResourceAttributes};
use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_sqs as sqs;
use aws_types::SdkConfig;
use sqs::types::QueueAttributeName;
use std::collections::HashMap;

const SERVICE: &str = "SQS";

/// Queue policy letting any principal send to the queue.
pub(crate) fn send_message_policy(queue_arn: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Id": format!("{}/SQSDefaultPolicy", queue_arn),
        "Statement": [{
            "Sid": "AllowSendMessage",
            "Effect": "Allow",
            "Principal": "*",
            "Action": "SQS:SendMessage",
            "Resource": queue_arn,
        }]
    })
    .to_string()
}

pub struct SqsProvider {
    client: sqs::Client,
    allow_queue_to_receive_messages: bool,
}

impl SqsProvider {
    pub fn new(sdk: &SdkConfig, settings: &SqsSettings) -> Self {
        let conf = sqs::config::Builder::from(sdk)
            .region(region(&settings.common.region))
            .build();
        Self {
            client: sqs::Client::from_conf(conf),
            allow_queue_to_receive_messages: settings.allow_queue_to_receive_messages,
        }
    }

    async fn url_for(&self, handle: &RemoteHandle) -> MessagingResult<String> {
        if let Some(url) = &handle.url {
            return Ok(url.clone());
        }
        let response = self
            .client
            .get_queue_url()
            .queue_name(&handle.name)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "GetQueueUrl").for_resource(&handle.name))?;
        response.queue_url.ok_or_else(|| {
            remote_failure(anyhow!("no URL for queue {}", handle.name), SERVICE, "GetQueueUrl")
        })
    }

    async fn attributes_for_url(&self, url: &str) -> MessagingResult<ResourceAttributes> {
        let response = self
            .client
            .get_queue_attributes()
            .queue_url(url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "GetQueueAttributes").for_resource(name_from_url(url)))?;

        Ok(response
            .attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k.as_str().to_string(), v))
            .collect())
    }
}

#[async_trait]
impl RemoteResourceProvider for SqsProvider {
    fn service(&self) -> &str {
        SERVICE
    }

    async fn list_all(&self) -> MessagingResult<Vec<RemoteHandle>> {
        let mut paginator = self.client.list_queues().into_paginator().send();

        let mut handles = Vec::new();
        while let Some(page) = paginator.next().await {
            let page = page.map_err(|e| remote_error(e, SERVICE, "ListQueues"))?;
            for url in page.queue_urls.unwrap_or_default() {
                let name = name_from_url(&url).to_string();
                handles.push(RemoteHandle::named(name).with_url(url));
            }
        }
        Ok(handles)
    }

    async fn create_resource(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<CreatedResource> {
        let request_attributes: HashMap<QueueAttributeName, String> = attributes
            .iter()
            .map(|(k, v)| (QueueAttributeName::from(k.as_str()), v.clone()))
            .collect();

        let response = self
            .client
            .create_queue()
            .queue_name(name)
            .set_attributes(Some(request_attributes))
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "CreateQueue").for_resource(name))?;
        let url = response.queue_url.ok_or_else(|| {
            remote_failure(anyhow!("CreateQueue returned no URL"), SERVICE, "CreateQueue")
                .for_resource(name)
        })?;

        let mut attrs = self.attributes_for_url(&url).await?;
        let arn = attrs.get("QueueArn").cloned().ok_or_else(|| {
            remote_failure(anyhow!("queue has no QueueArn attribute"), SERVICE, "GetQueueAttributes")
                .for_resource(name)
        })?;

        if self.allow_queue_to_receive_messages {
            let policy = send_message_policy(&arn);
            self.client
                .set_queue_attributes()
                .queue_url(&url)
                .attributes(QueueAttributeName::Policy, policy.clone())
                .send()
                .await
                .map_err(|e| remote_error(e, SERVICE, "SetQueueAttributes").for_resource(name))?;
            attrs.insert("Policy".into(), policy);
        }

        Ok(CreatedResource {
            arn,
            url: Some(url),
            attributes: attrs,
        })
    }

    async fn delete_resource(&self, handle: &RemoteHandle) -> MessagingResult<()> {
        let url = self.url_for(handle).await?;
        self.client
            .delete_queue()
            .queue_url(url)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "DeleteQueue").for_resource(&handle.name))?;
        Ok(())
    }

    async fn get_attributes(&self, handle: &RemoteHandle) -> MessagingResult<ResourceAttributes> {
        let url = self.url_for(handle).await?;
        self.attributes_for_url(&url).await
    }
}

#[async_trait]
impl QueueProvider for SqsProvider {
    async fn send_message(&self, queue: &RemoteHandle, body: &str) -> MessagingResult<String> {
        let url = self.url_for(queue).await?;
        let response = self
            .client
            .send_message()
            .queue_url(url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "SendMessage").for_resource(&queue.name))?;
        Ok(response.message_id.unwrap_or_default())
    }

    async fn receive_messages(
        &self,
        queue: &RemoteHandle,
        options: &ReceiveOptions,
    ) -> MessagingResult<Vec<QueueMessage>> {
        let url = self.url_for(queue).await?;
        let response = self
            .client
            .receive_message()
            .queue_url(url)
            .set_max_number_of_messages(options.max_number_of_messages)
            .set_visibility_timeout(options.visibility_timeout)
            .set_wait_time_seconds(options.wait_time_seconds)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "ReceiveMessage").for_resource(&queue.name))?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|msg| QueueMessage {
                message_id: msg.message_id.unwrap_or_default(),
                receipt_handle: msg.receipt_handle.unwrap_or_default(),
                body: msg.body.unwrap_or_default(),
                attributes: msg
                    .attributes
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k.as_str().to_string(), v))
                    .collect(),
            })
            .collect())
    }

    async fn delete_message(&self, queue: &RemoteHandle, receipt_handle: &str) -> MessagingResult<()> {
        let url = self.url_for(queue).await?;
        self.client
            .delete_message()
            .queue_url(url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "DeleteMessage").for_resource(&queue.name))?;
        Ok(())
    }

    async fn purge(&self, queue: &RemoteHandle) -> MessagingResult<()> {
        let url = self.url_for(queue).await?;
        self.client
            .purge_queue()
            .queue_url(url)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "PurgeQueue").for_resource(&queue.name))?;
        Ok(())
    }

    async fn add_permission(
        &self,
        queue: &RemoteHandle,
        label: &str,
        account_ids: &[String],
        actions: &[&str],
    ) -> MessagingResult<()> {
        let url = self.url_for(queue).await?;
        self.client
            .add_permission()
            .queue_url(url)
            .label(label)
            .set_aws_account_ids(Some(account_ids.to_vec()))
            .set_actions(Some(actions.iter().map(|a| a.to_string()).collect()))
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "AddPermission").for_resource(&queue.name))?;
        Ok(())
    }

    async fn remove_permission(&self, queue: &RemoteHandle, label: &str) -> MessagingResult<()> {
        let url = self.url_for(queue).await?;
        self.client
            .remove_permission()
            .queue_url(url)
            .label(label)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "RemovePermission").for_resource(&queue.name))?;
        Ok(())
    }
}
