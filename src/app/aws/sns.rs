use super::region;
use super::sdk_errors::{remote_error, remote_failure};
use crate::app::config::ServiceSettings;
use crate::app::messaging::errors::{MessagingError, MessagingResult};
use crate::app::messaging::provider::{CreatedResource, RemoteHandle, RemoteResourceProvider};
use crate::app::messaging::resource_info::{name_from_arn, ResourceAttributes};
use crate::app::messaging::topic::TopicProvider;
use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_sns as sns;
use aws_types::SdkConfig;
use std::collections::HashMap;

const SERVICE: &str = "SNS";

pub struct SnsProvider {
    client: sns::Client,
}

impl SnsProvider {
    pub fn new(sdk: &SdkConfig, settings: &ServiceSettings) -> Self {
        let conf = sns::config::Builder::from(sdk)
            .region(region(&settings.region))
            .build();
        Self {
            client: sns::Client::from_conf(conf),
        }
    }

    fn arn_of(handle: &RemoteHandle) -> MessagingResult<&str> {
        handle.arn.as_deref().ok_or_else(|| {
            MessagingError::InvalidArgument(format!("topic {} has no ARN", handle.name))
        })
    }
}

#[async_trait]
impl RemoteResourceProvider for SnsProvider {
    fn service(&self) -> &str {
        SERVICE
    }

    async fn list_all(&self) -> MessagingResult<Vec<RemoteHandle>> {
        let mut paginator = self.client.list_topics().into_paginator().send();

        let mut handles = Vec::new();
        while let Some(page) = paginator.next().await {
            let page = page.map_err(|e| remote_error(e, SERVICE, "ListTopics"))?;
            for topic in page.topics.unwrap_or_default() {
                if let Some(arn) = topic.topic_arn {
                    let name = name_from_arn(&arn).to_string();
                    handles.push(RemoteHandle::named(name).with_arn(arn));
                }
            }
        }
        Ok(handles)
    }

    async fn create_resource(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<CreatedResource> {
        let request_attributes: HashMap<String, String> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let response = self
            .client
            .create_topic()
            .name(name)
            .set_attributes((!request_attributes.is_empty()).then_some(request_attributes))
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "CreateTopic").for_resource(name))?;
        let arn = response.topic_arn.ok_or_else(|| {
            remote_failure(anyhow!("CreateTopic returned no ARN"), SERVICE, "CreateTopic")
                .for_resource(name)
        })?;

        let handle = RemoteHandle::named(name).with_arn(arn.clone());
        let attributes = self.get_attributes(&handle).await?;
        Ok(CreatedResource {
            arn,
            url: None,
            attributes,
        })
    }

    async fn delete_resource(&self, handle: &RemoteHandle) -> MessagingResult<()> {
        self.client
            .delete_topic()
            .topic_arn(Self::arn_of(handle)?)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "DeleteTopic").for_resource(&handle.name))?;
        Ok(())
    }

    async fn get_attributes(&self, handle: &RemoteHandle) -> MessagingResult<ResourceAttributes> {
        let response = self
            .client
            .get_topic_attributes()
            .topic_arn(Self::arn_of(handle)?)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "GetTopicAttributes").for_resource(&handle.name))?;
        Ok(response.attributes.unwrap_or_default().into_iter().collect())
    }
}

#[async_trait]
impl TopicProvider for SnsProvider {
    async fn publish(
        &self,
        topic: &RemoteHandle,
        subject: Option<&str>,
        body: &str,
    ) -> MessagingResult<String> {
        let response = self
            .client
            .publish()
            .topic_arn(Self::arn_of(topic)?)
            .message(body)
            .set_subject(subject.map(str::to_string))
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "Publish").for_resource(&topic.name))?;
        Ok(response.message_id.unwrap_or_default())
    }

    async fn subscribe(
        &self,
        topic: &RemoteHandle,
        protocol: &str,
        endpoint: &str,
    ) -> MessagingResult<String> {
        let response = self
            .client
            .subscribe()
            .topic_arn(Self::arn_of(topic)?)
            .protocol(protocol)
            .endpoint(endpoint)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "Subscribe").for_resource(&topic.name))?;
        response.subscription_arn.ok_or_else(|| {
            remote_failure(anyhow!("Subscribe returned no subscription ARN"), SERVICE, "Subscribe")
                .for_resource(&topic.name)
        })
    }

    async fn unsubscribe(&self, subscription_arn: &str) -> MessagingResult<()> {
        self.client
            .unsubscribe()
            .subscription_arn(subscription_arn)
            .send()
            .await
            .map_err(|e| remote_error(e, SERVICE, "Unsubscribe").for_resource(subscription_arn))?;
        Ok(())
    }
}
