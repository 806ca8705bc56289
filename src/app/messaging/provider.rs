//! The remote side of a service client.
//!
//! Service clients never talk to AWS directly. They go through a
//! [`RemoteResourceProvider`], which is implemented by the SDK-backed providers in
//! [`crate::app::aws`] and by the in-memory ones in [`crate::app::mock`].

use super::errors::MessagingResult;
use super::resource_info::ResourceAttributes;
use async_trait::async_trait;
use serde::Serialize;

/// Identifies one remote resource. Queues are addressed by URL, everything else
/// by ARN; `name` is always set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteHandle {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RemoteHandle {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.arn = Some(arn.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// What a successful remote create hands back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreatedResource {
    pub arn: String,
    pub url: Option<String>,
    pub attributes: ResourceAttributes,
}

/// Generic resource operations every remote backend supports.
#[async_trait]
pub trait RemoteResourceProvider: Send + Sync {
    /// Service label used in logs and errors ("SQS", "SNS", "CloudWatch")
    fn service(&self) -> &str;

    async fn list_all(&self) -> MessagingResult<Vec<RemoteHandle>>;

    async fn create_resource(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<CreatedResource>;

    async fn delete_resource(&self, handle: &RemoteHandle) -> MessagingResult<()>;

    async fn get_attributes(&self, handle: &RemoteHandle) -> MessagingResult<ResourceAttributes>;
}
