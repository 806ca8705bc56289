//! Resource model shared by every service client.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Free-form remote metadata, as returned by the provider.
pub type ResourceAttributes = BTreeMap<String, String>;

/// Snapshot of one cache: resource name -> resource.
pub type ResourceMap = HashMap<String, ResourceInfo>;

/// The kind of remote resource a client manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Queue,
    Topic,
    CloudwatchAlarm,
}

impl ResourceKind {
    /// Entity prefix used in lifecycle event names (`Queue.Created`, `Alarm.Deleted`, ...)
    pub fn event_entity(&self) -> &'static str {
        match self {
            ResourceKind::Queue => "Queue",
            ResourceKind::Topic => "Topic",
            ResourceKind::CloudwatchAlarm => "Alarm",
        }
    }

    /// CloudWatch metric namespace for resources of this kind, if any.
    pub fn metric_namespace(&self) -> Option<&'static str> {
        match self {
            ResourceKind::Queue => Some("AWS/SQS"),
            ResourceKind::Topic => Some("AWS/SNS"),
            ResourceKind::CloudwatchAlarm => None,
        }
    }

    /// CloudWatch dimension that identifies a resource of this kind, if any.
    pub fn dimension_name(&self) -> Option<&'static str> {
        match self {
            ResourceKind::Queue => Some("QueueName"),
            ResourceKind::Topic => Some("TopicName"),
            ResourceKind::CloudwatchAlarm => None,
        }
    }

    /// Attribute key under which the provider reports the ARN.
    pub fn arn_attribute(&self) -> &'static str {
        match self {
            ResourceKind::Queue => "QueueArn",
            ResourceKind::Topic => "TopicArn",
            ResourceKind::CloudwatchAlarm => "AlarmArn",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Queue => "Queue",
            ResourceKind::Topic => "Topic",
            ResourceKind::CloudwatchAlarm => "CloudwatchAlarm",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote resource as seen by the cache.
///
/// `arn` is `None` only while the remote create has not resolved yet; entries in a
/// cache always carry one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceInfo {
    #[serde(rename = "ResourceType")]
    pub kind: ResourceKind,
    pub name: String,
    pub arn: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub attributes: ResourceAttributes,
}

impl ResourceInfo {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            arn: None,
            url: None,
            attributes: ResourceAttributes::new(),
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

    pub fn with_attributes(mut self, attributes: ResourceAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// A resource is live once the remote side has assigned it an ARN.
    pub fn is_live(&self) -> bool {
        self.arn.as_deref().is_some_and(|arn| !arn.is_empty())
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

impl fmt::Display for ResourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: name={}, url={}, arn={}",
            self.kind,
            self.name,
            self.url.as_deref().unwrap_or("-"),
            self.arn.as_deref().unwrap_or("-")
        )
    }
}

/// Last `:`-separated segment of an ARN, which is the resource name for SNS topics
/// and CloudWatch alarms.
pub fn name_from_arn(arn: &str) -> &str {
    arn.rsplit(':').next().unwrap_or(arn)
}

/// Last `/`-separated segment of a queue URL.
pub fn name_from_url(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}
