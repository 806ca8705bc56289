//! Closed table of the services that can be instantiated by name.

use super::alarm::AlarmClient;
use super::cache::ResourceContext;
use super::errors::{MessagingError, MessagingResult};
use super::queue::QueueClient;
use super::service_client::MessagingService;
use super::topic::TopicClient;
use crate::app::aws::{CloudWatchProvider, SnsProvider, SqsProvider};
use crate::app::config::MessagingConfig;
use crate::app::mock::{MockAlarmProvider, MockCloud, MockQueueProvider, MockTopicProvider};
use aws_types::SdkConfig;
use std::sync::Arc;

/// Where providers send their calls.
#[derive(Clone)]
pub enum Backend {
    /// Real AWS, through the shared SDK configuration
    Aws(SdkConfig),
    /// The in-memory cloud
    Mock(Arc<MockCloud>),
}

impl Backend {
    pub fn is_mock(&self) -> bool {
        matches!(self, Backend::Mock(_))
    }
}

/// Inputs to a service factory.
pub struct ServiceCreationArgs<'a> {
    /// Name as written in configuration
    pub name: String,
    pub config: &'a MessagingConfig,
    pub context: Arc<ResourceContext>,
    pub backend: Backend,
}

pub type ServiceFactory = fn(&ServiceCreationArgs<'_>) -> MessagingResult<Arc<dyn MessagingService>>;

struct Entry {
    name: &'static str,
    aliases: &'static [&'static str],
    factory: ServiceFactory,
}

/// Maps service names (case-insensitive, aliases included) to constructors.
pub struct ServiceRegistry {
    entries: Vec<Entry>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("SQS", &["SQSClient"], create_sqs);
        registry.register("SNS", &["SNSClient"], create_sns);
        registry.register("CloudWatch", &["CloudwatchClient"], create_cloudwatch);
        registry
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        name: &'static str,
        aliases: &'static [&'static str],
        factory: ServiceFactory,
    ) {
        self.entries.retain(|e| e.name != name);
        self.entries.push(Entry {
            name,
            aliases,
            factory,
        });
    }

    /// Canonical name for `name`, if registered.
    pub fn resolve(&self, name: &str) -> Option<&'static str> {
        self.find(name).map(|e| e.name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    pub fn create(&self, args: &ServiceCreationArgs<'_>) -> MessagingResult<Arc<dyn MessagingService>> {
        let entry = self
            .find(&args.name)
            .ok_or_else(|| MessagingError::UnknownService(args.name.clone()))?;
        (entry.factory)(args)
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        let name = name.trim();
        self.entries.iter().find(|e| {
            e.name.eq_ignore_ascii_case(name) || e.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
        })
    }
}

fn create_sqs(args: &ServiceCreationArgs<'_>) -> MessagingResult<Arc<dyn MessagingService>> {
    let settings = args.config.sqs.clone();
    let context = Arc::clone(&args.context);
    let client = match &args.backend {
        Backend::Aws(sdk) => QueueClient::new(
            "SQS",
            Arc::new(SqsProvider::new(sdk, &settings)),
            settings,
            context,
        ),
        Backend::Mock(cloud) => QueueClient::new(
            "SQS",
            Arc::new(MockQueueProvider::new(Arc::clone(cloud), &settings)),
            settings,
            context,
        ),
    };
    Ok(Arc::new(client))
}

fn create_sns(args: &ServiceCreationArgs<'_>) -> MessagingResult<Arc<dyn MessagingService>> {
    let settings = args.config.sns.clone();
    let context = Arc::clone(&args.context);
    let client = match &args.backend {
        Backend::Aws(sdk) => TopicClient::new(
            "SNS",
            Arc::new(SnsProvider::new(sdk, &settings)),
            settings,
            context,
        ),
        Backend::Mock(cloud) => TopicClient::new(
            "SNS",
            Arc::new(MockTopicProvider::new(Arc::clone(cloud))),
            settings,
            context,
        ),
    };
    Ok(Arc::new(client))
}

fn create_cloudwatch(args: &ServiceCreationArgs<'_>) -> MessagingResult<Arc<dyn MessagingService>> {
    let settings = args.config.cloudwatch.clone();
    let context = Arc::clone(&args.context);
    let client = match &args.backend {
        Backend::Aws(sdk) => AlarmClient::new(
            "CloudWatch",
            Arc::new(CloudWatchProvider::new(sdk, &settings)),
            settings,
            context,
        ),
        Backend::Mock(cloud) => AlarmClient::new(
            "CloudWatch",
            Arc::new(MockAlarmProvider::new(Arc::clone(cloud))),
            settings,
            context,
        ),
    };
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive_with_aliases() {
        let registry = ServiceRegistry::new();
        assert_eq!(registry.resolve("sqs"), Some("SQS"));
        assert_eq!(registry.resolve("SNSClient"), Some("SNS"));
        assert_eq!(registry.resolve("cloudwatchclient"), Some("CloudWatch"));
        assert_eq!(registry.resolve("SES"), None);
    }

    #[test]
    fn test_unknown_service_is_error() {
        let registry = ServiceRegistry::new();
        let config = MessagingConfig::default();
        let args = ServiceCreationArgs {
            name: "S3".into(),
            config: &config,
            context: Arc::new(ResourceContext::new()),
            backend: Backend::Mock(Arc::new(MockCloud::new("us-east-1", "000000000000"))),
        };
        assert!(matches!(
            registry.create(&args),
            Err(MessagingError::UnknownService(name)) if name == "S3"
        ));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ServiceRegistry::empty();
        registry.register("SQS", &[], create_sqs);
        registry.register("SQS", &["Queues"], create_sqs);
        assert_eq!(registry.names(), vec!["SQS"]);
        assert_eq!(registry.resolve("queues"), Some("SQS"));
    }
}
