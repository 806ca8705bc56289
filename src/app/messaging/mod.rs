//! Resource caching, drift detection and event fan-out for SQS, SNS and CloudWatch.

pub mod alarm;
pub mod api_manager;
pub mod cache;
pub mod errors;
pub mod event_bus;
pub mod provider;
pub mod queue;
pub mod registry;
pub mod resource_info;
pub mod service_client;
pub mod single_flight;
pub mod topic;
pub mod watcher;

pub use alarm::{AlarmClient, AlarmForQueueRequest, AlarmNotifications, AlarmState};
pub use api_manager::{ApiManager, RESOURCE_CHANGED};
pub use cache::{ResourceCache, ResourceContext};
pub use errors::{MessagingError, MessagingResult, RemoteError};
pub use event_bus::{Event, EventBus, SubscriptionId};
pub use provider::{CreatedResource, RemoteHandle, RemoteResourceProvider};
pub use queue::{QueueClient, QueueMessage, ReceiveOptions};
pub use registry::{Backend, ServiceCreationArgs, ServiceRegistry};
pub use resource_info::{ResourceAttributes, ResourceInfo, ResourceKind, ResourceMap};
pub use service_client::{MessagingService, ServiceClient};
pub use topic::{SubscriptionRequest, TopicClient};
pub use watcher::ResourceWatcher;
