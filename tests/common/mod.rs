//! Shared fixtures: a fully wired manager over a fresh in-memory cloud.
#![allow(dead_code)]

use awsmessaging::app::config::MessagingConfig;
use awsmessaging::app::messaging::{
    AlarmClient, ApiManager, Backend, Event, EventBus, QueueClient, ResourceContext,
    ServiceRegistry, TopicClient,
};
use awsmessaging::app::mock::MockCloud;
use std::sync::{Arc, Mutex};

pub const REGION: &str = "us-east-1";
pub const ACCOUNT: &str = "123456789012";

/// Default configuration with every watcher set to `interval` seconds.
pub fn config_with_interval(interval: i64) -> MessagingConfig {
    let mut config = MessagingConfig::default();
    config.app_settings.account_id = ACCOUNT.into();
    config.sqs.common.info_watcher_interval = interval;
    config.sns.info_watcher_interval = interval;
    config.cloudwatch.common.info_watcher_interval = interval;
    config
}

pub struct Harness {
    pub cloud: Arc<MockCloud>,
    pub context: Arc<ResourceContext>,
    pub manager: Arc<ApiManager>,
}

impl Harness {
    pub fn new(config: &MessagingConfig) -> Self {
        let cloud = Arc::new(MockCloud::new(REGION, ACCOUNT));
        let context = Arc::new(ResourceContext::new());
        let manager = ApiManager::from_config(
            config,
            Arc::clone(&context),
            &ServiceRegistry::new(),
            Backend::Mock(Arc::clone(&cloud)),
        )
        .expect("manager builds from config");
        Self {
            cloud,
            context,
            manager,
        }
    }

    /// All services, no background polling.
    pub fn idle() -> Self {
        Self::new(&config_with_interval(0))
    }

    pub fn queues(&self) -> Arc<QueueClient> {
        self.manager.queue_client().expect("SQS registered")
    }

    pub fn topics(&self) -> Arc<TopicClient> {
        self.manager.topic_client().expect("SNS registered")
    }

    pub fn alarms(&self) -> Arc<AlarmClient> {
        self.manager.alarm_client().expect("CloudWatch registered")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.manager.dispose();
        self.context.dispose();
    }
}

/// Collect every event matching `pattern` on `bus`.
pub fn record(bus: &EventBus, pattern: &str) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(pattern, move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

pub fn event_names(events: &Mutex<Vec<Event>>) -> Vec<String> {
    events.lock().unwrap().iter().map(|e| e.name.clone()).collect()
}
