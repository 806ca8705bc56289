//! Aggregates the service clients behind one event bus.

use super::alarm::AlarmClient;
use super::cache::ResourceContext;
use super::errors::{MessagingError, MessagingResult};
use super::event_bus::EventBus;
use super::queue::QueueClient;
use super::registry::{Backend, ServiceCreationArgs, ServiceRegistry};
use super::resource_info::ResourceMap;
use super::service_client::{MessagingService, ServiceClient};
use super::topic::TopicClient;
use crate::app::config::MessagingConfig;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};

/// Event fired on the manager bus when a watcher swaps a cache.
/// Payload: `[kind, serviceName, map]`.
pub const RESOURCE_CHANGED: &str = "Resource.Changed";

/// Owns the registered services and re-publishes everything they emit.
pub struct ApiManager {
    events: Arc<EventBus>,
    services: RwLock<Vec<Arc<dyn MessagingService>>>,
    context: Arc<ResourceContext>,
}

impl ApiManager {
    /// Build the services named in `config.appSettings.services`. Names the
    /// registry does not know are logged and skipped.
    pub fn from_config(
        config: &MessagingConfig,
        context: Arc<ResourceContext>,
        registry: &ServiceRegistry,
        backend: Backend,
    ) -> MessagingResult<Arc<Self>> {
        let mut services = Vec::new();
        for name in &config.app_settings.services {
            let args = ServiceCreationArgs {
                name: name.clone(),
                config,
                context: Arc::clone(&context),
                backend: backend.clone(),
            };
            match registry.create(&args) {
                Ok(service) => services.push(service),
                Err(MessagingError::UnknownService(unknown)) => {
                    tracing::warn!("Skipping unknown service '{}'", unknown);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self::with_services(services, context))
    }

    /// Register already-built services.
    pub fn with_services(
        services: Vec<Arc<dyn MessagingService>>,
        context: Arc<ResourceContext>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            events: Arc::new(EventBus::new("ApiManager")),
            services: RwLock::new(Vec::new()),
            context,
        });
        for service in services {
            manager.register(service);
        }
        manager
    }

    /// Wire one service: manager back-reference, event forwarding, the
    /// resource-changed callback, and its kind's watcher.
    pub fn register(self: &Arc<Self>, service: Arc<dyn MessagingService>) {
        let core = service.core();
        core.set_manager(self);
        core.events().forward_to(&self.events);

        let bus = Arc::downgrade(&self.events);
        core.set_resource_changed(Arc::new(move |client: &ServiceClient, map: &ResourceMap| {
            if let Some(bus) = bus.upgrade() {
                bus.emit(RESOURCE_CHANGED, resource_changed_payload(client, map));
            }
        }));
        core.ensure_watcher();

        tracing::info!("Registered service {} ({})", core.name(), core.kind());
        self.write_services().push(service);
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn context(&self) -> &Arc<ResourceContext> {
        &self.context
    }

    pub fn service_names(&self) -> Vec<String> {
        self.read_services()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Look up a service by name. Unknown names give `None`.
    pub fn get_service(&self, name: &str) -> Option<Arc<dyn MessagingService>> {
        let services = self.read_services();
        services
            .iter()
            .find(|s| s.name() == name)
            .or_else(|| services.iter().find(|s| s.name().eq_ignore_ascii_case(name)))
            .cloned()
    }

    /// Look up a service by name and concrete type.
    pub fn service<T: MessagingService>(&self, name: &str) -> Option<Arc<T>> {
        self.get_service(name)?.as_any().downcast::<T>().ok()
    }

    /// The first registered service of type `T`.
    pub fn first_of<T: MessagingService>(&self) -> Option<Arc<T>> {
        let services: Vec<_> = self.read_services().clone();
        services
            .into_iter()
            .find_map(|s| s.as_any().downcast::<T>().ok())
    }

    pub fn queue_client(&self) -> Option<Arc<QueueClient>> {
        self.first_of::<QueueClient>()
    }

    pub fn topic_client(&self) -> Option<Arc<TopicClient>> {
        self.first_of::<TopicClient>()
    }

    pub fn alarm_client(&self) -> Option<Arc<AlarmClient>> {
        self.first_of::<AlarmClient>()
    }

    /// Fill every empty cache from the remote side. Failures are logged per service.
    pub async fn preload(&self) {
        let services: Vec<_> = self.read_services().clone();
        for service in services {
            if let Err(e) = service.core().preload().await {
                svc_warn!(service.name(), "Preload failed: {}", e);
            }
        }
    }

    /// Dispose every service, then forget them.
    pub fn dispose(&self) {
        let services: Vec<_> = std::mem::take(&mut *self.write_services());
        for service in &services {
            service.dispose();
        }
        tracing::info!("ApiManager disposed {} services", services.len());
    }

    fn read_services(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn MessagingService>>> {
        match self.services.read() {
            Ok(services) => services,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_services(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn MessagingService>>> {
        match self.services.write() {
            Ok(services) => services,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn resource_changed_payload(client: &ServiceClient, map: &ResourceMap) -> Vec<Value> {
    let map = serde_json::to_value(map).unwrap_or_else(|e| {
        svc_warn!(client.name(), "Could not serialise resource map: {}", e);
        Value::Null
    });
    vec![json!(client.kind().as_str()), json!(client.name()), map]
}
