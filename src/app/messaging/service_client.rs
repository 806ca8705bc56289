//! Generic cache-first service client.
//!
//! [`ServiceClient`] implements the create/get/delete/list behaviour shared by all
//! resource kinds. What differs per kind (default attributes, how a remote listing
//! becomes a [`ResourceInfo`]) is supplied by a [`ResourceStrategy`]; kind-specific
//! operations live in the wrappers in `queue`, `topic` and `alarm`.

use super::api_manager::ApiManager;
use super::cache::{ResourceCache, ResourceContext};
use super::errors::{MessagingError, MessagingResult};
use super::event_bus::EventBus;
use super::provider::{CreatedResource, RemoteHandle, RemoteResourceProvider};
use super::resource_info::{ResourceAttributes, ResourceInfo, ResourceKind, ResourceMap};
use super::single_flight::KeyedLocks;
use super::watcher::ResourceWatcher;
use crate::app::config::ServiceSettings;
use futures::future::join_all;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::any::Any;
use std::sync::{Arc, RwLock, Weak};

/// Invoked after a swap that asked for a change event.
pub type ResourceChangedCallback = Arc<dyn Fn(&ServiceClient, &ResourceMap) + Send + Sync>;

/// Per-kind behaviour plugged into a [`ServiceClient`].
pub trait ResourceStrategy: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Attributes applied to every create, below configured and caller values.
    fn default_attributes(&self) -> ResourceAttributes {
        ResourceAttributes::new()
    }

    /// Cache entry for a freshly created resource.
    fn info_from_created(&self, name: &str, created: CreatedResource) -> ResourceInfo {
        let mut info = ResourceInfo::new(self.kind(), name)
            .with_arn(created.arn)
            .with_attributes(created.attributes);
        info.url = created.url;
        info
    }

    /// Cache entry for a listed resource. `None` skips it.
    fn info_from_remote(
        &self,
        handle: &RemoteHandle,
        attributes: ResourceAttributes,
    ) -> Option<ResourceInfo> {
        let arn = handle
            .arn
            .clone()
            .or_else(|| attributes.get(self.kind().arn_attribute()).cloned())?;
        let mut info = ResourceInfo::new(self.kind(), handle.name.clone())
            .with_arn(arn)
            .with_attributes(attributes);
        info.url = handle.url.clone();
        Some(info)
    }

    /// Handle used to address a cached resource remotely.
    fn remote_handle(&self, info: &ResourceInfo) -> RemoteHandle {
        RemoteHandle {
            name: info.name.clone(),
            arn: info.arn.clone(),
            url: info.url.clone(),
        }
    }
}

/// Everything needed to build a [`ServiceClient`].
pub struct ServiceClientParts {
    pub name: String,
    pub service_type: String,
    pub strategy: Arc<dyn ResourceStrategy>,
    pub provider: Arc<dyn RemoteResourceProvider>,
    pub settings: ServiceSettings,
    pub context: Arc<ResourceContext>,
}

pub struct ServiceClient {
    name: String,
    service_type: String,
    strategy: Arc<dyn ResourceStrategy>,
    provider: Arc<dyn RemoteResourceProvider>,
    settings: ServiceSettings,
    cache: Arc<ResourceCache>,
    context: Arc<ResourceContext>,
    events: Arc<EventBus>,
    locks: KeyedLocks,
    resource_changed: RwLock<Option<ResourceChangedCallback>>,
    manager: RwLock<Weak<ApiManager>>,
    watcher: OnceCell<Arc<ResourceWatcher>>,
}

impl ServiceClient {
    pub fn new(parts: ServiceClientParts) -> Arc<Self> {
        let kind = parts.strategy.kind();
        let cache = parts.context.cache_for(kind);
        Arc::new(Self {
            events: Arc::new(EventBus::new(parts.name.clone())),
            name: parts.name,
            service_type: parts.service_type,
            strategy: parts.strategy,
            provider: parts.provider,
            settings: parts.settings,
            cache,
            context: parts.context,
            locks: KeyedLocks::new(),
            resource_changed: RwLock::new(None),
            manager: RwLock::new(Weak::new()),
            watcher: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn kind(&self) -> ResourceKind {
        self.strategy.kind()
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn strategy(&self) -> &Arc<dyn ResourceStrategy> {
        &self.strategy
    }

    /// Emit `name` on this client's bus.
    pub fn emit(&self, name: &str, payload: Vec<Value>) -> bool {
        self.events.emit(name, payload)
    }

    /// Emit `<Entity>.<action>`, e.g. `Queue.Created`.
    pub fn emit_lifecycle(&self, action: &str, payload: Vec<Value>) -> bool {
        let event = format!("{}.{}", self.kind().event_entity(), action);
        self.emit(&event, payload)
    }

    // ------------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------------

    pub fn set_resource_changed(&self, callback: ResourceChangedCallback) {
        match self.resource_changed.write() {
            Ok(mut slot) => *slot = Some(callback),
            Err(poisoned) => *poisoned.into_inner() = Some(callback),
        }
    }

    pub fn set_manager(&self, manager: &Arc<ApiManager>) {
        let weak = Arc::downgrade(manager);
        match self.manager.write() {
            Ok(mut slot) => *slot = weak,
            Err(poisoned) => *poisoned.into_inner() = weak,
        }
    }

    /// The manager this client was registered with, if it is still alive.
    pub fn manager(&self) -> Option<Arc<ApiManager>> {
        match self.manager.read() {
            Ok(slot) => slot.upgrade(),
            Err(poisoned) => poisoned.into_inner().upgrade(),
        }
    }

    /// Start (or join) the watcher for this client's kind.
    pub fn ensure_watcher(self: &Arc<Self>) -> Arc<ResourceWatcher> {
        Arc::clone(self.watcher.get_or_init(|| {
            self.context
                .watcher_for(self.kind(), self, self.settings.info_watcher_interval)
        }))
    }

    pub fn watcher(&self) -> Option<&Arc<ResourceWatcher>> {
        self.watcher.get()
    }

    // ------------------------------------------------------------------------
    // Cache access
    // ------------------------------------------------------------------------

    pub fn current_map(&self) -> Arc<ResourceMap> {
        self.cache.snapshot()
    }

    pub fn cached(&self, name: &str) -> Option<ResourceInfo> {
        self.cache.get(name)
    }

    /// Replace the cache contents. With `fire_change_event` the resource-changed
    /// callback runs after the new map is in place.
    pub fn swap(&self, new_map: ResourceMap, fire_change_event: bool) {
        let callback = if fire_change_event {
            match self.resource_changed.read() {
                Ok(slot) => slot.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        } else {
            None
        };

        let count = new_map.len();
        let published = callback.as_ref().map(|_| new_map.clone());
        self.cache.swap(new_map);

        match (callback, published) {
            (Some(callback), Some(map)) => {
                svc_info!(self.name, "Resource map changed ({} entries)", count);
                callback(self, &map);
            }
            _ => svc_debug!(self.name, "Resource map swapped ({} entries)", count),
        }
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Cached info for `name`. On a miss, creates the resource when
    /// `create_if_missing` is set, otherwise resolves to `None`.
    pub async fn get_info(
        &self,
        name: &str,
        create_if_missing: bool,
    ) -> MessagingResult<Option<ResourceInfo>> {
        if let Some(info) = self.cache.get(name) {
            return Ok(Some(info));
        }
        if !create_if_missing {
            return Ok(None);
        }
        self.create(name, &ResourceAttributes::new()).await.map(Some)
    }

    /// Create `name` remotely unless it is already cached.
    ///
    /// Creates and deletes of the same name are serialised. The cache is only
    /// consulted under the name lock, so a create queued behind a delete sees
    /// the entry gone and recreates it.
    pub async fn create(
        &self,
        name: &str,
        attributes: &ResourceAttributes,
    ) -> MessagingResult<ResourceInfo> {
        let _guard = self.locks.lock(name).await;
        if let Some(info) = self.cache.get(name) {
            return Ok(info);
        }

        let merged = self.merge_attributes(attributes);
        svc_info!(self.name, "Creating {} {}", self.kind(), name);

        let created = match self.provider.create_resource(name, &merged).await {
            Ok(created) => created,
            Err(e) => {
                let e = e.for_resource(name);
                svc_error!(self.name, "create {} failed: {}", name, e);
                return Err(e);
            }
        };

        let info = self.strategy.info_from_created(name, created);
        self.cache.insert(info.clone());
        self.emit_lifecycle("Created", vec![Value::String(name.to_string())]);
        Ok(info)
    }

    /// Delete a cached resource. Unknown names fail without a remote call.
    pub async fn delete(&self, name: &str) -> MessagingResult<bool> {
        let _guard = self.locks.lock(name).await;
        let info = self
            .cache
            .get(name)
            .ok_or_else(|| MessagingError::not_found(self.kind(), name))?;

        svc_info!(self.name, "Deleting {} {}", self.kind(), name);
        let handle = self.strategy.remote_handle(&info);
        if let Err(e) = self.provider.delete_resource(&handle).await {
            let e = e.for_resource(name);
            svc_error!(self.name, "delete {} failed: {}", name, e);
            return Err(e);
        }

        self.cache.remove(name);
        self.emit_lifecycle("Deleted", vec![Value::String(name.to_string())]);
        Ok(true)
    }

    /// Remote listing, bypassing the cache.
    pub async fn list_all(&self) -> MessagingResult<Vec<RemoteHandle>> {
        self.provider.list_all().await.map_err(|e| {
            svc_error!(self.name, "list failed: {}", e);
            e
        })
    }

    /// Fresh name -> info map built from the remote listing. Entries whose
    /// attributes cannot be fetched are logged and left out.
    pub async fn get_all_info(&self) -> MessagingResult<ResourceMap> {
        let handles = self.list_all().await?;
        let fetches = handles.iter().map(|handle| async move {
            (handle, self.provider.get_attributes(handle).await)
        });

        let mut map = ResourceMap::with_capacity(handles.len());
        for (handle, result) in join_all(fetches).await {
            match result {
                Ok(attributes) => match self.strategy.info_from_remote(handle, attributes) {
                    Some(info) => {
                        map.insert(info.name.clone(), info);
                    }
                    None => svc_warn!(self.name, "Skipping {}: no ARN reported", handle.name),
                },
                Err(e) => {
                    svc_warn!(self.name, "Attributes for {} unavailable: {}", handle.name, e);
                }
            }
        }
        Ok(map)
    }

    /// Initial fill of an empty cache, without a change event.
    pub async fn preload(&self) -> MessagingResult<bool> {
        if !self.settings.preload_info || !self.cache.is_empty() {
            return Ok(false);
        }
        let map = self.get_all_info().await?;
        svc_info!(self.name, "Preloaded {} {} entries", map.len(), self.kind());
        self.swap(map, false);
        Ok(true)
    }

    pub fn dispose(&self) {
        if let Some(watcher) = self.watcher.get() {
            watcher.dispose();
        }
        match self.resource_changed.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        svc_info!(self.name, "disposed");
    }

    fn merge_attributes(&self, caller: &ResourceAttributes) -> ResourceAttributes {
        let mut merged = self.strategy.default_attributes();
        merged.extend(
            self.settings
                .default_attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        merged.extend(caller.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// A registered service: one of the kind-specific clients.
pub trait MessagingService: Send + Sync + 'static {
    fn core(&self) -> &Arc<ServiceClient>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn kind(&self) -> ResourceKind {
        self.core().kind()
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn dispose(&self) {
        self.core().dispose()
    }
}
