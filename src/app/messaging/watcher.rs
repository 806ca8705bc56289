//! Background drift detection between a cache and the remote account.

use super::errors::MessagingResult;
use super::resource_info::ResourceMap;
use super::service_client::ServiceClient;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Polls one service client's remote listing and swaps the cache (firing a change
/// event) whenever the set of resource names differs from what is cached.
///
/// Only key sets are compared: attribute changes on an existing name are not drift.
#[derive(Debug)]
pub struct ResourceWatcher {
    service: String,
    client: Weak<ServiceClient>,
    interval_secs: i64,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl ResourceWatcher {
    /// Create the watcher and, for a positive interval, spawn its polling task.
    ///
    /// Needs a Tokio runtime to poll; without one the watcher stays idle.
    pub fn start(client: &Arc<ServiceClient>, interval_secs: i64) -> Self {
        let watcher = Self {
            service: client.name().to_string(),
            client: Arc::downgrade(client),
            interval_secs,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        };

        if interval_secs <= 0 {
            svc_info!(watcher.service, "Resource watcher disabled (interval {})", interval_secs);
            return watcher;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                svc_warn!(watcher.service, "No async runtime, resource watcher not started");
                return watcher;
            }
        };

        let period = Duration::from_secs(interval_secs as u64);
        let client = watcher.client.clone();
        let cancel = watcher.cancel.clone();
        let service = watcher.service.clone();
        watcher.running.store(true, Ordering::SeqCst);
        handle.spawn(run(service, client, period, cancel));
        svc_info!(watcher.service, "Resource watcher polling every {}s", interval_secs);
        watcher
    }

    pub fn interval_secs(&self) -> i64 {
        self.interval_secs
    }

    /// Whether a polling task was started and has not been disposed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Run one poll cycle now. Returns `true` when the cache was swapped.
    pub async fn poll_once(&self) -> MessagingResult<bool> {
        match self.client.upgrade() {
            Some(client) => poll(&client).await,
            None => Ok(false),
        }
    }

    /// Stop polling. Safe to call repeatedly, or on a watcher that never started.
    pub fn dispose(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            if self.running.swap(false, Ordering::SeqCst) {
                svc_info!(self.service, "Resource watcher stopped");
            }
        }
    }
}

impl Drop for ResourceWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    service: String,
    client: Weak<ServiceClient>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; polling starts one period in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(client) = client.upgrade() else {
                    svc_debug!(service, "Service client dropped, watcher exiting");
                    break;
                };
                if let Err(e) = poll(&client).await {
                    svc_warn!(service, "Resource watcher cycle failed: {}", e);
                }
            }
        }
    }
}

async fn poll(client: &ServiceClient) -> MessagingResult<bool> {
    let before = client.current_map();
    let fresh = client.get_all_info().await?;
    let current = client.current_map();
    // A create or delete landed while listing; the listing may predate it.
    if !Arc::ptr_eq(&before, &current) {
        svc_debug!(client.name(), "Cache changed during poll, skipping swap");
        return Ok(false);
    }
    if same_key_set(&current, &fresh) {
        return Ok(false);
    }
    client.swap(fresh, true);
    Ok(true)
}

/// True when both maps have exactly the same keys.
pub fn same_key_set<V, W>(a: &HashMap<String, V>, b: &HashMap<String, W>) -> bool {
    a.len() == b.len() && a.keys().all(|k| b.contains_key(k))
}

/// Convenience for callers holding a [`ResourceMap`] pair.
pub fn maps_differ(current: &ResourceMap, fresh: &ResourceMap) -> bool {
    !same_key_set(current, fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::messaging::resource_info::{ResourceInfo, ResourceKind};

    fn map(names: &[&str], arn_suffix: &str) -> ResourceMap {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    ResourceInfo::new(ResourceKind::Queue, *n).with_arn(format!("{}{}", n, arn_suffix)),
                )
            })
            .collect()
    }

    #[test]
    fn test_equal_key_sets_ignore_values() {
        assert!(same_key_set(&map(&["A", "B"], "-1"), &map(&["B", "A"], "-2")));
        assert!(!maps_differ(&map(&["A", "B"], "-1"), &map(&["A", "B"], "-2")));
    }

    #[test]
    fn test_differing_key_sets() {
        assert!(maps_differ(&map(&["A", "B"], ""), &map(&["A", "C"], "")));
        assert!(maps_differ(&map(&["A"], ""), &map(&["A", "B"], "")));
        assert!(maps_differ(&map(&["A", "B"], ""), &map(&[], "")));
        assert!(!maps_differ(&map(&[], ""), &map(&[], "")));
    }
}
