//! Wildcard publish/subscribe bus with a fixed namespace prefix.
//!
//! Event names are dot-segmented (`AWS.Queue.Created`). Subscription patterns use
//! `*` for exactly one segment and `**` for zero or more segments. Emission is
//! synchronous: every matching handler runs on the emitting task, in registration
//! order, before `emit` returns.

use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Namespace every event name is normalised into.
pub const DEFAULT_PREFIX: &str = "AWS.";

/// A published event: normalised name plus the flat, ordered payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub payload: Vec<Value>,
}

impl Event {
    /// Name with the bus prefix removed, e.g. `Queue.Created`.
    pub fn short_name<'a>(&'a self, prefix: &str) -> &'a str {
        self.name.strip_prefix(prefix).unwrap_or(&self.name)
    }
}

pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPattern {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    Multi,
}

impl EventPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .map(|s| match s {
                "*" => Segment::Single,
                "**" => Segment::Multi,
                other => Segment::Literal(other.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, name: &str) -> bool {
        let parts: Vec<&str> = name.split('.').collect();
        match_segments(&self.segments, &parts)
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn match_segments(pattern: &[Segment], name: &[&str]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((Segment::Multi, rest)) => {
            // `**` absorbs zero or more segments
            (0..=name.len()).any(|skip| match_segments(rest, &name[skip..]))
        }
        Some((Segment::Single, rest)) => !name.is_empty() && match_segments(rest, &name[1..]),
        Some((Segment::Literal(lit), rest)) => {
            name.first().is_some_and(|first| first == lit) && match_segments(rest, &name[1..])
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    pattern: EventPattern,
    handler: EventHandler,
}

/// Wildcard event bus. One per service client, plus one on the [`ApiManager`].
///
/// [`ApiManager`]: crate::app::messaging::api_manager::ApiManager
pub struct EventBus {
    name: String,
    prefix: String,
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_prefix(name, DEFAULT_PREFIX)
    }

    pub fn with_prefix(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prepend the namespace prefix unless the name already carries it.
    pub fn normalize(&self, name: &str) -> String {
        if name.starts_with(&self.prefix) {
            name.to_string()
        } else {
            format!("{}{}", self.prefix, name)
        }
    }

    /// Register `handler` for every event whose normalised name matches `pattern`.
    ///
    /// Patterns are matched as given; they are not prefixed.
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            id,
            pattern: EventPattern::parse(pattern),
            handler: Arc::new(handler),
        };
        match self.subscriptions.write() {
            Ok(mut subs) => subs.push(subscription),
            Err(poisoned) => poisoned.into_inner().push(subscription),
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = match self.subscriptions.write() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        match self.subscriptions.read() {
            Ok(subs) => subs.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Publish an event. Returns `true` when at least one handler matched.
    ///
    /// A panicking handler is logged and skipped; later handlers still run.
    pub fn emit(&self, name: &str, payload: Vec<Value>) -> bool {
        let event = Event {
            name: self.normalize(name),
            payload,
        };

        // Snapshot so handlers may subscribe or emit without deadlocking.
        let matched: Vec<(String, EventHandler)> = {
            let subs = match self.subscriptions.read() {
                Ok(subs) => subs,
                Err(poisoned) => poisoned.into_inner(),
            };
            subs.iter()
                .filter(|s| s.pattern.matches(&event.name))
                .map(|s| (s.pattern.as_str().to_string(), Arc::clone(&s.handler)))
                .collect()
        };

        tracing::trace!(bus = %self.name, event = %event.name, handlers = matched.len(), "emit");

        for (pattern, handler) in &matched {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(
                    bus = %self.name,
                    event = %event.name,
                    pattern = %pattern,
                    "event handler panicked"
                );
            }
        }

        !matched.is_empty()
    }

    /// Re-publish every event of this bus onto `parent`, keeping the name and the
    /// flat payload. The parent is held weakly; once it is dropped forwarding stops.
    pub fn forward_to(&self, parent: &Arc<EventBus>) -> SubscriptionId {
        let parent: Weak<EventBus> = Arc::downgrade(parent);
        let pattern = format!("{}**", self.prefix);
        self.subscribe(&pattern, move |event| {
            if let Some(parent) = parent.upgrade() {
                parent.emit(&event.name, event.payload.clone());
            }
        })
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
