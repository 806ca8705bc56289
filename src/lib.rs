//! AWS Messaging - a REST façade over SQS, SNS and CloudWatch alarms
//!
//! The service exposes queues, topics and alarms through HTTP endpoints and keeps a
//! process-local view of what exists on the AWS side. That view is refreshed by
//! polling, and every change to it is republished as an internal event that
//! WebSocket clients can subscribe to.
//!
//! # Architecture Overview
//!
//! - **Resource model** ([`app::messaging::resource_info`]): one value type describing
//!   a queue, topic or alarm.
//! - **Event bus** ([`app::messaging::event_bus`]): wildcard publish/subscribe with a
//!   fixed `AWS.` namespace, chained from each service up to the [`ApiManager`].
//! - **Resource cache** ([`app::messaging::cache`]): one authoritative name → resource
//!   map per resource kind, replaced atomically.
//! - **Service clients** ([`app::messaging::service_client`]): cache-first
//!   create/get/delete with per-name single-flight, specialised by
//!   [`QueueClient`], [`TopicClient`] and [`AlarmClient`].
//! - **Watcher** ([`app::messaging::watcher`]): background drift detection between
//!   the cache and the remote account.
//! - **Providers** ([`app::aws`], [`app::mock`]): the AWS SDK backed implementation and
//!   an in-memory one used in mocking mode and in tests.
//! - **REST adapter** ([`app::api_server`]): axum routes and the `/events` socket.
//!
//! # Getting Started
//!
//! Build a [`app::config::MessagingConfig`], a [`app::messaging::cache::ResourceContext`]
//! and a [`app::messaging::registry::ServiceRegistry`], then hand them to
//! [`ApiManager::from_config`].

#![warn(clippy::all, rust_2018_idioms)]

#[macro_use]
pub mod logging_macros;

pub mod app;

pub use app::messaging::{AlarmClient, ApiManager, QueueClient, TopicClient};
