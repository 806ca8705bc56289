//! Core application modules.
//!
//! # Module Organization
//!
//! - [`config`] - JSON configuration with per-service settings
//! - [`messaging`] - resource caches, watchers, event bus and the service clients
//! - [`aws`] - AWS SDK backed providers and SDK error categorisation
//! - [`mock`] - in-memory providers for mocking mode and tests
//! - [`api_server`] - axum REST adapter and the `/events` WebSocket
//!
//! # Architecture
//!
//! [`api_server`] calls into [`messaging::ApiManager`], which owns one service
//! client per configured service. Each client talks to a provider from [`aws`]
//! or [`mock`], chosen once at startup through [`messaging::registry::Backend`].

pub mod api_server;
pub mod aws;
pub mod config;
pub mod messaging;
pub mod mock;
