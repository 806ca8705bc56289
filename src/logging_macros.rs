#![warn(clippy::all, rust_2018_idioms)]

//! Service-scoped logging macros.
//!
//! Every service client logs under its own name so that interleaved output from
//! the SQS, SNS and CloudWatch clients can be told apart. The first argument is
//! anything that implements `Display` (usually `self.name()`), the rest is a
//! regular format string.

#[macro_export]
macro_rules! svc_debug {
    ($service:expr, $($arg:tt)*) => {
        tracing::debug!(service = %$service, "[{}] {}", $service, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! svc_info {
    ($service:expr, $($arg:tt)*) => {
        tracing::info!(service = %$service, "[{}] {}", $service, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! svc_warn {
    ($service:expr, $($arg:tt)*) => {
        tracing::warn!(service = %$service, "[{}] {}", $service, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! svc_error {
    ($service:expr, $($arg:tt)*) => {
        tracing::error!(service = %$service, "[{}] {}", $service, format!($($arg)*))
    };
}
