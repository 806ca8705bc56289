//! Error types surfaced by service clients.

use super::resource_info::ResourceKind;
use std::fmt;

/// Result type for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

/// A failed remote call, with enough context to log and classify it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub service: String,
    pub operation: String,
    pub resource: Option<String>,
    /// Error code reported by the remote side, or a category label when none was given
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl RemoteError {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            resource: None,
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.operation)?;
        if let Some(resource) = &self.resource {
            write!(f, " [{}]", resource)?;
        }
        write!(f, " failed ({}): {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Errors returned by the messaging core
#[derive(Debug, Clone, PartialEq)]
pub enum MessagingError {
    /// The named resource is not in the cache where absence is not a valid outcome
    NotFound { kind: ResourceKind, name: String },
    /// The remote provider rejected the call
    Remote(RemoteError),
    /// No service is registered under that name
    UnknownService(String),
    /// The request cannot be satisfied as given
    InvalidArgument(String),
    /// Configuration is missing or unreadable
    Configuration(String),
}

impl MessagingError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        MessagingError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MessagingError::NotFound { .. })
    }

    /// Attach the resource name to a remote error that does not carry one yet.
    pub fn for_resource(self, name: &str) -> Self {
        match self {
            MessagingError::Remote(mut err) if err.resource.is_none() => {
                err.resource = Some(name.to_string());
                MessagingError::Remote(err)
            }
            other => other,
        }
    }
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagingError::NotFound { kind, name } => {
                write!(f, "{} '{}' was not found", kind, name)
            }
            MessagingError::Remote(err) => write!(f, "Remote call failed: {}", err),
            MessagingError::UnknownService(name) => write!(f, "Unknown service: {}", name),
            MessagingError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            MessagingError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for MessagingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MessagingError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RemoteError> for MessagingError {
    fn from(err: RemoteError) -> Self {
        MessagingError::Remote(err)
    }
}
