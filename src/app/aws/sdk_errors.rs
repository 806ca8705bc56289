//! Turning AWS SDK failures into [`RemoteError`]s.
//!
//! The SDK already retries transient failures with backoff. What reaches us is
//! final; we only classify it so logs and HTTP responses say whether trying again
//! later is worthwhile and whether credentials are the problem.

use crate::app::messaging::errors::{MessagingError, RemoteError};
use aws_sdk_sqs::error::ProvideErrorMetadata;

/// Broad classes of SDK failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited
    Throttled { code: String },
    Timeout,
    /// Could not reach the endpoint
    Network,
    /// AWS-side transient failure
    ServiceUnavailable,
    /// Anything else: validation, missing resources, permissions
    NonRetryable { code: String, is_permission_error: bool },
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCategory::NonRetryable { .. })
    }

    /// Code used when the SDK does not report one
    pub fn code(&self) -> &str {
        match self {
            ErrorCategory::Throttled { code } => code,
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::Network => "NetworkError",
            ErrorCategory::ServiceUnavailable => "ServiceUnavailable",
            ErrorCategory::NonRetryable { code, .. } => code,
        }
    }
}

/// Convert an SDK error from any service client into a [`MessagingError::Remote`].
pub fn remote_error<E>(err: E, service: &str, operation: &str) -> MessagingError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let reported_code = err.code().map(str::to_string);
    let reported_message = err.message().map(str::to_string);
    let err = anyhow::Error::new(err);

    let category = categorize_error(&err, service, operation);
    let code = reported_code.unwrap_or_else(|| category.code().to_string());
    let message = reported_message.unwrap_or_else(|| truncate_message(&format!("{:#}", err), 200));

    RemoteError::new(service, operation, code, message)
        .retryable(category.is_retryable())
        .into()
}

/// Convert a failure that carries no SDK metadata (e.g. a missing response field).
pub fn remote_failure(err: anyhow::Error, service: &str, operation: &str) -> MessagingError {
    let category = categorize_error(&err, service, operation);
    RemoteError::new(
        service,
        operation,
        category.code().to_string(),
        truncate_message(&format!("{:#}", err), 200),
    )
    .retryable(category.is_retryable())
    .into()
}

/// Categorize an error, preferring the Debug rendering for SDK service errors
/// since their Display only says "service error".
pub fn categorize_error(error: &anyhow::Error, service: &str, operation: &str) -> ErrorCategory {
    let display = error.to_string();
    let detail = if display.contains("service error") {
        format!("{:?}", error)
    } else {
        display
    };
    categorize_error_string(&detail, service, operation)
}

pub fn categorize_error_string(error_str: &str, service: &str, operation: &str) -> ErrorCategory {
    const THROTTLING: [&str; 6] = [
        "Throttling",
        "TooManyRequestsException",
        "RequestLimitExceeded",
        "RequestThrottled",
        "LimitExceededException",
        "RateExceeded",
    ];
    const PERMISSION: [&str; 6] = [
        "AccessDenied",
        "AuthorizationError",
        "UnauthorizedOperation",
        "InvalidClientTokenId",
        "SignatureDoesNotMatch",
        "ExpiredToken",
    ];

    if THROTTLING.iter().any(|p| error_str.contains(p)) {
        let code = extract_error_code(error_str).unwrap_or_else(|| "Throttling".to_string());
        return ErrorCategory::Throttled { code };
    }

    if error_str.contains("TimeoutError")
        || error_str.contains("timeout")
        || error_str.contains("timed out")
    {
        tracing::debug!("{}:{} timed out", service, operation);
        return ErrorCategory::Timeout;
    }

    if error_str.contains("DispatchFailure")
        || error_str.contains("connection")
        || error_str.contains("Connection")
        || error_str.contains("DNS")
        || error_str.contains("socket")
    {
        return ErrorCategory::Network;
    }

    if error_str.contains("ServiceUnavailable")
        || error_str.contains("InternalError")
        || error_str.contains("InternalFailure")
        || error_str.contains("Service Unavailable")
    {
        return ErrorCategory::ServiceUnavailable;
    }

    let is_permission_error = PERMISSION.iter().any(|p| error_str.contains(p));
    let code = extract_error_code(error_str).unwrap_or_else(|| {
        if is_permission_error {
            "AccessDenied".to_string()
        } else {
            "Error".to_string()
        }
    });
    ErrorCategory::NonRetryable {
        code,
        is_permission_error,
    }
}

/// Pull an error code out of `Code: message` or a Debug dump containing `code: Some("Code")`.
fn extract_error_code(error_str: &str) -> Option<String> {
    if let Some(pos) = error_str.find(':') {
        let prefix = error_str[..pos].trim();
        let looks_like_code = !prefix.contains(' ')
            && prefix.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        if looks_like_code {
            let code = prefix.rsplit("::").next().unwrap_or(prefix);
            if !code.is_empty() && code.len() < 64 {
                return Some(code.to_string());
            }
        }
    }

    let start = error_str.find("code:")?;
    let after = &error_str[start + 5..];
    let open = after.find('"')?;
    let rest = &after[open + 1..];
    let close = rest.find('"')?;
    let code = &rest[..close];
    (!code.is_empty() && code.len() < 64).then(|| code.to_string())
}

fn truncate_message(msg: &str, max_len: usize) -> String {
    if msg.len() <= max_len {
        return msg.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &msg[..end])
}
