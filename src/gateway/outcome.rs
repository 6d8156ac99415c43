use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of a single forward attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Gateway answered 2xx
    Delivered,
    /// Transient condition; the same request may succeed later.
    /// `retry_after` carries the server's Retry-After hint, if any.
    RetryableFailure {
        cause: FailureCause,
        retry_after: Option<Duration>,
    },
    /// The gateway will not accept this request no matter how often it is sent
    PermanentFailure { cause: FailureCause },
}

impl ForwardOutcome {
    /// Metric / log label
    pub fn label(&self) -> &'static str {
        match self {
            ForwardOutcome::Delivered => "delivered",
            ForwardOutcome::RetryableFailure { .. } => "retryable",
            ForwardOutcome::PermanentFailure { .. } => "permanent",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ForwardOutcome::RetryableFailure { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Timeout,
    Connect(String),
    Network(String),
    Status { code: u16, body: String },
    InvalidRequest(String),
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::Timeout => write!(f, "request timed out"),
            FailureCause::Connect(e) => write!(f, "connection failed: {}", e),
            FailureCause::Network(e) => write!(f, "network error: {}", e),
            FailureCause::Status { code, body } if body.is_empty() => {
                write!(f, "HTTP {}", code)
            }
            FailureCause::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            FailureCause::InvalidRequest(e) => write!(f, "invalid request: {}", e),
        }
    }
}

/// Classify a gateway status code.
///
/// - 2xx: delivered
/// - 429, 503: retryable, Retry-After honored
/// - other 5xx: retryable
/// - other 4xx and anything unexpected: permanent
pub fn classify_status(code: u16, retry_after: Option<Duration>, body: String) -> ForwardOutcome {
    match code {
        200..=299 => ForwardOutcome::Delivered,
        429 | 503 => ForwardOutcome::RetryableFailure {
            cause: FailureCause::Status { code, body },
            retry_after,
        },
        500..=599 => ForwardOutcome::RetryableFailure {
            cause: FailureCause::Status { code, body },
            retry_after: None,
        },
        _ => ForwardOutcome::PermanentFailure {
            cause: FailureCause::Status { code, body },
        },
    }
}

/// Parse a Retry-After value: delta-seconds or an HTTP-date.
/// Dates in the past yield a zero wait.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(200, None, String::new()), ForwardOutcome::Delivered);
        assert_eq!(classify_status(204, None, String::new()), ForwardOutcome::Delivered);

        for code in [500, 502, 504] {
            assert!(classify_status(code, None, String::new()).is_retryable());
        }
        for code in [400, 401, 403, 404, 409, 422] {
            assert_eq!(classify_status(code, None, String::new()).label(), "permanent");
        }
        assert_eq!(classify_status(302, None, String::new()).label(), "permanent");
    }

    #[test]
    fn test_retry_after_only_kept_for_429_and_503() {
        let hint = Some(Duration::from_secs(5));
        for code in [429, 503] {
            match classify_status(code, hint, String::new()) {
                ForwardOutcome::RetryableFailure { retry_after, .. } => {
                    assert_eq!(retry_after, hint)
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        match classify_status(500, hint, String::new()) {
            ForwardOutcome::RetryableFailure { retry_after, .. } => assert!(retry_after.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_retry_after() {
        let now: DateTime<Utc> = "2015-10-21T07:28:00Z".parse().unwrap();
        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn test_cause_display() {
        let cause = FailureCause::Status {
            code: 400,
            body: "Bad Request".to_string(),
        };
        assert_eq!(cause.to_string(), "HTTP 400: Bad Request");
        assert_eq!(FailureCause::Timeout.to_string(), "request timed out");
    }
}
