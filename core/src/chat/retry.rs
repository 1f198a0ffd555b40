use reqwest::StatusCode;
use std::time::{Duration, SystemTime};

/// Bounds for retrying a chat completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry when the server gives no hint.
    pub base_delay: Duration,
    /// Upper bound for any delay, hinted or computed.
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
        }
    }

    /// A policy that never retries.
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(20), 2)
    }
}

/// What went wrong with the last attempt.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Http {
        status: StatusCode,
        retry_after: Option<Duration>,
    },
    /// Connect or timeout failure; no response was received.
    Transport,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration, used_hint: bool },
    GiveUp,
}

/// Decide whether to retry after `previous_retries` retries have been made.
pub fn evaluate_retry(failure: Failure, policy: RetryPolicy, previous_retries: u32) -> RetryDecision {
    if previous_retries >= policy.max_retries {
        return RetryDecision::GiveUp;
    }

    let hint = match failure {
        Failure::Fatal => return RetryDecision::GiveUp,
        Failure::Http { status, .. } if !is_retryable_status(status) => {
            return RetryDecision::GiveUp
        }
        Failure::Http { retry_after, .. } => retry_after,
        Failure::Transport => None,
    };

    match hint {
        Some(delay) => RetryDecision::Retry {
            delay: delay.min(policy.max_delay),
            used_hint: true,
        },
        None => RetryDecision::Retry {
            delay: backoff(policy, previous_retries),
            used_hint: false,
        },
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn backoff(policy: RetryPolicy, previous_retries: u32) -> Duration {
    let multiplier = 1u32.checked_shl(previous_retries).unwrap_or(u32::MAX);
    policy
        .base_delay
        .checked_mul(multiplier)
        .unwrap_or(policy.max_delay)
        .min(policy.max_delay)
}

/// Parse an HTTP `Retry-After` value: delta seconds or an HTTP date.
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let instant = httpdate::parse_http_date(trimmed).ok()?;
    Some(instant.duration_since(now).unwrap_or(Duration::ZERO))
}
