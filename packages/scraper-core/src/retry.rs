use std::time::Duration;

/// What the retry loop should do after observing one attempt's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Treat the response body as a fetched page.
    Accept,
    /// Terminal: the product does not exist. No further attempts.
    NotFound,
    /// Try again. `pause` is an extra sleep beyond the progressive backoff
    /// already applied at the start of the next attempt.
    Retry { pause: Option<Duration> },
}

/// Retry policy for product-page fetches.
///
/// Factored out of the fetch loop so the status classification and backoff
/// schedule can be unit-tested without network calls. Attempt numbers are
/// zero-based throughout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Bounded attempt budget per task.
    pub max_attempts: u32,
    /// Per-request socket/read budget.
    pub request_timeout: Duration,
    /// Fixed wait after a 200 before extraction (client-side render wait).
    pub render_wait: Duration,
    /// Flat pause after a request timeout.
    pub timeout_pause: Duration,
    /// Flat pause after any other transport failure or unexpected status.
    pub transport_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            request_timeout: Duration::from_secs(20),
            render_wait: Duration::from_secs(3),
            timeout_pause: Duration::from_secs(5),
            transport_pause: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Progressive backoff applied before every attempt after the first:
    /// `2^attempt + attempt * 2` seconds.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.pow(attempt) + u64::from(attempt) * 2)
    }

    /// Escalated pause for rate-limiting responses: `2^attempt * 5` seconds.
    pub fn rate_limit_pause(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.pow(attempt) * 5)
    }

    /// Classify an HTTP status observed on the given attempt.
    pub fn on_status(&self, attempt: u32, status: u16) -> RetryDecision {
        match status {
            200 => RetryDecision::Accept,
            404 => RetryDecision::NotFound,
            // Anti-bot rejection: worth retrying with a rotated identity.
            403 => RetryDecision::Retry { pause: None },
            429 | 503 => RetryDecision::Retry {
                pause: Some(self.rate_limit_pause(attempt)),
            },
            _ => RetryDecision::Retry {
                pause: Some(self.transport_pause),
            },
        }
    }

    /// True when `attempt` (zero-based) leaves further attempts in the budget.
    pub fn attempts_remain(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_progressive() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(14));
        assert_eq!(policy.backoff(4), Duration::from_secs(24));
    }

    #[test]
    fn rate_limit_pause_escalates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_pause(0), Duration::from_secs(5));
        assert_eq!(policy.rate_limit_pause(2), Duration::from_secs(20));
    }

    #[test]
    fn status_classification() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.on_status(0, 200), RetryDecision::Accept);
        assert_eq!(policy.on_status(0, 404), RetryDecision::NotFound);
        assert_eq!(
            policy.on_status(0, 403),
            RetryDecision::Retry { pause: None }
        );
        assert_eq!(
            policy.on_status(1, 429),
            RetryDecision::Retry {
                pause: Some(Duration::from_secs(10))
            }
        );
        assert_eq!(
            policy.on_status(1, 503),
            RetryDecision::Retry {
                pause: Some(Duration::from_secs(10))
            }
        );
        assert_eq!(
            policy.on_status(0, 500),
            RetryDecision::Retry {
                pause: Some(Duration::from_secs(3))
            }
        );
    }

    #[test]
    fn attempt_budget_is_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.attempts_remain(3));
        assert!(!policy.attempts_remain(4));
    }
}
