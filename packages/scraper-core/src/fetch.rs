use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, DNT, REFERER};
use thiserror::Error;

use crate::proxy::ProxyEndpoint;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::types::{FetchOutcome, ProductTask};

/// User-agent rotation pool, indexed by attempt number.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:90.0) Gecko/20100101 Firefox/90.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/91.0.864.59",
];

/// A raw HTTP response observed by a single attempt.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

/// Transport-level failure for a single attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Per-attempt request parameters chosen by the retry loop.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    pub user_agent: &'a str,
    /// Set from the second attempt onward.
    pub referer: Option<String>,
    /// Fixed for all attempts of one task; only the user-agent rotates.
    pub proxy: Option<&'a ProxyEndpoint>,
}

/// Seam between the retry loop and the network, so the loop can be tested
/// against scripted responses.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str, ctx: &RequestContext<'_>) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher. Builds a fresh client per call so every attempt
/// starts from a clean connection context.
pub struct ReqwestFetcher {
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn classify_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(error.to_string())
    }
}

#[async_trait]
impl PageFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, ctx: &RequestContext<'_>) -> Result<FetchedPage, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(DNT, HeaderValue::from_static("1"));

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .user_agent(ctx.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(proxy) = ctx.proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let mut request = client.get(url);
        if let Some(referer) = &ctx.referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(classify_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_error)?;

        Ok(FetchedPage { status, body })
    }
}

/// Retrieval client: drives one (domain, product) fetch through the retry
/// policy, rotating user-agents per attempt and holding the worker's proxy
/// fixed across attempts.
pub struct ProductClient<F: PageFetcher> {
    fetcher: F,
    policy: RetryPolicy,
}

impl<F: PageFetcher> ProductClient<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_policy(fetcher, RetryPolicy::default())
    }

    pub fn with_policy(fetcher: F, policy: RetryPolicy) -> Self {
        Self { fetcher, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch the product page for `task`, retrying per the policy. Never
    /// returns an error: exhausted retries resolve to
    /// [`FetchOutcome::FailedAllAttempts`].
    pub async fn fetch(&self, task: &ProductTask, proxy: Option<&ProxyEndpoint>) -> FetchOutcome {
        let url = task.url();

        for attempt in 0..self.policy.max_attempts {
            let user_agent = USER_AGENTS[attempt as usize % USER_AGENTS.len()];
            let referer = (attempt > 0).then(|| format!("https://{}/", task.domain));

            if attempt > 0 {
                let backoff = self.policy.backoff(attempt);
                tracing::debug!(url = %url, attempt, backoff_secs = backoff.as_secs(), "waiting before retry");
                tokio::time::sleep(backoff).await;
            }

            tracing::info!(
                url = %url,
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts,
                proxied = proxy.is_some(),
                "fetching product page"
            );

            let ctx = RequestContext {
                user_agent,
                referer,
                proxy,
            };

            match self.fetcher.get(&url, &ctx).await {
                Ok(page) => match self.policy.on_status(attempt, page.status) {
                    RetryDecision::Accept => {
                        tracing::debug!(url = %url, "fetched, waiting for render");
                        tokio::time::sleep(self.policy.render_wait).await;
                        return FetchOutcome::Page { body: page.body };
                    }
                    RetryDecision::NotFound => {
                        tracing::warn!(url = %url, "product not found (404)");
                        return FetchOutcome::NotFound;
                    }
                    RetryDecision::Retry { pause } => {
                        tracing::warn!(url = %url, status = page.status, attempt = attempt + 1, "retryable status");
                        if self.policy.attempts_remain(attempt) {
                            if let Some(pause) = pause {
                                tokio::time::sleep(pause).await;
                            }
                        }
                    }
                },
                Err(FetchError::Timeout) => {
                    tracing::warn!(url = %url, attempt = attempt + 1, "request timed out");
                    if self.policy.attempts_remain(attempt) {
                        tokio::time::sleep(self.policy.timeout_pause).await;
                    }
                }
                Err(FetchError::Transport(reason)) => {
                    tracing::warn!(url = %url, attempt = attempt + 1, %reason, "transport failure");
                    if self.policy.attempts_remain(attempt) {
                        tokio::time::sleep(self.policy.transport_pause).await;
                    }
                }
            }
        }

        tracing::error!(url = %url, attempts = self.policy.max_attempts, "all fetch attempts exhausted");
        FetchOutcome::FailedAllAttempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted fetcher: pops one canned result per call and records the
    /// request contexts it saw.
    struct ScriptedFetcher {
        script: Mutex<Vec<Result<FetchedPage, FetchError>>>,
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<FetchedPage, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn status(status: u16) -> Result<FetchedPage, FetchError> {
            Ok(FetchedPage {
                status,
                body: String::new(),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PageFetcher for &ScriptedFetcher {
        async fn get(
            &self,
            _url: &str,
            ctx: &RequestContext<'_>,
        ) -> Result<FetchedPage, FetchError> {
            self.seen
                .lock()
                .unwrap()
                .push((ctx.user_agent.to_string(), ctx.referer.clone()));
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                panic!("fetcher called more times than scripted");
            }
            script.remove(0)
        }
    }

    fn task() -> ProductTask {
        ProductTask::new("shop.example.com", "110474")
    }

    #[tokio::test(start_paused = true)]
    async fn ok_response_yields_page() {
        let fetcher = ScriptedFetcher::new(vec![Ok(FetchedPage {
            status: 200,
            body: "<html></html>".to_string(),
        })]);
        let client = ProductClient::new(&fetcher);

        let outcome = client.fetch(&task(), None).await;
        assert_eq!(
            outcome,
            FetchOutcome::Page {
                body: "<html></html>".to_string()
            }
        );
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_terminal_with_no_retries() {
        let fetcher = ScriptedFetcher::new(vec![ScriptedFetcher::status(404)]);
        let client = ProductClient::new(&fetcher);

        let outcome = client.fetch(&task(), None).await;
        assert_eq!(outcome, FetchOutcome::NotFound);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn five_forbidden_responses_exhaust_the_budget() {
        let fetcher = ScriptedFetcher::new(vec![
            ScriptedFetcher::status(403),
            ScriptedFetcher::status(403),
            ScriptedFetcher::status(403),
            ScriptedFetcher::status(403),
            ScriptedFetcher::status(403),
        ]);
        let client = ProductClient::new(&fetcher);

        let outcome = client.fetch(&task(), None).await;
        assert_eq!(outcome, FetchOutcome::FailedAllAttempts);
        assert_eq!(fetcher.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_then_success_recovers() {
        let fetcher = ScriptedFetcher::new(vec![
            ScriptedFetcher::status(429),
            Ok(FetchedPage {
                status: 200,
                body: "ok".to_string(),
            }),
        ]);
        let client = ProductClient::new(&fetcher);

        let outcome = client.fetch(&task(), None).await;
        assert_eq!(
            outcome,
            FetchOutcome::Page {
                body: "ok".to_string()
            }
        );
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_retried() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::Timeout),
            Ok(FetchedPage {
                status: 200,
                body: "ok".to_string(),
            }),
        ]);
        let client = ProductClient::new(&fetcher);

        let outcome = client.fetch(&task(), None).await;
        assert_eq!(
            outcome,
            FetchOutcome::Page {
                body: "ok".to_string()
            }
        );
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn user_agent_rotates_and_referer_appears_after_first_attempt() {
        let fetcher = ScriptedFetcher::new(vec![
            ScriptedFetcher::status(403),
            ScriptedFetcher::status(403),
            ScriptedFetcher::status(200),
        ]);
        let client = ProductClient::new(&fetcher);

        let _ = client.fetch(&task(), None).await;

        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, USER_AGENTS[0]);
        assert_eq!(seen[1].0, USER_AGENTS[1]);
        assert_eq!(seen[2].0, USER_AGENTS[2]);
        assert!(seen[0].1.is_none());
        assert_eq!(seen[1].1.as_deref(), Some("https://shop.example.com/"));
        assert_eq!(seen[2].1.as_deref(), Some("https://shop.example.com/"));
    }
}
