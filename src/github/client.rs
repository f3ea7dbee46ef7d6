//! The outbound GitHub API client used by event handlers.
//!
//! Handlers talk to GitHub only through the [`IssueTracker`] trait, so tests
//! can substitute a recording fake. [`GitHubClient`] is the real
//! implementation. It sends requests through a [`Transport`], which in
//! production is octocrab's raw request methods:
//!
//! - `get` is a conditional GET backed by the shared [`ResponseCache`] and is
//!   retried on transient failures.
//! - `post` is attempted exactly once. A comment that was posted but whose
//!   response got lost must not be posted again.
//!
//! A fresh client is opened for every webhook delivery through
//! [`TrackerFactory`]; only the cache outlives it.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::StatusCode;
use http::header::HeaderMap;
use octocrab::Octocrab;
use octocrab::service::middleware::retry::RetryConfig as TransportRetry;
use serde_json::Value;
use tracing::{debug, trace};

use super::cache::{CachedResponse, ResponseCache};
use super::error::GitHubApiError;
use super::retry::{Backoff, read_with_retry};

/// Rate-limit quota as reported by the last API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    /// When the quota window resets, if GitHub said.
    pub reset: Option<DateTime<Utc>>,
}

impl RateLimit {
    /// Reads the `x-ratelimit-*` headers. Returns `None` unless both the
    /// limit and the remaining count are present and numeric.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };

        let limit = number("x-ratelimit-limit")?;
        let remaining = number("x-ratelimit-remaining")?;
        let reset = number("x-ratelimit-reset")
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Some(Self {
            limit,
            remaining,
            reset,
        })
    }
}

/// Everything a handler may do against GitHub.
///
/// URLs are absolute API URLs as found in webhook payloads (for example an
/// issue's `comments_url`), or paths relative to the API base.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetches a JSON document.
    async fn get(&self, url: &str) -> Result<Value, GitHubApiError>;

    /// Sends `data` as a JSON body and returns the JSON response.
    async fn post(&self, url: &str, data: &Value) -> Result<Value, GitHubApiError>;

    /// The quota observed on the most recent response, if any.
    fn rate_limit(&self) -> Option<RateLimit>;
}

/// Opens one [`IssueTracker`] per webhook delivery.
pub trait TrackerFactory: Send + Sync {
    fn open(&self) -> Box<dyn IssueTracker>;
}

/// A successful or `304 Not Modified` answer, body not yet parsed.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Sends single HTTP requests to the GitHub API.
///
/// Implementations return `Ok` only for 2xx and 304 answers. Every other
/// status becomes a [`GitHubApiError`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: Option<HeaderMap>,
    ) -> Result<RawResponse, GitHubApiError>;

    async fn post(&self, url: &str, data: &Value) -> Result<RawResponse, GitHubApiError>;
}

/// [`Transport`] over octocrab's raw request methods.
#[derive(Clone)]
pub struct OctocrabTransport(Octocrab);

impl OctocrabTransport {
    /// Builds an octocrab instance for `api_base`, authenticated with
    /// `token` when one is given.
    ///
    /// octocrab's own transport retries are disabled. Reads are retried by
    /// [`GitHubClient`] and writes never are.
    pub fn new(token: Option<&str>, api_base: &str) -> Result<Self, octocrab::Error> {
        let mut builder = Octocrab::builder()
            .base_uri(api_base)?
            .add_retry_config(TransportRetry::None);
        if let Some(token) = token {
            builder = builder.personal_token(token.to_string());
        }
        Ok(Self(builder.build()?))
    }
}

#[async_trait]
impl Transport for OctocrabTransport {
    async fn get(
        &self,
        url: &str,
        headers: Option<HeaderMap>,
    ) -> Result<RawResponse, GitHubApiError> {
        let response = self.0._get_with_headers(url, headers).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(RawResponse {
                status: StatusCode::NOT_MODIFIED,
                headers: response.headers().clone(),
                body: String::new(),
            });
        }

        let response = octocrab::map_github_error(response).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = self.0.body_to_string(response).await?;
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    async fn post(&self, url: &str, data: &Value) -> Result<RawResponse, GitHubApiError> {
        let response = self.0._post(url, Some(data)).await?;

        let response = octocrab::map_github_error(response).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = self.0.body_to_string(response).await?;
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Shared, process-wide configuration for [`GitHubClient`]s.
#[derive(Clone)]
pub struct GitHubConnector {
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    backoff: Backoff,
}

impl GitHubConnector {
    /// Connects to `api_base` through octocrab.
    pub fn new(
        token: Option<&str>,
        api_base: &str,
        cache: ResponseCache,
    ) -> Result<Self, octocrab::Error> {
        let transport = OctocrabTransport::new(token, api_base)?;
        Ok(Self::with_transport(Arc::new(transport), cache))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, cache: ResponseCache) -> Self {
        Self {
            transport,
            cache,
            backoff: Backoff::WEBHOOK,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn client(&self) -> GitHubClient {
        GitHubClient {
            transport: self.transport.clone(),
            cache: self.cache.clone(),
            backoff: self.backoff,
            rate_limit: Mutex::new(None),
        }
    }
}

impl TrackerFactory for GitHubConnector {
    fn open(&self) -> Box<dyn IssueTracker> {
        Box::new(self.client())
    }
}

impl std::fmt::Debug for GitHubConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConnector")
            .field("cache", &self.cache)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// An [`IssueTracker`] backed by the GitHub REST API.
pub struct GitHubClient {
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    backoff: Backoff,
    rate_limit: Mutex<Option<RateLimit>>,
}

impl GitHubClient {
    fn observe(&self, headers: &HeaderMap) {
        if let Some(limit) = RateLimit::from_headers(headers) {
            *self
                .rate_limit
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(limit);
        }
    }

    async fn get_once(&self, url: &str) -> Result<Value, GitHubApiError> {
        let cached = self.cache.get(url);
        let conditional = cached.as_ref().map(CachedResponse::conditional_headers);

        let response = self.transport.get(url, conditional).await?;
        self.observe(&response.headers);

        if response.status == StatusCode::NOT_MODIFIED {
            return match cached {
                Some(entry) => {
                    trace!(url, "Not modified; serving cached body");
                    Ok(entry.body)
                }
                None => Err(GitHubApiError::invalid_response(
                    url,
                    "304 Not Modified for an uncached request",
                )),
            };
        }

        let body = parse_json(url, &response.body)?;
        if let Some(entry) = CachedResponse::from_headers(&response.headers, body.clone()) {
            self.cache.put(url, entry);
        }
        Ok(body)
    }
}

/// An empty body (as on `204 No Content`) reads as `null`.
fn parse_json(url: &str, text: &str) -> Result<Value, GitHubApiError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| GitHubApiError::invalid_response(url, e))
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn get(&self, url: &str) -> Result<Value, GitHubApiError> {
        read_with_retry(self.backoff, url, || self.get_once(url)).await
    }

    async fn post(&self, url: &str, data: &Value) -> Result<Value, GitHubApiError> {
        debug!(url, "POST");
        let response = self.transport.post(url, data).await?;
        self.observe(&response.headers);
        parse_json(url, &response.body)
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        *self
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("cache", &self.cache)
            .field("rate_limit", &self.rate_limit())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::GitHubErrorKind;
    use http::header::{HeaderValue, IF_NONE_MATCH};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    const COMMENTS: &str = "https://api.github.com/repos/searxng/searx-instances/issues/7/comments";

    /// Answers requests from a fixed script and records what was asked.
    struct ScriptedTransport {
        answers: Mutex<VecDeque<Result<RawResponse, GitHubApiError>>>,
        requests: Mutex<Vec<(&'static str, String, Option<HeaderMap>)>>,
    }

    impl ScriptedTransport {
        fn new(answers: impl IntoIterator<Item = Result<RawResponse, GitHubApiError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into_iter().collect()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<(&'static str, String, Option<HeaderMap>)> {
            self.requests.lock().unwrap().clone()
        }

        fn answer(
            &self,
            method: &'static str,
            url: &str,
            headers: Option<HeaderMap>,
        ) -> Result<RawResponse, GitHubApiError> {
            self.requests
                .lock()
                .unwrap()
                .push((method, url.to_string(), headers));
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted request")
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(
            &self,
            url: &str,
            headers: Option<HeaderMap>,
        ) -> Result<RawResponse, GitHubApiError> {
            self.answer("GET", url, headers)
        }

        async fn post(&self, url: &str, _data: &Value) -> Result<RawResponse, GitHubApiError> {
            self.answer("POST", url, None)
        }
    }

    fn ok(pairs: &[(&'static str, &'static str)], body: Value) -> Result<RawResponse, GitHubApiError> {
        Ok(RawResponse {
            status: StatusCode::OK,
            headers: headers(pairs),
            body: body.to_string(),
        })
    }

    fn not_modified() -> Result<RawResponse, GitHubApiError> {
        Ok(RawResponse {
            status: StatusCode::NOT_MODIFIED,
            headers: HeaderMap::new(),
            body: String::new(),
        })
    }

    fn client_for(transport: &Arc<ScriptedTransport>) -> GitHubClient {
        GitHubConnector::with_transport(transport.clone(), ResponseCache::default()).client()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn rate_limit_from_headers() {
        let limit = RateLimit::from_headers(&headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "4987"),
            ("x-ratelimit-reset", "1700000000"),
        ]))
        .unwrap();

        assert_eq!(limit.limit, 5000);
        assert_eq!(limit.remaining, 4987);
        assert_eq!(limit.reset.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn rate_limit_reset_is_optional() {
        let limit = RateLimit::from_headers(&headers(&[
            ("x-ratelimit-limit", "60"),
            ("x-ratelimit-remaining", "0"),
        ]))
        .unwrap();
        assert_eq!(limit.remaining, 0);
        assert_eq!(limit.reset, None);
    }

    #[test]
    fn rate_limit_requires_limit_and_remaining() {
        assert_eq!(RateLimit::from_headers(&HeaderMap::new()), None);
        assert_eq!(
            RateLimit::from_headers(&headers(&[("x-ratelimit-remaining", "12")])),
            None
        );
        assert_eq!(
            RateLimit::from_headers(&headers(&[
                ("x-ratelimit-limit", "lots"),
                ("x-ratelimit-remaining", "12"),
            ])),
            None
        );
    }

    #[test]
    fn empty_body_reads_as_null() {
        assert_eq!(parse_json("u", "").unwrap(), Value::Null);
        assert_eq!(parse_json("u", " \n").unwrap(), Value::Null);
    }

    #[test]
    fn json_body_is_parsed() {
        assert_eq!(
            parse_json("u", r#"{"id": 7}"#).unwrap(),
            serde_json::json!({ "id": 7 })
        );
    }

    #[test]
    fn non_json_body_is_a_permanent_error() {
        let err = parse_json("https://api.github.com/x", "<html>").unwrap_err();
        assert_eq!(err.kind, crate::github::GitHubErrorKind::Permanent);
        assert!(err.message.contains("https://api.github.com/x"));
    }

    #[tokio::test]
    async fn get_stores_validated_body_and_revalidates() {
        let transport = ScriptedTransport::new([
            ok(&[("etag", "\"v1\"")], json!([{ "id": 1 }])),
            not_modified(),
        ]);
        let client = client_for(&transport);

        let first = client.get(COMMENTS).await.unwrap();
        let second = client.get(COMMENTS).await.unwrap();

        assert_eq!(first, json!([{ "id": 1 }]));
        assert_eq!(second, first);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].2.is_none());
        let conditional = requests[1].2.as_ref().unwrap();
        assert_eq!(conditional.get(IF_NONE_MATCH).unwrap(), "\"v1\"");
    }

    #[tokio::test]
    async fn response_without_validators_is_not_cached() {
        let transport = ScriptedTransport::new([ok(&[], json!([])), ok(&[], json!([]))]);
        let connector =
            GitHubConnector::with_transport(transport.clone(), ResponseCache::default());

        connector.client().get(COMMENTS).await.unwrap();
        connector.client().get(COMMENTS).await.unwrap();

        assert!(connector.cache().is_empty());
        assert!(transport.requests().iter().all(|(_, _, h)| h.is_none()));
    }

    #[tokio::test]
    async fn cache_outlives_the_client() {
        let transport = ScriptedTransport::new([
            ok(&[("etag", "\"v2\"")], json!({ "n": 2 })),
            not_modified(),
        ]);
        let connector =
            GitHubConnector::with_transport(transport.clone(), ResponseCache::default());

        connector.client().get(COMMENTS).await.unwrap();
        let again = connector.client().get(COMMENTS).await.unwrap();

        assert_eq!(again, json!({ "n": 2 }));
        assert_eq!(connector.cache().len(), 1);
    }

    #[tokio::test]
    async fn not_modified_without_cache_entry_is_an_error() {
        let transport = ScriptedTransport::new([not_modified()]);

        let err = client_for(&transport).get(COMMENTS).await.unwrap_err();

        assert_eq!(err.kind, GitHubErrorKind::Permanent);
        assert!(err.message.contains("304"), "{}", err.message);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_get_failure_is_retried() {
        let transport = ScriptedTransport::new([
            Err(GitHubApiError::from_status(Some(502), "Bad Gateway")),
            ok(&[], json!([])),
        ]);
        let start = Instant::now();

        let body = client_for(&transport).get(COMMENTS).await.unwrap();

        assert_eq!(body, json!([]));
        assert_eq!(transport.requests().len(), 2);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn permanent_get_failure_is_not_retried() {
        let transport =
            ScriptedTransport::new([Err(GitHubApiError::from_status(Some(404), "Not Found"))]);

        let err = client_for(&transport).get(COMMENTS).await.unwrap_err();

        assert_eq!(err.status_code, Some(404));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn post_is_sent_once_even_when_transient() {
        let transport = ScriptedTransport::new([
            Err(GitHubApiError::from_status(Some(502), "Bad Gateway")),
            ok(&[], json!({ "id": 1 })),
        ]);

        let err = client_for(&transport)
            .post(COMMENTS, &json!({ "body": "hi" }))
            .await
            .unwrap_err();

        assert_eq!(err.kind, GitHubErrorKind::Transient);
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "POST");
    }

    #[tokio::test]
    async fn post_returns_created_object_and_observes_quota() {
        let transport = ScriptedTransport::new([ok(
            &[("x-ratelimit-limit", "5000"), ("x-ratelimit-remaining", "4999")],
            json!({ "id": 99 }),
        )]);
        let client = client_for(&transport);
        assert_eq!(client.rate_limit(), None);

        let created = client.post(COMMENTS, &json!({ "body": "hi" })).await.unwrap();

        assert_eq!(created["id"], 99);
        assert_eq!(client.rate_limit().unwrap().remaining, 4999);
    }
}
