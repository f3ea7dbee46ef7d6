//! Shared test utilities: signed deliveries, event builders and a recording
//! stand-in for the GitHub API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::github::{GitHubApiError, IssueTracker, RateLimit, TrackerFactory};
use crate::types::DeliveryId;
use crate::webhooks::event::{Event, HEADER_DELIVERY, HEADER_EVENT, HEADER_SIGNATURE};
use crate::webhooks::signature::{compute_signature, format_signature_header};

pub const TEST_SECRET: &[u8] = b"It's a Secret to Everybody";

/// Headers of a correctly signed JSON delivery.
pub fn signed_headers(event_type: &str, delivery_id: &str, body: &[u8]) -> HeaderMap {
    let signature = format_signature_header(&compute_signature(body, TEST_SECRET));

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(HEADER_EVENT, HeaderValue::from_str(event_type).unwrap());
    headers.insert(HEADER_DELIVERY, HeaderValue::from_str(delivery_id).unwrap());
    headers.insert(HEADER_SIGNATURE, HeaderValue::from_str(&signature).unwrap());
    headers
}

/// An already-parsed event with a fixed delivery ID.
pub fn event(event_type: &str, payload: Value) -> Event {
    Event::new(DeliveryId::new("test-delivery"), event_type, payload)
}

#[derive(Default)]
struct MockState {
    posts: Mutex<Vec<(String, Value)>>,
    gets: Mutex<Vec<String>>,
    comments: Mutex<Vec<Value>>,
    next_id: AtomicU64,
}

/// Records every call. Clones share the same record, so a test can hand one
/// clone to the code under test and inspect another.
///
/// Posted comments are kept, and every GET answers with the comment list.
#[derive(Clone, Default)]
pub struct MockTracker {
    state: Arc<MockState>,
    fail_posts: bool,
    fail_gets: bool,
    rate_limit: Option<RateLimit>,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts fail with a transient API error after being recorded.
    pub fn failing() -> Self {
        Self {
            fail_posts: true,
            ..Self::default()
        }
    }

    /// GETs fail with a transient API error after being recorded.
    pub fn failing_reads() -> Self {
        Self {
            fail_gets: true,
            ..Self::default()
        }
    }

    /// Seeds the issue with an existing comment.
    pub fn with_comment(self, body: &str) -> Self {
        self.state
            .comments
            .lock()
            .unwrap()
            .push(json!({ "id": 0, "body": body }));
        self
    }

    pub fn with_rate_limit(mut self, remaining: u64) -> Self {
        self.rate_limit = Some(RateLimit {
            limit: 5000,
            remaining,
            reset: None,
        });
        self
    }

    /// `(url, body)` of every post, in call order.
    pub fn posts(&self) -> Vec<(String, Value)> {
        self.state.posts.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<String> {
        self.state.gets.lock().unwrap().clone()
    }

}

fn bad_gateway() -> GitHubApiError {
    GitHubApiError::from_status(Some(502), "Bad Gateway")
}

#[async_trait]
impl IssueTracker for MockTracker {
    async fn get(&self, url: &str) -> Result<Value, GitHubApiError> {
        self.state.gets.lock().unwrap().push(url.to_string());
        if self.fail_gets {
            return Err(bad_gateway());
        }
        Ok(Value::Array(self.state.comments.lock().unwrap().clone()))
    }

    async fn post(&self, url: &str, data: &Value) -> Result<Value, GitHubApiError> {
        self.state
            .posts
            .lock()
            .unwrap()
            .push((url.to_string(), data.clone()));
        if self.fail_posts {
            return Err(bad_gateway());
        }
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let comment = json!({ "id": id, "body": data.get("body") });
        self.state.comments.lock().unwrap().push(comment.clone());
        Ok(comment)
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }
}

impl TrackerFactory for MockTracker {
    fn open(&self) -> Box<dyn IssueTracker> {
        Box::new(self.clone())
    }
}
