//! Outbound GitHub API access.
//!
//! Key features:
//! - `IssueTracker` trait as the only seam handlers use
//! - Conditional GETs against a shared LRU response cache
//! - Doubling backoff for transient read failures
//! - A `Transport` seam under the client, octocrab in production
//! - Rate-limit tracking from response headers

mod cache;
mod client;
mod error;
mod retry;

pub use cache::{CachedResponse, DEFAULT_CAPACITY, ResponseCache};
pub use client::{
    GitHubClient, GitHubConnector, IssueTracker, OctocrabTransport, RateLimit, RawResponse,
    TrackerFactory, Transport,
};
pub use error::{GitHubApiError, GitHubErrorKind};
pub use retry::{Backoff, read_with_retry};
