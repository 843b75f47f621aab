//! Shared web lookup.
//!
//! One lookup runs before round 1; its digest is handed to every turn.
//! Failures never end a session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::TtlCache;
use crate::errors::LookupError;
use crate::prompts::truncate_chars;

const TAVILY_URL: &str = "https://api.tavily.com";
/// Per-result excerpt length in a digest.
const RESULT_EXCERPT_CHARS: usize = 300;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebLookup: Send + Sync {
    /// Search for `query` and return a plain-text digest.
    async fn digest(&self, query: &str) -> Result<String, LookupError>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

impl SearchResponse {
    fn into_digest(self) -> String {
        let mut parts = Vec::with_capacity(self.results.len() + 1);
        if let Some(answer) = self.answer.filter(|a| !a.trim().is_empty()) {
            parts.push(format!("Summary: {answer}"));
        }
        for result in &self.results {
            parts.push(format!(
                "[{}] {}",
                result.title,
                truncate_chars(&result.content, RESULT_EXCERPT_CHARS)
            ));
        }
        parts.join("\n\n")
    }
}

/// Tavily search API client.
pub struct TavilyLookup {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: u32,
}

impl TavilyLookup {
    pub fn new(api_key: impl Into<String>, max_results: u32) -> Self {
        Self::with_base_url(api_key, TAVILY_URL, max_results)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        max_results: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_results,
        }
    }
}

#[async_trait]
impl WebLookup for TavilyLookup {
    async fn digest(&self, query: &str) -> Result<String, LookupError> {
        if self.api_key.is_empty() {
            return Err(LookupError::NotConfigured);
        }
        debug!(query, max_results = self.max_results, "Web lookup");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest {
                api_key: &self.api_key,
                query,
                max_results: self.max_results,
                include_answer: true,
            })
            .send()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                status: status.as_u16(),
            });
        }
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Request(e.to_string()))?;
        Ok(body.into_digest())
    }
}

/// Wraps a lookup with a shared TTL cache keyed by query.
pub struct CachedLookup {
    inner: Arc<dyn WebLookup>,
    cache: Arc<TtlCache<String>>,
}

impl CachedLookup {
    pub fn new(inner: Arc<dyn WebLookup>, cache: Arc<TtlCache<String>>) -> Self {
        Self { inner, cache }
    }

    pub fn with_capacity(inner: Arc<dyn WebLookup>, capacity: usize, ttl: Duration) -> Self {
        Self::new(inner, Arc::new(TtlCache::new(capacity, ttl)))
    }
}

fn cache_key(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[async_trait]
impl WebLookup for CachedLookup {
    async fn digest(&self, query: &str) -> Result<String, LookupError> {
        let key = cache_key(query);
        if let Some(hit) = self.cache.get(&key) {
            debug!(query, "Lookup cache hit");
            return Ok(hit);
        }
        let digest = self.inner.digest(query).await?;
        self.cache.insert(key, digest.clone());
        Ok(digest)
    }
}
