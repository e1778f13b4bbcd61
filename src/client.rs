//! Metadata client: resolves bibliography records to remote papers.
//!
//! Every request goes through the same pipeline:
//!
//! 1. the [`CacheStore`] keyed by the full request URL (a hit skips the
//!    network and the rate limiter entirely),
//! 2. the shared [`RateLimiter`] watermark (primary provider only),
//! 3. the request itself, retried with exponential backoff on 429.
//!
//! Not-found answers are cached like any other result. Calls are strictly
//! sequential: one client per run, awaited one lookup at a time.

use crate::bibliography::BibRecord;
use crate::cache::CacheStore;
use crate::crossref::{self, CrossrefResponse, CROSSREF_API_BASE, MAILTO};
use crate::error::{GapError, Result};
use crate::identifiers::{extract_identifiers, normalize_title};
use crate::paper::{RemotePaper, RemoteReference};
use crate::semanticscholar::{self, SSPaper, SSSearchResponse, SS_API_BASE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Minimum gap between primary requests; the published ceiling is 1 req/s
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

/// Tunables for [`MetadataClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Semantic Scholar Graph API base
    pub primary_base: String,
    /// Crossref API base
    pub fallback_base: String,
    pub min_interval: Duration,
    /// Total attempts per request when the provider answers 429
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Contact address for the user agent and Crossref's polite pool
    pub mailto: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            primary_base: SS_API_BASE.to_string(),
            fallback_base: CROSSREF_API_BASE.to_string(),
            min_interval: MIN_REQUEST_INTERVAL,
            max_attempts: 3,
            backoff_base: Duration::from_secs(3),
            backoff_max: Duration::from_secs(30),
            timeout: Duration::from_secs(15),
            mailto: MAILTO.to_string(),
        }
    }
}

/// Single "last request" watermark enforcing a minimum request interval.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Sleep for whatever remains of the interval since the last request,
    /// then move the watermark to now.
    pub async fn wait(&self) {
        let remaining = self
            .last()
            .map(|t| self.min_interval.saturating_sub(t.elapsed()))
            .filter(|d| !d.is_zero());

        if let Some(wait) = remaining {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit: waiting");
            tokio::time::sleep(wait).await;
        }

        *self
            .last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn last(&self) -> Option<Instant> {
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Primary,
    Fallback,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Primary => write!(f, "Semantic Scholar"),
            Provider::Fallback => write!(f, "Crossref"),
        }
    }
}

/// Cache payload: a result or the explicit "no data" sentinel.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum CachedLookup<T> {
    Found { data: T },
    NotFound,
}

struct Fetched<T> {
    value: Option<T>,
    from_cache: bool,
}

/// Rate-limited, retrying, caching client over Semantic Scholar with a
/// Crossref fallback for withheld reference lists.
pub struct MetadataClient {
    http: reqwest::Client,
    config: ClientConfig,
    api_key: Option<String>,
    cache: Option<CacheStore>,
    limiter: RateLimiter,
}

impl MetadataClient {
    /// Create a client. Construct exactly one per run: the rate limit is
    /// global to the provider, not per instance.
    pub fn new(config: ClientConfig, cache: Option<CacheStore>, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("citegap/{} (mailto:{})", env!("CARGO_PKG_VERSION"), config.mailto))
            .timeout(config.timeout)
            .build()
            .map_err(|e| GapError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            limiter: RateLimiter::new(config.min_interval),
            config,
            api_key,
            cache,
        })
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    /// Resolve a bibliography record: DOI, then arXiv id, then title search.
    /// The first lookup that finds the paper wins. A withheld reference list
    /// is filled from the fallback provider when a DOI is known.
    pub async fn resolve(&self, record: &BibRecord) -> Result<Option<RemotePaper>> {
        let ids = extract_identifiers(record);

        let mut paper = None;
        if let Some(doi) = &ids.doi {
            paper = self.paper_by_doi(doi).await?;
        }
        if paper.is_none() {
            if let Some(arxiv) = &ids.arxiv {
                paper = self.paper_by_arxiv(arxiv).await?;
            }
        }
        if paper.is_none() {
            if let Some(title) = &ids.normalized_title {
                paper = self.paper_by_title(title).await?;
            }
        }

        let Some(mut paper) = paper else {
            debug!(key = %record.key, "No match at provider");
            return Ok(None);
        };

        if paper.references_restricted() {
            if let Some(doi) = ids.doi.or_else(|| paper.doi()) {
                match self.fallback_references(&doi).await {
                    Ok(refs) if !refs.is_empty() => {
                        info!(key = %record.key, count = refs.len(), "References recovered from Crossref");
                        paper.references = refs;
                    }
                    Ok(_) => debug!(key = %record.key, "Crossref has no references either"),
                    Err(e) => debug!(key = %record.key, error = %e, "Crossref fallback failed"),
                }
            }
        }

        Ok(Some(paper))
    }

    pub async fn paper_by_doi(&self, doi: &str) -> Result<Option<RemotePaper>> {
        self.fetch_paper(&semanticscholar::doi_url(&self.config.primary_base, doi))
            .await
    }

    pub async fn paper_by_arxiv(&self, arxiv_id: &str) -> Result<Option<RemotePaper>> {
        self.fetch_paper(&semanticscholar::arxiv_url(&self.config.primary_base, arxiv_id))
            .await
    }

    /// Search by normalized title and fetch full details of the top hit.
    pub async fn paper_by_title(&self, title: &str) -> Result<Option<RemotePaper>> {
        let normalized = normalize_title(title);
        if normalized.is_empty() {
            return Ok(None);
        }

        let url = semanticscholar::search_url(&self.config.primary_base, &normalized);
        let search = self.fetch_json::<SSSearchResponse>(&url, Provider::Primary).await?;
        let Some(paper_id) = search.value.as_ref().and_then(|s| s.top_paper_id()) else {
            return Ok(None);
        };

        self.fetch_paper(&semanticscholar::paper_url(&self.config.primary_base, paper_id))
            .await
    }

    /// Reference list for `doi` from the fallback provider.
    pub async fn fallback_references(&self, doi: &str) -> Result<Vec<RemoteReference>> {
        let url = crossref::works_url(&self.config.fallback_base, doi, &self.config.mailto);
        let fetched = self.fetch_json::<CrossrefResponse>(&url, Provider::Fallback).await?;
        Ok(fetched
            .value
            .map(CrossrefResponse::into_references)
            .unwrap_or_default())
    }

    async fn fetch_paper(&self, url: &str) -> Result<Option<RemotePaper>> {
        let fetched = self.fetch_json::<SSPaper>(url, Provider::Primary).await?;
        Ok(fetched.value.map(|raw| RemotePaper {
            from_cache: fetched.from_cache,
            ..RemotePaper::from(raw)
        }))
    }

    async fn fetch_json<T>(&self, url: &str, provider: Provider) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        if let Some(value) = self.cached::<T>(url) {
            return Ok(Fetched {
                value,
                from_cache: true,
            });
        }

        let value = self.fetch_with_retry::<T>(url, provider).await?;
        self.remember(url, value.as_ref());
        Ok(Fetched {
            value,
            from_cache: false,
        })
    }

    fn cached<T: DeserializeOwned>(&self, url: &str) -> Option<Option<T>> {
        let cache = self.cache.as_ref()?;
        let raw = cache.get(url)?;
        match serde_json::from_value::<CachedLookup<T>>(raw) {
            Ok(CachedLookup::Found { data }) => Some(Some(data)),
            Ok(CachedLookup::NotFound) => Some(None),
            Err(e) => {
                warn!(url = url, error = %e, "Malformed cache payload, evicting");
                cache.remove(url);
                None
            }
        }
    }

    fn remember<T: Serialize>(&self, url: &str, value: Option<&T>) {
        let Some(cache) = &self.cache else {
            return;
        };
        let payload = match value {
            Some(data) => serde_json::to_value(CachedLookup::Found { data }),
            None => serde_json::to_value(CachedLookup::<&T>::NotFound),
        };
        match payload {
            Ok(payload) => cache.set(url, payload),
            Err(e) => warn!(url = url, error = %e, "Failed to serialize cache payload"),
        }
    }

    /// One logical request: 404 is `Ok(None)`, 429 is retried with backoff,
    /// anything else non-2xx is terminal.
    async fn fetch_with_retry<T: DeserializeOwned>(&self, url: &str, provider: Provider) -> Result<Option<T>> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            if provider == Provider::Primary {
                self.limiter.wait().await;
            }

            let mut request = self.http.get(url);
            if provider == Provider::Primary {
                if let Some(key) = &self.api_key {
                    request = request.header("x-api-key", key);
                }
            }

            debug!(url = url, attempt = attempt, provider = %provider, "Sending request");
            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                let body = response.text().await?;
                let parsed = serde_json::from_str(&body).map_err(|e| {
                    GapError::Parse(format!("Failed to parse {} response: {}", provider, e))
                })?;
                return Ok(Some(parsed));
            }

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.config.max_attempts {
                    return Err(GapError::RateLimited { attempts: attempt });
                }
                let wait = self.backoff_delay(attempt, retry_after(&response));
                warn!(
                    provider = %provider,
                    attempt = attempt,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let message = response.text().await.unwrap_or_default();
            return Err(GapError::Api {
                code: status.as_u16(),
                message: format!("{} API error: {} - {}", provider, status, message),
            });
        }
    }

    /// `base * 2^(attempt-1)`, raised to Retry-After if longer, capped.
    fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponential = self
            .config
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exponential
            .max(retry_after.unwrap_or_default())
            .min(self.config.backoff_max)
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> ClientConfig {
        ClientConfig {
            primary_base: server.uri(),
            fallback_base: server.uri(),
            min_interval: Duration::ZERO,
            max_attempts: 3,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
            mailto: MAILTO.to_string(),
        }
    }

    fn client(server: &MockServer, cache: Option<CacheStore>) -> Result<MetadataClient> {
        MetadataClient::new(test_config(server), cache, None)
    }

    fn paper_json(title: &str, doi: &str, references: Value, reference_count: u64) -> Value {
        json!({
            "paperId": format!("id-{}", title),
            "title": title,
            "authors": [{"name": "Ada Lovelace"}],
            "year": 2021,
            "venue": "Journal",
            "externalIds": {"DOI": doi},
            "citationCount": 5,
            "referenceCount": reference_count,
            "references": references
        })
    }

    fn doi_record(key: &str, doi: &str) -> BibRecord {
        BibRecord {
            doi: Some(doi.to_string()),
            ..BibRecord::new(key, "Some Title")
        }
    }

    #[test]
    fn test_backoff_delay() -> Result<()> {
        let client = MetadataClient::new(ClientConfig::default(), None, None)?;
        assert_eq!(client.backoff_delay(1, None), Duration::from_secs(3));
        assert_eq!(client.backoff_delay(2, None), Duration::from_secs(6));
        assert_eq!(client.backoff_delay(3, None), Duration::from_secs(12));
        assert_eq!(client.backoff_delay(5, None), Duration::from_secs(30));
        assert_eq!(client.backoff_delay(1, Some(Duration::from_secs(10))), Duration::from_secs(10));
        assert_eq!(client.backoff_delay(1, Some(Duration::from_secs(90))), Duration::from_secs(30));
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(Duration::from_millis(60));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_doi_lookup_then_cache_hit() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_json(
                "A",
                "10.1/a",
                json!([{"title": "X", "year": 2020, "externalIds": {"DOI": "10.1/x"}}]),
                1,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let client = client(&server, Some(CacheStore::open(dir.path())?))?;

        let first = client.paper_by_doi("10.1/a").await?.ok_or(GapError::Parse("missing".into()))?;
        assert!(!first.from_cache);
        assert_eq!(first.references.len(), 1);
        assert_eq!(first.authors, vec!["Ada Lovelace"]);

        let second = client.paper_by_doi("10.1/a").await?.ok_or(GapError::Parse("missing".into()))?;
        assert!(second.from_cache);
        assert_eq!(second.title, first.title);
        assert_eq!(second.references, first.references);
        Ok(())
    }

    #[tokio::test]
    async fn test_not_found_is_cached() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Paper not found"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let client = client(&server, Some(CacheStore::open(dir.path())?))?;
        assert!(client.paper_by_doi("10.1/missing").await?.is_none());
        assert!(client.paper_by_doi("10.1/missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_cache_payload_is_evicted() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/stale"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new()?;
        let url = semanticscholar::doi_url(&server.uri(), "10.1/stale");
        let cache = CacheStore::open(dir.path())?;
        cache.set(&url, json!({"status": "found", "data": "not a paper"}));

        let client = client(&server, Some(cache))?;
        let result = client.paper_by_doi("10.1/stale").await;
        assert!(matches!(result, Err(GapError::Api { code: 500, .. })));

        let cache = client.cache().ok_or(GapError::Parse("no cache".into()))?;
        assert_eq!(cache.get(&url), None);
        assert_eq!(cache.stats().durable_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_retries_after_rate_limit() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/busy"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_json("Busy", "10.1/busy", json!([]), 0)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, None)?;
        let paper = client.paper_by_doi("10.1/busy").await?;
        assert_eq!(paper.map(|p| p.title), Some("Busy".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/busy"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = client(&server, None)?;
        let result = client.paper_by_doi("10.1/busy").await;
        assert!(matches!(result, Err(GapError::RateLimited { attempts: 3 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/err"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, None)?;
        let result = client.paper_by_doi("10.1/err").await;
        assert!(matches!(result, Err(GapError::Api { code: 500, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client(&server, None)?;
        assert!(matches!(client.paper_by_doi("10.1/bad").await, Err(GapError::Parse(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_api_key_header_sent() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/k"))
            .and(wiremock::matchers::header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_json("K", "10.1/k", json!([]), 0)))
            .expect(1)
            .mount(&server)
            .await;

        let client = MetadataClient::new(test_config(&server), None, Some("secret".to_string()))?;
        assert!(client.paper_by_doi("10.1/k").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_title_search() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/unknown"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paper/search"))
            .and(query_param("query", "deep learning a review"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 1, "data": [{"paperId": "p1"}]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paper/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_json("Deep Learning", "10.1/dl", json!([]), 0)))
            .expect(1)
            .mount(&server)
            .await;

        let record = BibRecord {
            doi: Some("10.1/unknown".to_string()),
            ..BibRecord::new("lecun2015", "Deep Learning: A Review")
        };
        let client = client(&server, None)?;
        let paper = client.resolve(&record).await?;
        assert_eq!(paper.map(|p| p.title), Some("Deep Learning".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_arxiv_lookup() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/arXiv:1706.03762"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_json("Attention", "10.1/att", json!([]), 0)))
            .expect(1)
            .mount(&server)
            .await;

        let record = BibRecord {
            url: Some("https://arxiv.org/abs/1706.03762v7".to_string()),
            ..BibRecord::new("vaswani2017", "Attention Is All You Need")
        };
        let client = client(&server, None)?;
        assert!(client.resolve(&record).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_restricted_references_use_fallback() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_json("D", "10.1/d", Value::Null, 12)))
            .mount(&server)
            .await;

        let references: Vec<Value> = (0..12)
            .map(|i| json!({"key": format!("r{}", i), "DOI": format!("10.2/{}", i), "article-title": format!("Ref {}", i), "year": "2019"}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/works/10.1/d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": {"reference": references}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, None)?;
        let paper = client
            .resolve(&doi_record("d", "10.1/d"))
            .await?
            .ok_or(GapError::Parse("missing".into()))?;

        assert_eq!(paper.references.len(), 12);
        assert!(paper.references.iter().all(|r| r.citation_count.is_none()));
        assert_eq!(paper.references[3].doi().as_deref(), Some("10.2/3"));
        Ok(())
    }

    #[tokio::test]
    async fn test_fallback_failure_is_swallowed() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(paper_json("D", "10.1/d", json!([]), 12)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/10.1/d"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, None)?;
        let paper = client.resolve(&doi_record("d", "10.1/d")).await?;
        let paper = paper.ok_or(GapError::Parse("missing".into()))?;
        assert_eq!(paper.title, "D");
        assert!(paper.references.is_empty());
        Ok(())
    }
}
