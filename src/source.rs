//! Source adapter interface.
//!
//! Every bibliographic provider implements [`SourceAdapter`], normalizing its
//! reference, citation and metadata lookups into identifier-keyed results.
//! Callers hold adapters as `Arc<dyn SourceAdapter>` and never branch on the
//! concrete provider.
//!
//! A non-error empty list means "zero known entries"; an `Err(ErrorKind)` means
//! the answer is unknown. Adapters handle HTTP 429 backoff themselves and may
//! return partial lists instead of failing.

use crate::config::{ApiMode, Config};
use crate::error::{ErrorKind, FetchResult, Result};
use crate::identifier::Identifier;
use crate::openalex::OpenAlexSource;
use crate::semanticscholar::SemanticScholarSource;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Longest wait honoured from a `Retry-After` header
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Display metadata for a single paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: Option<String>,
    /// Author display names in byline order
    pub authors: Vec<String>,
    pub year: Option<i32>,
}

/// Which side of the citation graph a lookup walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Works the seed references
    Backward,
    /// Works citing the seed
    Forward,
}

impl Direction {
    pub fn noun(&self) -> &'static str {
        match self {
            Direction::Backward => "references",
            Direction::Forward => "citations",
        }
    }

    /// Dispatch the matching lookup on an adapter
    pub async fn fetch(
        &self,
        adapter: &dyn SourceAdapter,
        id: &Identifier,
    ) -> FetchResult<Vec<Identifier>> {
        match self {
            Direction::Backward => adapter.fetch_references(id).await,
            Direction::Forward => adapter.fetch_citations(id).await,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Backward => "backward",
            Direction::Forward => "forward",
        })
    }
}

/// Uniform capability set every bibliographic provider exposes.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short tag recorded as provenance (e.g. `openalex`)
    fn tag(&self) -> &str;

    /// Identifiers of works referenced by `id`
    async fn fetch_references(&self, id: &Identifier) -> FetchResult<Vec<Identifier>>;

    /// Identifiers of works citing `id`
    async fn fetch_citations(&self, id: &Identifier) -> FetchResult<Vec<Identifier>>;

    /// Title, authors and year of `id`
    async fn fetch_metadata(&self, id: &Identifier) -> FetchResult<PaperMetadata>;
}

/// Build the adapters selected by `config.api_mode`, in a fixed order.
pub fn build_sources(config: &Config) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if matches!(config.api_mode, ApiMode::OpenAlex | ApiMode::Composite) {
        sources.push(Arc::new(OpenAlexSource::new(config)?));
    }
    if matches!(config.api_mode, ApiMode::SemanticScholar | ApiMode::Composite) {
        sources.push(Arc::new(SemanticScholarSource::new(config)?));
    }

    Ok(sources)
}

/// Minimum spacing between requests to one provider.
///
/// The lock is held across the sleep so concurrent callers queue up instead
/// of all waking at once.
#[derive(Debug)]
pub(crate) struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub(crate) async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Send a GET built by `request`, retrying on HTTP 429, and decode the JSON body.
///
/// 404 maps to `NotFound`; any other non-success status to `Network`.
pub(crate) async fn get_json<T, F>(
    request: F,
    throttle: &Throttle,
    max_retries: u32,
    source: &str,
) -> FetchResult<T>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut retries = 0;

    loop {
        throttle.wait().await;
        let response = request().send().await.map_err(|e| {
            debug!(source = source, error = %e, "Request failed");
            ErrorKind::from(e)
        })?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(ErrorKind::from)?;
            return serde_json::from_str(&body).map_err(|e| {
                warn!(source = source, error = %e, "Failed to decode response");
                ErrorKind::MalformedResponse
            });
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retries < max_retries {
                let backoff = retry_after(response.headers())
                    .unwrap_or_else(|| Duration::from_secs(2u64.pow(retries)));
                warn!(
                    source = source,
                    retries = retries,
                    backoff_secs = backoff.as_secs(),
                    "Rate limited, backing off"
                );
                tokio::time::sleep(backoff).await;
                retries += 1;
                continue;
            }
            return Err(ErrorKind::RateLimited);
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ErrorKind::NotFound);
        }

        warn!(source = source, status = status.as_u16(), "API error");
        return Err(ErrorKind::Network);
    }
}

/// Parse a `Retry-After` header given in seconds, capped
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Scripted in-memory adapter for tests.
#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub(crate) struct FixtureSource {
        tag: String,
        references: HashMap<Identifier, FetchResult<Vec<Identifier>>>,
        citations: HashMap<Identifier, FetchResult<Vec<Identifier>>>,
        metadata: HashMap<Identifier, FetchResult<PaperMetadata>>,
        delay: Option<Duration>,
    }

    pub(crate) fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap_or_else(|| panic!("bad fixture id {s}"))
    }

    pub(crate) fn ids(list: &[&str]) -> Vec<Identifier> {
        list.iter().map(|s| id(s)).collect()
    }

    impl FixtureSource {
        pub(crate) fn new(tag: &str) -> Self {
            Self {
                tag: tag.to_string(),
                ..Default::default()
            }
        }

        pub(crate) fn references(mut self, seed: &str, refs: &[&str]) -> Self {
            self.references.insert(id(seed), Ok(ids(refs)));
            self
        }

        pub(crate) fn references_fail(mut self, seed: &str, kind: ErrorKind) -> Self {
            self.references.insert(id(seed), Err(kind));
            self
        }

        pub(crate) fn citations(mut self, seed: &str, cites: &[&str]) -> Self {
            self.citations.insert(id(seed), Ok(ids(cites)));
            self
        }

        pub(crate) fn citations_fail(mut self, seed: &str, kind: ErrorKind) -> Self {
            self.citations.insert(id(seed), Err(kind));
            self
        }

        pub(crate) fn metadata(mut self, paper: &str, authors: &[&str], year: Option<i32>) -> Self {
            self.metadata.insert(
                id(paper),
                Ok(PaperMetadata {
                    title: Some(format!("Title of {paper}")),
                    authors: authors.iter().map(|a| a.to_string()).collect(),
                    year,
                }),
            );
            self
        }

        pub(crate) fn delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        async fn pause(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for FixtureSource {
        fn tag(&self) -> &str {
            &self.tag
        }

        async fn fetch_references(&self, id: &Identifier) -> FetchResult<Vec<Identifier>> {
            self.pause().await;
            self.references.get(id).cloned().unwrap_or(Err(ErrorKind::NotFound))
        }

        async fn fetch_citations(&self, id: &Identifier) -> FetchResult<Vec<Identifier>> {
            self.pause().await;
            self.citations.get(id).cloned().unwrap_or(Err(ErrorKind::NotFound))
        }

        async fn fetch_metadata(&self, id: &Identifier) -> FetchResult<PaperMetadata> {
            self.pause().await;
            self.metadata.get(id).cloned().unwrap_or(Err(ErrorKind::NotFound))
        }
    }
}

/// Minimal local HTTP responder for adapter tests.
#[cfg(test)]
pub(crate) mod mock_http {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub(crate) struct Reply {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    }

    impl Reply {
        pub(crate) fn json(body: impl Into<String>) -> Self {
            Self {
                status: 200,
                headers: Vec::new(),
                body: body.into(),
            }
        }

        pub(crate) fn status(status: u16) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body: String::new(),
            }
        }

        pub(crate) fn header(mut self, name: &'static str, value: &str) -> Self {
            self.headers.push((name, value.to_string()));
            self
        }
    }

    /// Answer every request with `respond(request_target)`.
    ///
    /// Returns the base URL and a counter of requests served.
    pub(crate) async fn serve<F>(respond: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let respond = Arc::new(respond);

        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let respond = respond.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 4096];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&request);
                    let target = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    counter.fetch_add(1, Ordering::SeqCst);

                    let reply = respond(&target);
                    let mut head = format!(
                        "HTTP/1.1 {} Mock\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                        reply.status,
                        reply.body.len()
                    );
                    for (name, value) in &reply.headers {
                        head.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    head.push_str("\r\n");
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(reply.body.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (format!("http://{}", addr), hits)
    }
}
