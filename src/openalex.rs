//! OpenAlex source adapter.
//!
//! References are read from a work's `referenced_works` (OpenAlex ids) and
//! mapped to DOIs in batches; citations come from `filter=cites:<id>` with
//! cursor paging.
//!
//! API Best Practices (per OpenAlex docs):
//! - Use `mailto:email` parameter for polite pool (10 req/s vs 1 req/s)
//! - Use `per-page=200` for maximum results per page
//! - Implement exponential backoff for retries

use crate::config::Config;
use crate::error::{CociteError, ErrorKind, FetchResult, Result};
use crate::identifier::{IdKind, Identifier};
use crate::source::{get_json, PaperMetadata, SourceAdapter, Throttle};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// OpenAlex API base URL
const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Maximum results per page (OpenAlex limit)
const MAX_PER_PAGE: usize = 200;

/// OpenAlex ids resolved per batch when mapping references to DOIs
const REFERENCE_BATCH_SIZE: usize = 25;

/// Polite pool allows 10 req/s
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Prefix of OpenAlex work URIs
const WORK_URI_PREFIX: &str = "https://openalex.org/";

pub const TAG: &str = "openalex";

/// OpenAlex client implementing [`SourceAdapter`]
pub struct OpenAlexSource {
    client: Client,
    base_url: String,
    email: String,
    max_retries: u32,
    throttle: Throttle,
}

/// OpenAlex API response structures
#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    #[serde(default)]
    meta: Option<OpenAlexMeta>,
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexMeta {
    next_cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAlexWork {
    id: Option<String>,
    doi: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    authorships: Option<Vec<OpenAlexAuthorship>>,
    referenced_works: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    display_name: Option<String>,
}

impl OpenAlexSource {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("rustcocite/0.1 (mailto:{})", config.openalex_email))
            .build()
            .map_err(|e| CociteError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(email = %config.openalex_email, "Initialized OpenAlex client");

        Ok(Self {
            client,
            base_url: config
                .openalex_base_url
                .clone()
                .unwrap_or_else(|| OPENALEX_API_BASE.to_string()),
            email: config.openalex_email.clone(),
            max_retries: config.max_retries,
            throttle: Throttle::new(MIN_REQUEST_INTERVAL),
        })
    }

    /// Query `/works` with a filter and field selection
    async fn query_works(
        &self,
        filter: &str,
        select: &str,
        per_page: usize,
        cursor: Option<&str>,
    ) -> FetchResult<OpenAlexResponse> {
        let url = format!("{}/works", self.base_url);
        let per_page = per_page.to_string();

        get_json(
            || {
                let mut params = vec![
                    ("filter", filter),
                    ("select", select),
                    ("per-page", per_page.as_str()),
                    ("mailto", self.email.as_str()),
                ];
                if let Some(cursor) = cursor {
                    params.push(("cursor", cursor));
                }
                self.client.get(&url).query(&params)
            },
            &self.throttle,
            self.max_retries,
            TAG,
        )
        .await
    }

    /// Resolve a seed to its OpenAlex work record
    async fn resolve(&self, id: &Identifier, select: &str) -> FetchResult<OpenAlexWork> {
        debug!(id = %id, "Resolving OpenAlex work");
        let response = self.query_works(&lookup_filter(id), select, 1, None).await?;
        response.results.into_iter().next().ok_or(ErrorKind::NotFound)
    }
}

#[async_trait]
impl SourceAdapter for OpenAlexSource {
    fn tag(&self) -> &str {
        TAG
    }

    async fn fetch_references(&self, id: &Identifier) -> FetchResult<Vec<Identifier>> {
        let work = self.resolve(id, "id,doi,referenced_works").await?;
        let ref_ids: Vec<String> = work
            .referenced_works
            .unwrap_or_default()
            .iter()
            .map(|w| short_work_id(w))
            .collect();

        if ref_ids.is_empty() {
            warn!(id = %id, "No referenced works found");
            return Ok(Vec::new());
        }

        info!(id = %id, count = ref_ids.len(), "Found referenced works");

        let mut dois = Vec::with_capacity(ref_ids.len());
        for chunk in ref_ids.chunks(REFERENCE_BATCH_SIZE) {
            let filter = format!("openalex_id:{}", chunk.join("|"));
            match self.query_works(&filter, "id,doi", REFERENCE_BATCH_SIZE, None).await {
                Ok(response) => dois.extend(extract_dois(&response.results)),
                // A failed batch truncates the list instead of failing the seed
                Err(kind) => warn!(id = %id, error = %kind, "Reference batch failed, skipping"),
            }
        }

        info!(id = %id, count = dois.len(), "Extracted reference DOIs");
        Ok(dois)
    }

    async fn fetch_citations(&self, id: &Identifier) -> FetchResult<Vec<Identifier>> {
        let work = self.resolve(id, "id,doi").await?;
        let work_id = work
            .id
            .as_deref()
            .map(short_work_id)
            .filter(|w| !w.is_empty())
            .ok_or(ErrorKind::MalformedResponse)?;

        let filter = format!("cites:{}", work_id);
        let mut dois = Vec::new();
        let mut cursor = "*".to_string();

        for page_no in 0usize.. {
            let page = match self
                .query_works(&filter, "id,doi", MAX_PER_PAGE, Some(&cursor))
                .await
            {
                Ok(page) => page,
                Err(kind) if page_no == 0 => return Err(kind),
                Err(kind) => {
                    warn!(id = %id, page = page_no, error = %kind, "Citation page failed, keeping partial list");
                    break;
                }
            };
            let page_len = page.results.len();
            dois.extend(extract_dois(&page.results));

            match page.meta.and_then(|m| m.next_cursor) {
                Some(next) if page_len > 0 => cursor = next,
                _ => break,
            }
        }

        info!(id = %id, work = %work_id, count = dois.len(), "Extracted citing DOIs");
        Ok(dois)
    }

    async fn fetch_metadata(&self, id: &Identifier) -> FetchResult<PaperMetadata> {
        let work = self
            .resolve(id, "id,doi,display_name,publication_year,authorships")
            .await?;
        Ok(work_metadata(work))
    }
}

/// Filter selecting a single work by DOI or MAG id
fn lookup_filter(id: &Identifier) -> String {
    match id.kind() {
        IdKind::Doi => format!("doi:{}", id),
        IdKind::Mag => format!("ids.mag:{}", id),
    }
}

/// `https://openalex.org/W123` -> `W123`
fn short_work_id(uri: &str) -> String {
    uri.strip_prefix(WORK_URI_PREFIX).unwrap_or(uri).to_string()
}

fn extract_dois(works: &[OpenAlexWork]) -> Vec<Identifier> {
    works
        .iter()
        .filter_map(|w| w.doi.as_deref())
        .filter_map(Identifier::from_provider_doi)
        .collect()
}

fn work_metadata(work: OpenAlexWork) -> PaperMetadata {
    let authors = work
        .authorships
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| a.author)
        .filter_map(|a| a.display_name)
        .filter(|n| !n.trim().is_empty())
        .collect();

    PaperMetadata {
        title: work.display_name,
        authors,
        year: work.publication_year,
    }
}
