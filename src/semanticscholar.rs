//! Semantic Scholar source adapter.
//!
//! API Details:
//! - References: GET /graph/v1/paper/{id}/references (max 1000 per request)
//! - Citations: GET /graph/v1/paper/{id}/citations, paged by offset
//! - Rate limit: 1 req/s (unauthenticated), higher with API key
//!
//! Papers are addressed as `DOI:<doi>` or `MAG:<id>`.

use crate::config::Config;
use crate::error::{CociteError, FetchResult, Result};
use crate::identifier::{IdKind, Identifier};
use crate::source::{get_json, PaperMetadata, SourceAdapter, Throttle};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Semantic Scholar API base URL
const SS_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Maximum rows per references/citations request
const PAGE_LIMIT: usize = 1000;

/// The API rejects requests where `offset + limit` reaches this value
const OFFSET_WINDOW: usize = 10_000;

const UNAUTHENTICATED_INTERVAL: Duration = Duration::from_millis(1000);
const AUTHENTICATED_INTERVAL: Duration = Duration::from_millis(200);

pub const TAG: &str = "semantic_scholar";

/// Semantic Scholar client implementing [`SourceAdapter`]
pub struct SemanticScholarSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    throttle: Throttle,
}

/// One page of `/references` or `/citations`.
///
/// `data` is null when the publisher withholds reference data.
#[derive(Debug, Deserialize)]
struct SSEdgePage {
    data: Option<Vec<SSEdge>>,
    /// Offset of the following page, absent on the last one
    next: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SSEdge {
    #[serde(rename = "citedPaper")]
    cited_paper: Option<SSPaper>,
    #[serde(rename = "citingPaper")]
    citing_paper: Option<SSPaper>,
}

#[derive(Debug, Deserialize)]
struct SSPaper {
    title: Option<String>,
    year: Option<i32>,
    #[serde(default)]
    authors: Option<Vec<SSAuthor>>,
    #[serde(rename = "externalIds")]
    external_ids: Option<SSExternalIds>,
}

#[derive(Debug, Deserialize)]
struct SSAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SSExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("rustcocite/0.1")
            .build()
            .map_err(|e| CociteError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let interval = if config.semantic_scholar_api_key.is_some() {
            info!("Initialized Semantic Scholar client with API key");
            AUTHENTICATED_INTERVAL
        } else {
            info!("Initialized Semantic Scholar client without API key (rate limited)");
            UNAUTHENTICATED_INTERVAL
        };

        Ok(Self {
            client,
            base_url: config
                .semantic_scholar_base_url
                .clone()
                .unwrap_or_else(|| SS_API_BASE.to_string()),
            api_key: config.semantic_scholar_api_key.clone(),
            max_retries: config.max_retries,
            throttle: Throttle::new(interval),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> FetchResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Semantic Scholar request");

        get_json(
            || {
                let mut request = self.client.get(&url).query(params);
                if let Some(key) = &self.api_key {
                    request = request.header("x-api-key", key);
                }
                request
            },
            &self.throttle,
            self.max_retries,
            TAG,
        )
        .await
    }
}

#[async_trait]
impl SourceAdapter for SemanticScholarSource {
    fn tag(&self) -> &str {
        TAG
    }

    async fn fetch_references(&self, id: &Identifier) -> FetchResult<Vec<Identifier>> {
        let path = format!("paper/{}/references", paper_key(id));
        let params = [
            ("fields", "externalIds".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        let page: SSEdgePage = self.get(&path, &params).await?;

        let Some(edges) = page.data else {
            warn!(id = %id, "References data is null, publisher may restrict access");
            return Ok(Vec::new());
        };

        let dois: Vec<Identifier> = edges
            .iter()
            .filter_map(|e| e.cited_paper.as_ref())
            .filter_map(paper_doi)
            .collect();

        info!(id = %id, found = edges.len(), dois = dois.len(), "Extracted reference DOIs");
        Ok(dois)
    }

    async fn fetch_citations(&self, id: &Identifier) -> FetchResult<Vec<Identifier>> {
        let path = format!("paper/{}/citations", paper_key(id));
        let mut dois = Vec::new();
        let mut offset = 0;

        loop {
            let params = [
                ("fields", "externalIds".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ];
            let page: SSEdgePage = match self.get(&path, &params).await {
                Ok(page) => page,
                Err(kind) if offset == 0 => return Err(kind),
                Err(kind) => {
                    warn!(id = %id, offset = offset, error = %kind, "Citation page failed, keeping partial list");
                    break;
                }
            };
            let edges = page.data.unwrap_or_default();

            dois.extend(
                edges
                    .iter()
                    .filter_map(|e| e.citing_paper.as_ref())
                    .filter_map(paper_doi),
            );
            debug!(id = %id, offset = offset, rows = edges.len(), "Processed citation page");

            match page.next {
                Some(next) if next > offset && !edges.is_empty() => {
                    if next + PAGE_LIMIT >= OFFSET_WINDOW {
                        warn!(id = %id, collected = dois.len(), "Reached citation paging limit, list truncated");
                        break;
                    }
                    offset = next;
                }
                _ => break,
            }
        }

        info!(id = %id, count = dois.len(), "Extracted citing DOIs");
        Ok(dois)
    }

    async fn fetch_metadata(&self, id: &Identifier) -> FetchResult<PaperMetadata> {
        let path = format!("paper/{}", paper_key(id));
        let params = [("fields", "title,year,authors".to_string())];
        let paper: SSPaper = self.get(&path, &params).await?;
        Ok(paper_metadata(paper))
    }
}

/// Path segment addressing a paper; `/` inside DOIs stays literal
fn paper_key(id: &Identifier) -> String {
    let encoded = urlencoding::encode(id.as_str()).replace("%2F", "/");
    match id.kind() {
        IdKind::Doi => format!("DOI:{}", encoded),
        IdKind::Mag => format!("MAG:{}", encoded),
    }
}

fn paper_doi(paper: &SSPaper) -> Option<Identifier> {
    paper
        .external_ids
        .as_ref()
        .and_then(|ids| ids.doi.as_deref())
        .and_then(Identifier::from_provider_doi)
}

fn paper_metadata(paper: SSPaper) -> PaperMetadata {
    PaperMetadata {
        title: paper.title,
        authors: paper
            .authors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.name)
            .collect(),
        year: paper.year,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mock_http::{self, Reply};
    use std::sync::atomic::Ordering;

    fn source(base: &str) -> SemanticScholarSource {
        let config = Config {
            semantic_scholar_base_url: Some(base.to_string()),
            ..Config::default()
        }
        .with_semantic_scholar_key(Some("test-key".into()));
        SemanticScholarSource::new(&config).unwrap()
    }

    fn citing_page(start: usize, count: usize, next: Option<usize>) -> String {
        let data: Vec<serde_json::Value> = (start..start + count)
            .map(|i| serde_json::json!({"citingPaper": {"externalIds": {"DOI": format!("10.5555/c{}", i)}}}))
            .collect();
        serde_json::json!({"offset": start, "next": next, "data": data}).to_string()
    }

    #[test]
    fn test_paper_key() {
        let doi = Identifier::parse("10.18653/v1/N18-3011").unwrap();
        assert_eq!(paper_key(&doi), "DOI:10.18653/v1/n18-3011");

        let mag = Identifier::parse("2741809807").unwrap();
        assert_eq!(paper_key(&mag), "MAG:2741809807");
    }

    #[test]
    fn test_parse_reference_page() {
        let json = r#"{
            "offset": 0,
            "data": [
                {"citedPaper": {"externalIds": {"DOI": "10.1/ABC"}}},
                {"citedPaper": {"externalIds": {"ArXiv": "1706.03762"}}},
                {"citedPaper": null}
            ]
        }"#;
        let page: SSEdgePage = serde_json::from_str(json).unwrap();
        let dois: Vec<Identifier> = page
            .data
            .unwrap()
            .iter()
            .filter_map(|e| e.cited_paper.as_ref())
            .filter_map(paper_doi)
            .collect();
        assert_eq!(dois.len(), 1);
        assert_eq!(dois[0].as_str(), "10.1/abc");
    }

    #[test]
    fn test_null_data_page() {
        let page: SSEdgePage = serde_json::from_str(r#"{"offset": 0, "data": null}"#).unwrap();
        assert!(page.data.is_none());
    }

    #[test]
    fn test_paper_metadata() {
        let json = r#"{"title": "T", "year": 2020, "authors": [{"name": "Ada Lovelace"}]}"#;
        let meta = paper_metadata(serde_json::from_str(json).unwrap());
        assert_eq!(meta.authors, vec!["Ada Lovelace"]);
        assert_eq!(meta.year, Some(2020));
    }

    #[tokio::test]
    async fn test_citations_keep_pages_before_a_failure() {
        let (base, hits) = mock_http::serve(|target| {
            if target.contains("offset=0") {
                Reply::json(citing_page(0, PAGE_LIMIT, Some(PAGE_LIMIT)))
            } else {
                Reply::status(400)
            }
        })
        .await;
        let seed = Identifier::parse("10.1/a").unwrap();

        let dois = source(&base).fetch_citations(&seed).await.unwrap();
        assert_eq!(dois.len(), PAGE_LIMIT);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_citations_stop_without_next() {
        let (base, hits) = mock_http::serve(|_| Reply::json(citing_page(0, 3, None))).await;
        let seed = Identifier::parse("10.1/a").unwrap();

        let dois = source(&base).fetch_citations(&seed).await.unwrap();
        assert_eq!(dois.len(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_citations_first_page_failure_is_an_error() {
        let (base, _) = mock_http::serve(|_| Reply::status(404)).await;
        let seed = Identifier::parse("10.1/a").unwrap();
        assert_eq!(
            source(&base).fetch_citations(&seed).await,
            Err(crate::error::ErrorKind::NotFound)
        );
    }

    #[tokio::test]
    async fn test_restricted_references_are_empty() {
        let (base, _) = mock_http::serve(|_| Reply::json(r#"{"offset": 0, "data": null}"#)).await;
        let seed = Identifier::parse("10.1/a").unwrap();
        assert_eq!(source(&base).fetch_references(&seed).await, Ok(Vec::new()));
    }
}
