//! Run configuration.
//!
//! Built once at process start from CLI flags and environment variables and
//! passed by reference into the aggregator, network builder and source
//! constructors. Nothing in the library reads the environment on its own.

use crate::error::{CociteError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Contact address used when no valid OpenAlex email is configured
pub const ANONYMOUS_EMAIL: &str = "anonymous@example.com";

/// Which source adapters a run talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMode {
    OpenAlex,
    SemanticScholar,
    /// Every known adapter, results merged per seed
    Composite,
}

impl ApiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMode::OpenAlex => "openalex",
            ApiMode::SemanticScholar => "semantic_scholar",
            ApiMode::Composite => "composite",
        }
    }
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiMode {
    type Err = CociteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openalex" => Ok(ApiMode::OpenAlex),
            "semantic_scholar" | "semanticscholar" | "s2" => Ok(ApiMode::SemanticScholar),
            "composite" => Ok(ApiMode::Composite),
            other => Err(CociteError::Config(format!("unknown api mode: {}", other))),
        }
    }
}

/// Process-wide settings, constructed once and shared by reference
#[derive(Debug, Clone)]
pub struct Config {
    /// Contact email for the OpenAlex polite pool
    pub openalex_email: String,
    /// Optional Semantic Scholar API key (sent as `x-api-key`)
    pub semantic_scholar_api_key: Option<String>,
    pub api_mode: ApiMode,
    /// Upper bound on a single adapter call, including retries
    pub call_timeout: Duration,
    /// HTTP request timeout inside an adapter
    pub request_timeout: Duration,
    /// Seeds fetched concurrently
    pub max_concurrency: usize,
    /// Retries on HTTP 429 before giving up with `RateLimited`
    pub max_retries: u32,
    /// Base URL overrides (mirrors, tests)
    pub openalex_base_url: Option<String>,
    pub semantic_scholar_base_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openalex_email: ANONYMOUS_EMAIL.to_string(),
            semantic_scholar_api_key: None,
            api_mode: ApiMode::Composite,
            call_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            max_concurrency: 4,
            max_retries: 3,
            openalex_base_url: None,
            semantic_scholar_base_url: None,
        }
    }
}

impl Config {
    /// Set the OpenAlex email, falling back to the anonymous address when the
    /// value is missing or does not look like an email.
    pub fn with_openalex_email(mut self, email: Option<&str>) -> Self {
        self.openalex_email = match email.map(str::trim) {
            Some(e) if e.contains('@') => e.to_string(),
            _ => ANONYMOUS_EMAIL.to_string(),
        };
        self
    }

    pub fn with_semantic_scholar_key(mut self, key: Option<String>) -> Self {
        self.semantic_scholar_api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(CociteError::Config("max concurrency must be at least 1".into()));
        }
        if self.call_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(CociteError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}
