//! Paper identifiers.
//!
//! Seeds and discovered papers are keyed by a normalized identifier: a DOI
//! stripped of resolver prefixes and lowercased, or a numeric Microsoft
//! Academic Graph id. Two identifiers name the same paper iff their
//! normalized forms are equal.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CociteError;

/// Prefixes stripped from user-supplied and provider-returned DOIs
const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Minimum length of a numeric MAG id
const MIN_MAG_LEN: usize = 6;

/// A normalized paper identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

/// What kind of identifier a normalized string is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Doi,
    Mag,
}

impl Identifier {
    /// Normalize a raw string, returning `None` if it is neither a DOI nor a MAG id.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        if is_doi(&normalized) || is_mag_id(&normalized) {
            Some(Self(normalized))
        } else {
            None
        }
    }

    /// Normalize a DOI returned by a provider; anything that is not a DOI is dropped.
    pub fn from_provider_doi(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        is_doi(&normalized).then_some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> IdKind {
        if is_mag_id(&self.0) {
            IdKind::Mag
        } else {
            IdKind::Doi
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = CociteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
            .ok_or_else(|| CociteError::Validation(format!("not a DOI or MAG id: {}", s.trim())))
    }
}

// Documents written by earlier runs may carry un-normalized keys.
impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Identifier::parse(&raw).unwrap_or_else(|| Identifier(normalize(&raw))))
    }
}

/// Trim, strip resolver prefixes (case-insensitive) and lowercase.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    for prefix in DOI_PREFIXES {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return rest.trim().to_string();
        }
    }
    lower
}

/// A DOI starts with `10.` and contains a `/`.
pub fn is_doi(s: &str) -> bool {
    s.starts_with("10.") && s.contains('/')
}

pub fn is_mag_id(s: &str) -> bool {
    s.len() >= MIN_MAG_LEN && s.chars().all(|c| c.is_ascii_digit())
}

/// Parse raw inputs into seeds, dropping invalid entries and duplicates.
///
/// First-seen order is preserved. Returns the seeds and the rejected inputs.
pub fn parse_seeds<I, S>(inputs: I) -> (Vec<Identifier>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seeds: Vec<Identifier> = Vec::new();
    let mut rejected = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for raw in inputs {
        let raw = raw.as_ref();
        match Identifier::parse(raw) {
            Some(id) => {
                if seen.insert(id.clone()) {
                    seeds.push(id);
                }
            }
            None => rejected.push(raw.to_string()),
        }
    }

    (seeds, rejected)
}
