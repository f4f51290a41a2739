//! Link networks between seeds.
//!
//! - Bibliographic coupling: weight(A, B) = |references(A) ∩ references(B)|
//! - Co-citation: weight(A, B) = |citations(A) ∩ citations(B)|
//!
//! True co-citation needs citer-side data (which papers cite A and B
//! together). The realized metric here is the overlap of the seeds' own
//! citation lists, i.e. the number of shared citers.
//!
//! Only seeds with a non-null list for the mode take part. After edges are
//! filtered by `min_strength`, the node set may be capped: nodes are ranked by
//! summed incident weight (descending, ties by identifier) and edges touching
//! dropped nodes are removed. Labels are attached afterwards, best-effort.

use crate::config::Config;
use crate::error::{CociteError, Result};
use crate::identifier::Identifier;
use crate::record::DetailedDocument;
use crate::source::{Direction, PaperMetadata, SourceAdapter};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

/// How two seeds are linked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// Shared references
    BibliographicCoupling,
    /// Shared citers
    CoCitation,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::BibliographicCoupling => "bibliographic_coupling",
            NetworkMode::CoCitation => "co_citation",
        }
    }

    /// Default output file name, e.g. `network_co_citation.json`
    pub fn file_name(&self) -> String {
        format!("network_{}.json", self.as_str())
    }

    /// Which seed list the mode links on
    pub fn direction(&self) -> Direction {
        match self {
            NetworkMode::BibliographicCoupling => Direction::Backward,
            NetworkMode::CoCitation => Direction::Forward,
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkMode {
    type Err = CociteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "bibliographic_coupling" => Ok(NetworkMode::BibliographicCoupling),
            "co_citation" => Ok(NetworkMode::CoCitation),
            other => Err(CociteError::Validation(format!("unknown network mode: {}", other))),
        }
    }
}

/// Network construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkOptions {
    pub mode: NetworkMode,
    /// Smallest weight kept; values below 1 behave as 1
    pub min_strength: usize,
    /// Cap on the node count; `None` for no cap
    pub max_nodes: Option<usize>,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            mode: NetworkMode::BibliographicCoupling,
            min_strength: 1,
            max_nodes: None,
        }
    }
}

/// Undirected weighted edge, `source < target`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub source: Identifier,
    pub target: Identifier,
    pub weight: usize,
}

/// Unlabeled network; nodes and edges sorted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkGraph {
    pub mode: NetworkMode,
    pub nodes: Vec<Identifier>,
    pub edges: Vec<Edge>,
}

/// Serialized node: identifier plus display label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOut {
    pub id: Identifier,
    pub label: String,
}

/// `network_<mode>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDocument {
    pub nodes: Vec<NodeOut>,
    pub edges: Vec<Edge>,
}

/// Build the weighted network from seed lists.
pub fn build_network(doc: &DetailedDocument, options: &NetworkOptions) -> NetworkGraph {
    let direction = options.mode.direction();
    let min_strength = options.min_strength.max(1);

    // BTreeMap iteration gives lexically ordered pairs, so `a < b` below.
    let lists: Vec<(&Identifier, BTreeSet<&Identifier>)> = doc
        .entries
        .iter()
        .filter_map(|(seed, entry)| entry.list(direction).map(|l| (seed, l.iter().collect())))
        .collect();

    info!(
        mode = %options.mode,
        papers = lists.len(),
        min_strength = min_strength,
        "Computing pairwise overlap"
    );

    let mut edges = Vec::new();
    for (i, (a, set_a)) in lists.iter().enumerate() {
        for (b, set_b) in lists.iter().skip(i + 1) {
            let weight = set_a.intersection(set_b).count();
            if weight >= min_strength {
                edges.push(Edge {
                    source: (*a).clone(),
                    target: (*b).clone(),
                    weight,
                });
            }
        }
    }

    let mut strength: BTreeMap<&Identifier, usize> = BTreeMap::new();
    for edge in &edges {
        *strength.entry(&edge.source).or_default() += edge.weight;
        *strength.entry(&edge.target).or_default() += edge.weight;
    }

    let mut kept: BTreeSet<Identifier> = strength.keys().map(|id| (*id).clone()).collect();

    if let Some(max_nodes) = options.max_nodes {
        if kept.len() > max_nodes {
            let mut ranked: Vec<(&Identifier, usize)> =
                strength.iter().map(|(id, w)| (*id, *w)).collect();
            ranked.sort_by(|(id_a, w_a), (id_b, w_b)| w_b.cmp(w_a).then_with(|| id_a.cmp(id_b)));
            kept = ranked
                .into_iter()
                .take(max_nodes)
                .map(|(id, _)| id.clone())
                .collect();
            info!(max_nodes = max_nodes, "Limited node count");
        }
    }

    edges.retain(|e| kept.contains(&e.source) && kept.contains(&e.target));
    edges.sort();

    info!(
        nodes = kept.len(),
        edges = edges.len(),
        "Network built"
    );

    NetworkGraph {
        mode: options.mode,
        nodes: kept.into_iter().collect(),
        edges,
    }
}

/// `"{first-author surname} ({year})"`, e.g. `Vaswani (2017)`
///
/// The surname is folded to ASCII (`Gödel` -> `Godel`) unless nothing would
/// remain.
pub fn display_label(meta: &PaperMetadata) -> String {
    let surname = meta
        .authors
        .first()
        .and_then(|name| name.split_whitespace().last())
        .map(capitalize)
        .map(|s| fold_ascii(&s))
        .unwrap_or_else(|| "Unknown".to_string());
    let year = meta
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{} ({})", surname, year)
}

/// NFKD decomposition with non-ASCII code points dropped
fn fold_ascii(word: &str) -> String {
    let folded: String = word.nfkd().filter(char::is_ascii).collect();
    if folded.is_empty() {
        word.to_string()
    } else {
        folded
    }
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Fetch metadata for every node and produce the serializable document.
///
/// A failed or timed-out lookup labels the node with its bare identifier.
pub async fn label_network(
    graph: &NetworkGraph,
    source: &dyn SourceAdapter,
    config: &Config,
) -> NetworkDocument {
    info!(nodes = graph.nodes.len(), source = source.tag(), "Fetching node metadata");

    let labels: BTreeMap<Identifier, String> = stream::iter(graph.nodes.iter())
        .map(|id| async move {
            let label = match tokio::time::timeout(config.call_timeout, source.fetch_metadata(id)).await
            {
                Ok(Ok(meta)) => {
                    debug!(id = %id, "Fetched metadata");
                    display_label(&meta)
                }
                Ok(Err(kind)) => {
                    warn!(id = %id, error = %kind, "Failed to fetch metadata");
                    id.to_string()
                }
                Err(_) => {
                    warn!(id = %id, "Metadata lookup timed out");
                    id.to_string()
                }
            };
            (id.clone(), label)
        })
        .buffer_unordered(config.max_concurrency.max(1))
        .collect()
        .await;

    let nodes = graph
        .nodes
        .iter()
        .map(|id| NodeOut {
            id: id.clone(),
            label: labels.get(id).cloned().unwrap_or_else(|| id.to_string()),
        })
        .collect();

    NetworkDocument {
        nodes,
        edges: graph.edges.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DetailedEntry;
    use crate::source::fixture::{id, ids, FixtureSource};

    fn doc(entries: &[(&str, Option<&[&str]>, Option<&[&str]>)]) -> DetailedDocument {
        DetailedDocument {
            entries: entries
                .iter()
                .map(|(seed, refs, cites)| {
                    (
                        id(seed),
                        DetailedEntry {
                            references: refs.map(ids),
                            citations: cites.map(ids),
                            provenance: None,
                        },
                    )
                })
                .collect(),
        }
    }

    fn options(mode: NetworkMode, min_strength: usize, max_nodes: Option<usize>) -> NetworkOptions {
        NetworkOptions {
            mode,
            min_strength,
            max_nodes,
        }
    }

    fn edge(a: &str, b: &str, weight: usize) -> Edge {
        Edge {
            source: id(a),
            target: id(b),
            weight,
        }
    }

    #[test]
    fn test_bibliographic_coupling() {
        let data = doc(&[
            ("10.1/a", Some(&["10.9/x", "10.9/y"]), None),
            ("10.1/b", Some(&["10.9/x", "10.9/z"]), None),
            ("10.1/c", Some(&["10.9/x", "10.9/y"]), None),
            ("10.1/d", None, None),
        ]);
        let graph = build_network(&data, &options(NetworkMode::BibliographicCoupling, 1, None));

        assert_eq!(
            graph.edges,
            vec![
                edge("10.1/a", "10.1/b", 1),
                edge("10.1/a", "10.1/c", 2),
                edge("10.1/b", "10.1/c", 1),
            ]
        );
        assert_eq!(graph.nodes, ids(&["10.1/a", "10.1/b", "10.1/c"]));
    }

    #[test]
    fn test_co_citation_shared_citer() {
        let data = doc(&[
            ("10.1/a", None, Some(&["10.9/p", "10.9/q"])),
            ("10.1/b", None, Some(&["10.9/p"])),
        ]);
        let graph = build_network(&data, &options(NetworkMode::CoCitation, 1, None));
        assert_eq!(graph.edges, vec![edge("10.1/a", "10.1/b", 1)]);
    }

    #[test]
    fn test_min_strength_monotonic() {
        let data = doc(&[
            ("10.1/a", Some(&["10.9/1", "10.9/2", "10.9/3"]), None),
            ("10.1/b", Some(&["10.9/1", "10.9/2"]), None),
            ("10.1/c", Some(&["10.9/1"]), None),
            ("10.1/d", Some(&["10.9/2", "10.9/3"]), None),
        ]);
        let mut previous = usize::MAX;
        for min_strength in 1..=4 {
            let graph = build_network(
                &data,
                &options(NetworkMode::BibliographicCoupling, min_strength, None),
            );
            assert!(graph.edges.len() <= previous);
            assert!(graph.edges.iter().all(|e| e.weight >= min_strength));
            previous = graph.edges.len();
        }
    }

    #[test]
    fn test_max_nodes_drops_lowest_strength() {
        // Weight sums: a = 3 + 1 = 4, b = 3 + 2 = 5, c = 1 + 2 = 3, d = 1
        let data = doc(&[
            ("10.1/a", Some(&["10.9/1", "10.9/2", "10.9/3", "10.9/4"]), None),
            ("10.1/b", Some(&["10.9/1", "10.9/2", "10.9/3", "10.9/5", "10.9/6"]), None),
            ("10.1/c", Some(&["10.9/4", "10.9/5", "10.9/6"]), None),
            ("10.1/d", Some(&["10.9/9"]), None),
            ("10.1/e", Some(&["10.9/9"]), None),
        ]);
        let graph = build_network(&data, &options(NetworkMode::BibliographicCoupling, 1, Some(3)));

        assert_eq!(graph.nodes, ids(&["10.1/a", "10.1/b", "10.1/c"]));
        assert!(graph.nodes.len() <= 3);
        assert!(graph
            .edges
            .iter()
            .all(|e| graph.nodes.contains(&e.source) && graph.nodes.contains(&e.target)));
    }

    #[test]
    fn test_max_nodes_tie_breaks_lexically() {
        let data = doc(&[
            ("10.1/d", Some(&["10.9/1"]), None),
            ("10.1/c", Some(&["10.9/1"]), None),
            ("10.1/b", Some(&["10.9/2"]), None),
            ("10.1/a", Some(&["10.9/2"]), None),
        ]);
        let graph = build_network(&data, &options(NetworkMode::BibliographicCoupling, 1, Some(2)));
        assert_eq!(graph.nodes, ids(&["10.1/a", "10.1/b"]));
        assert_eq!(graph.edges, vec![edge("10.1/a", "10.1/b", 1)]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let data = doc(&[
            ("10.1/a", Some(&["10.9/x"]), Some(&["10.9/p"])),
            ("10.1/b", Some(&["10.9/x"]), Some(&["10.9/p"])),
        ]);
        let opts = options(NetworkMode::CoCitation, 1, Some(10));
        assert_eq!(build_network(&data, &opts), build_network(&data, &opts));
    }

    #[test]
    fn test_display_label() {
        let meta = PaperMetadata {
            title: None,
            authors: vec!["ashish VASWANI".into(), "Noam Shazeer".into()],
            year: Some(2017),
        };
        assert_eq!(display_label(&meta), "Vaswani (2017)");
        assert_eq!(display_label(&PaperMetadata::default()), "Unknown (unknown)");
    }

    #[test]
    fn test_display_label_folds_to_ascii() {
        let meta = |author: &str| PaperMetadata {
            title: None,
            authors: vec![author.into()],
            year: Some(1931),
        };
        assert_eq!(display_label(&meta("Kurt Gödel")), "Godel (1931)");
        assert_eq!(display_label(&meta("Paul Erdős")), "Erdos (1931)");
        assert_eq!(display_label(&meta("湯川 秀樹")), "秀樹 (1931)");
    }

    #[test]
    fn test_mode_parse_and_file_name() {
        assert_eq!(
            "co-citation".parse::<NetworkMode>().unwrap(),
            NetworkMode::CoCitation
        );
        assert_eq!(
            NetworkMode::BibliographicCoupling.file_name(),
            "network_bibliographic_coupling.json"
        );
        assert!("amsler".parse::<NetworkMode>().is_err());
    }

    #[tokio::test]
    async fn test_label_network_falls_back_to_identifier() {
        let graph = NetworkGraph {
            mode: NetworkMode::BibliographicCoupling,
            nodes: ids(&["10.1/a", "10.1/b"]),
            edges: vec![edge("10.1/a", "10.1/b", 2)],
        };
        let source = FixtureSource::new("fx").metadata("10.1/a", &["Grace Hopper"], Some(1952));

        let document = label_network(&graph, &source, &Config::default()).await;
        assert_eq!(document.nodes[0].label, "Hopper (1952)");
        assert_eq!(document.nodes[1].label, "10.1/b");
        assert_eq!(document.edges, graph.edges);

        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["edges"][0]["weight"], 2);
        assert_eq!(json["nodes"][1]["id"], "10.1/b");
    }
}
