//! Semantic Scholar Graph API: request paths and response shapes.
//!
//! API Details:
//! - Paper endpoint: GET /graph/v1/paper/{id} where id is a paperId,
//!   `DOI:<doi>` or `arXiv:<id>`
//! - Search endpoint: GET /graph/v1/paper/search?query=...
//! - Rate limit: 1 req/s (authenticated via `x-api-key`)
//! - Reference lists of some publishers are withheld: `referenceCount` is
//!   set but `references` comes back empty

use crate::paper::{ExternalIds, RemotePaper, RemoteReference};
use serde::{Deserialize, Serialize};

/// Semantic Scholar API base URL
pub const SS_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Fields requested for a full paper lookup, references included
const PAPER_FIELDS: &str = "paperId,title,authors,year,venue,externalIds,citationCount,referenceCount,\
references.paperId,references.title,references.authors,references.year,references.venue,\
references.externalIds,references.citationCount";

/// Fields requested for a title search; only the top hit's id is used
const SEARCH_FIELDS: &str = "paperId,title";

pub(crate) fn doi_url(base: &str, doi: &str) -> String {
    format!("{}/paper/DOI:{}?fields={}", base, doi, PAPER_FIELDS)
}

pub(crate) fn arxiv_url(base: &str, arxiv_id: &str) -> String {
    format!("{}/paper/arXiv:{}?fields={}", base, arxiv_id, PAPER_FIELDS)
}

pub(crate) fn paper_url(base: &str, paper_id: &str) -> String {
    format!(
        "{}/paper/{}?fields={}",
        base,
        urlencoding::encode(paper_id),
        PAPER_FIELDS
    )
}

pub(crate) fn search_url(base: &str, normalized_title: &str) -> String {
    format!(
        "{}/paper/search?query={}&limit=1&fields={}",
        base,
        urlencoding::encode(normalized_title),
        SEARCH_FIELDS
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SSPaper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    title: Option<String>,
    authors: Option<Vec<SSAuthor>>,
    year: Option<i32>,
    venue: Option<String>,
    #[serde(rename = "externalIds")]
    external_ids: Option<ExternalIds>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
    #[serde(rename = "referenceCount")]
    reference_count: Option<u64>,
    references: Option<Vec<SSPaper>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SSAuthor {
    name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SSSearchResponse {
    #[serde(default)]
    data: Vec<SSSearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SSSearchHit {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
}

impl SSSearchResponse {
    /// Provider id of the best match, if any.
    pub(crate) fn top_paper_id(&self) -> Option<&str> {
        self.data
            .first()
            .and_then(|hit| hit.paper_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

fn author_names(authors: Option<Vec<SSAuthor>>) -> Vec<String> {
    authors
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| a.name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<SSPaper> for RemoteReference {
    fn from(paper: SSPaper) -> Self {
        RemoteReference {
            paper_id: paper.paper_id,
            title: non_empty(paper.title),
            authors: author_names(paper.authors),
            year: paper.year,
            doi: None,
            external_ids: paper.external_ids,
            venue: non_empty(paper.venue),
            citation_count: paper.citation_count,
        }
    }
}

impl From<SSPaper> for RemotePaper {
    fn from(paper: SSPaper) -> Self {
        RemotePaper {
            paper_id: paper.paper_id,
            title: paper.title.unwrap_or_default(),
            authors: author_names(paper.authors),
            year: paper.year,
            external_ids: paper.external_ids.unwrap_or_default(),
            venue: non_empty(paper.venue),
            citation_count: paper.citation_count,
            reference_count: paper.reference_count,
            references: paper
                .references
                .unwrap_or_default()
                .into_iter()
                .map(RemoteReference::from)
                .collect(),
            from_cache: false,
        }
    }
}
