//! Crossref API: fallback source for reference lists.
//!
//! Used only when Semantic Scholar reports a non-zero `referenceCount` but
//! withholds the list. Crossref deposits carry the publisher's references for
//! the work; they are normalized into [`RemoteReference`] with no citation
//! count (Crossref does not report one per reference).

use crate::identifiers::parse_year;
use crate::paper::RemoteReference;
use serde::{Deserialize, Serialize};

/// Crossref API base URL
pub const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// Polite pool email for Crossref API
pub const MAILTO: &str = "citegap@example.com";

pub(crate) fn works_url(base: &str, doi: &str, mailto: &str) -> String {
    format!(
        "{}/works/{}?mailto={}",
        base,
        doi,
        urlencoding::encode(mailto)
    )
}

// === Crossref API Response Types ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CrossrefResponse {
    message: CrossrefWork,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CrossrefWork {
    #[serde(default)]
    reference: Vec<CrossrefReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CrossrefReference {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "article-title")]
    article_title: Option<String>,
    #[serde(rename = "volume-title")]
    volume_title: Option<String>,
    #[serde(rename = "series-title")]
    series_title: Option<String>,
    author: Option<String>,
    year: Option<String>,
    #[serde(rename = "journal-title")]
    journal_title: Option<String>,
}

impl CrossrefResponse {
    /// Normalize every deposited reference, in deposit order.
    pub(crate) fn into_references(self) -> Vec<RemoteReference> {
        self.message
            .reference
            .into_iter()
            .map(parse_crossref_reference)
            .collect()
    }
}

/// Parse one Crossref reference into the shared reference shape
fn parse_crossref_reference(item: CrossrefReference) -> RemoteReference {
    let clean = |s: Option<String>| {
        s.map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|v| !v.is_empty())
    };

    let title = clean(item.article_title)
        .or_else(|| clean(item.volume_title))
        .or_else(|| clean(item.series_title));

    RemoteReference {
        paper_id: None,
        title,
        authors: clean(item.author).into_iter().collect(),
        year: item.year.as_deref().and_then(parse_year),
        doi: clean(item.doi),
        external_ids: None,
        venue: clean(item.journal_title),
        citation_count: None,
    }
}
