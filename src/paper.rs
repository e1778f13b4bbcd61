//! Provider-neutral shapes for looked-up papers and their references.

use crate::identifiers::normalize_doi;
use serde::{Deserialize, Serialize};

/// External identifiers attached to a paper by the metadata provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(rename = "DOI", default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(rename = "ArXiv", default, skip_serializing_if = "Option::is_none")]
    pub arxiv: Option<String>,
}

/// One entry in a paper's reference list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteReference {
    pub paper_id: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    /// DOI as reported directly on the reference (fallback provider)
    pub doi: Option<String>,
    /// Provider-specific ids (primary provider)
    pub external_ids: Option<ExternalIds>,
    pub venue: Option<String>,
    /// `None` when the provider does not report it, never a fake zero
    pub citation_count: Option<u64>,
}

impl RemoteReference {
    /// Normalized DOI from the reference's own field, else its external ids.
    pub fn doi(&self) -> Option<String> {
        self.doi
            .as_deref()
            .and_then(normalize_doi)
            .or_else(|| {
                self.external_ids
                    .as_ref()
                    .and_then(|ids| ids.doi.as_deref())
                    .and_then(normalize_doi)
            })
    }

    /// Title with surrounding whitespace removed, if non-empty.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// A paper resolved through the metadata client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotePaper {
    pub paper_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub external_ids: ExternalIds,
    pub venue: Option<String>,
    pub citation_count: Option<u64>,
    pub reference_count: Option<u64>,
    pub references: Vec<RemoteReference>,
    /// Whether the details came from the cache rather than the network
    #[serde(skip)]
    pub from_cache: bool,
}

impl RemotePaper {
    pub fn doi(&self) -> Option<String> {
        self.external_ids.doi.as_deref().and_then(normalize_doi)
    }

    /// The provider knows of references but withheld the list.
    pub fn references_restricted(&self) -> bool {
        self.reference_count.unwrap_or(0) > 0 && self.references.is_empty()
    }
}
