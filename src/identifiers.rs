//! Identifier extraction for bibliography records.
//!
//! Pure functions: no I/O, no errors. Each identifier is produced by an
//! ordered list of extractors, the first one yielding a value wins.

use crate::bibliography::BibRecord;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static DOI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"10\.\d{4,9}/[^\s?#]+").expect("doi regex is valid"));

/// New-style (`2101.00001`) and old-style (`hep-th/9901001`) arXiv ids.
static ARXIV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}\.\d{4,5}|[a-z][a-z\-]+(?:\.[A-Z]{2})?/\d{7})(?:v\d+)?")
        .expect("arxiv regex is valid")
});

static YEAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}").expect("year regex is valid"));

/// Normalized identifiers derived from one bibliography record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifiers {
    /// Lowercased DOI without resolver prefix
    pub doi: Option<String>,
    /// arXiv id without version suffix
    pub arxiv: Option<String>,
    /// ISBN digits (and a trailing `x` check digit)
    pub isbn: Option<String>,
    pub normalized_title: Option<String>,
    pub year: Option<i32>,
}

type Extractor = fn(&BibRecord) -> Option<String>;

const DOI_EXTRACTORS: &[Extractor] = &[doi_from_field, doi_from_url];
const ARXIV_EXTRACTORS: &[Extractor] = &[arxiv_from_field, arxiv_from_url];

/// Derive every identifier available for `record`.
pub fn extract_identifiers(record: &BibRecord) -> Identifiers {
    Identifiers {
        doi: first_match(record, DOI_EXTRACTORS),
        arxiv: first_match(record, ARXIV_EXTRACTORS),
        isbn: record.isbn.as_deref().and_then(normalize_isbn),
        normalized_title: record
            .title
            .as_deref()
            .map(normalize_title)
            .filter(|t| !t.is_empty()),
        year: record.year.as_deref().and_then(parse_year),
    }
}

fn first_match(record: &BibRecord, extractors: &[Extractor]) -> Option<String> {
    extractors.iter().find_map(|extract| extract(record))
}

fn doi_from_field(record: &BibRecord) -> Option<String> {
    record.doi.as_deref().and_then(normalize_doi)
}

fn doi_from_url(record: &BibRecord) -> Option<String> {
    let url = Url::parse(record.url.as_deref()?).ok()?;
    if !host_is(url.host_str()?, "doi.org") {
        return None;
    }
    let path = urlencoding::decode(url.path()).ok()?;
    normalize_doi(path.trim_start_matches('/'))
}

fn arxiv_from_field(record: &BibRecord) -> Option<String> {
    record.arxiv.as_deref().and_then(normalize_arxiv)
}

fn arxiv_from_url(record: &BibRecord) -> Option<String> {
    let url = Url::parse(record.url.as_deref()?).ok()?;
    if !host_is(url.host_str()?, "arxiv.org") {
        return None;
    }
    normalize_arxiv(url.path())
}

/// `domain` itself or one of its subdomains.
fn host_is(host: &str, domain: &str) -> bool {
    host.strip_suffix(domain)
        .is_some_and(|rest| rest.is_empty() || rest.ends_with('.'))
}

/// Lowercase, strip everything that is neither alphanumeric nor whitespace,
/// collapse whitespace runs, trim.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pull a bare, lowercased DOI out of a DOI string, `doi:` form, or resolver URL.
pub fn normalize_doi(raw: &str) -> Option<String> {
    DOI_REGEX
        .find(raw.trim())
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_lowercase())
}

/// Extract an arXiv id, dropping any `vN` version suffix.
pub fn normalize_arxiv(raw: &str) -> Option<String> {
    ARXIV_REGEX
        .captures(raw.trim())
        .map(|caps| caps[1].to_string())
}

/// Keep only ISBN digits and the `x` check character.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let isbn: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    (!isbn.is_empty()).then_some(isbn)
}

pub fn parse_year(raw: &str) -> Option<i32> {
    YEAR_REGEX.find(raw)?.as_str().parse().ok()
}
