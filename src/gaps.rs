//! Gap analysis: which papers do my sources keep citing that I don't?
//!
//! The run is split in two halves:
//!
//! - [`GapAnalyzer::collect`] resolves each source record through the
//!   [`MetadataClient`], strictly one after another.
//! - [`analyze`] is pure: it indexes the user's used citations, drops every
//!   reference already known, and counts how many distinct sources cite each
//!   remaining reference.

use crate::bibliography::{select_used, BibRecord};
use crate::client::MetadataClient;
use crate::identifiers::{extract_identifiers, normalize_title};
use crate::paper::{RemotePaper, RemoteReference};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_MIN_CITATIONS: usize = 2;

/// Abort the batch after this many errors without a single successful lookup
pub const MAX_ERRORS_WITHOUT_SUCCESS: usize = 5;

/// Gaps cited by at least this many sources are high priority
pub const HIGH_PRIORITY_MIN: usize = 3;

/// Options for [`GapAnalyzer::find_gaps`].
#[derive(Debug, Clone)]
pub struct GapOptions {
    /// Minimum number of distinct citing sources for a gap
    pub min_citations: usize,
    /// Look up at most this many source papers
    pub limit_papers: Option<usize>,
    /// Suppress progress narration
    pub quiet: bool,
    /// Analyze every bibliography record, not just the cited ones
    pub include_unused: bool,
}

impl Default for GapOptions {
    fn default() -> Self {
        Self {
            min_citations: DEFAULT_MIN_CITATIONS,
            limit_papers: None,
            quiet: false,
            include_unused: false,
        }
    }
}

// ============================================================================
// Existing-papers index
// ============================================================================

/// Lookup over the user's bibliography by DOI, ISBN, title and title+year.
pub struct ExistingIndex<'a> {
    by_doi: HashMap<String, &'a BibRecord>,
    by_isbn: HashMap<String, &'a BibRecord>,
    by_title: HashMap<String, Vec<(&'a BibRecord, Option<i32>)>>,
    by_title_year: HashMap<(String, i32), &'a BibRecord>,
}

impl<'a> ExistingIndex<'a> {
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a BibRecord>,
    {
        let mut index = Self {
            by_doi: HashMap::new(),
            by_isbn: HashMap::new(),
            by_title: HashMap::new(),
            by_title_year: HashMap::new(),
        };

        for record in records {
            let ids = extract_identifiers(record);
            if let Some(doi) = ids.doi {
                index.by_doi.entry(doi).or_insert(record);
            }
            if let Some(isbn) = ids.isbn {
                index.by_isbn.entry(isbn).or_insert(record);
            }
            if let Some(title) = ids.normalized_title {
                if let Some(year) = ids.year {
                    index.by_title_year.entry((title.clone(), year)).or_insert(record);
                }
                index.by_title.entry(title).or_default().push((record, ids.year));
            }
        }

        index
    }

    /// Number of records reachable through at least one mapping.
    pub fn indexed_count(&self) -> usize {
        let mut keys: Vec<&str> = self
            .by_doi
            .values()
            .chain(self.by_isbn.values())
            .chain(self.by_title_year.values())
            .map(|r| r.key.as_str())
            .chain(
                self.by_title
                    .values()
                    .flatten()
                    .map(|(r, _)| r.key.as_str()),
            )
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.len()
    }

    /// The existing record matching `reference`, if any: DOI first, then
    /// title+year, then title alone when either side has no year.
    pub fn find(&self, reference: &RemoteReference) -> Option<&'a BibRecord> {
        if let Some(record) = reference.doi().and_then(|doi| self.by_doi.get(&doi).copied()) {
            return Some(record);
        }

        let title = normalize_title(reference.title()?);
        if title.is_empty() {
            return None;
        }

        if let Some(year) = reference.year {
            if let Some(record) = self.by_title_year.get(&(title.clone(), year)).copied() {
                return Some(record);
            }
        }

        self.by_title
            .get(&title)?
            .iter()
            .find(|(_, year)| reference.year.is_none() || year.is_none())
            .map(|(record, _)| *record)
    }
}

// ============================================================================
// Reference keys and aggregation
// ============================================================================

/// Deduplication key for a candidate reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceKey {
    Doi(String),
    TitleYear(String, i32),
    Title(String),
    /// Never merged with anything else
    Unkeyed(usize),
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKey::Doi(doi) => write!(f, "doi:{}", doi),
            ReferenceKey::TitleYear(title, year) => write!(f, "title:{}|{}", title, year),
            ReferenceKey::Title(title) => write!(f, "title:{}", title),
            ReferenceKey::Unkeyed(n) => write!(f, "unkeyed:{}", n),
        }
    }
}

/// DOI key, else normalized title+year, else normalized title. `None` when
/// the reference carries nothing to deduplicate on.
pub fn reference_key(reference: &RemoteReference) -> Option<ReferenceKey> {
    if let Some(doi) = reference.doi() {
        return Some(ReferenceKey::Doi(doi));
    }
    let title = reference
        .title()
        .map(normalize_title)
        .filter(|t| !t.is_empty())?;
    Some(match reference.year {
        Some(year) => ReferenceKey::TitleYear(title, year),
        None => ReferenceKey::Title(title),
    })
}

/// How often one candidate reference is cited across the user's sources.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceFrequency {
    pub key: ReferenceKey,
    /// Number of distinct citing sources
    pub count: usize,
    /// Payload of the first occurrence
    pub reference: RemoteReference,
    /// Citation keys of the citing sources, in processing order
    pub cited_by: Vec<String>,
}

/// A source record together with its resolved paper.
#[derive(Debug, Clone)]
pub struct SourcePaper {
    pub key: String,
    pub paper: RemotePaper,
}

/// Accumulates reference frequencies across source papers.
pub struct Aggregator<'i, 'a> {
    index: &'i ExistingIndex<'a>,
    entries: Vec<ReferenceFrequency>,
    positions: HashMap<ReferenceKey, usize>,
    unkeyed: usize,
    excluded: usize,
}

impl<'i, 'a> Aggregator<'i, 'a> {
    pub fn new(index: &'i ExistingIndex<'a>) -> Self {
        Self {
            index,
            entries: Vec::new(),
            positions: HashMap::new(),
            unkeyed: 0,
            excluded: 0,
        }
    }

    /// Fold one source's reference list in.
    pub fn add_source(&mut self, source_key: &str, paper: &RemotePaper) {
        for reference in &paper.references {
            if reference.title().is_none() {
                continue;
            }
            if let Some(existing) = self.index.find(reference) {
                debug!(source = source_key, existing = %existing.key, "Reference already in bibliography");
                self.excluded += 1;
                continue;
            }

            let key = reference_key(reference).unwrap_or_else(|| {
                self.unkeyed += 1;
                ReferenceKey::Unkeyed(self.unkeyed)
            });

            match self.positions.get(&key) {
                Some(&pos) => {
                    let entry = &mut self.entries[pos];
                    if !entry.cited_by.iter().any(|k| k == source_key) {
                        entry.cited_by.push(source_key.to_string());
                        entry.count += 1;
                    }
                }
                None => {
                    self.positions.insert(key.clone(), self.entries.len());
                    self.entries.push(ReferenceFrequency {
                        key,
                        count: 1,
                        reference: reference.clone(),
                        cited_by: vec![source_key.to_string()],
                    });
                }
            }
        }
    }

    /// References skipped because the bibliography already has them.
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    /// Entries cited at least `min_citations` times, most cited first. Ties
    /// keep first-seen order.
    pub fn finish(self, min_citations: usize) -> Vec<ReferenceFrequency> {
        let mut gaps: Vec<ReferenceFrequency> = self
            .entries
            .into_iter()
            .filter(|e| e.count >= min_citations)
            .collect();
        gaps.sort_by(|a, b| b.count.cmp(&a.count));
        gaps
    }
}

/// Rank the references of `sources` that `used` does not already contain.
pub fn analyze(sources: &[SourcePaper], used: &[&BibRecord], min_citations: usize) -> Vec<ReferenceFrequency> {
    let index = ExistingIndex::build(used.iter().copied());
    debug!(used = used.len(), indexed = index.indexed_count(), "Built existing-papers index");
    let mut aggregator = Aggregator::new(&index);
    for source in sources {
        aggregator.add_source(&source.key, &source.paper);
    }
    debug!(excluded = aggregator.excluded(), "Known references skipped");
    aggregator.finish(min_citations)
}

// ============================================================================
// Summary and report
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GapSummary {
    /// Cited by at least three sources
    pub high_priority: usize,
    /// Cited by exactly two sources
    pub medium_priority: usize,
    pub total: usize,
}

impl GapSummary {
    pub fn from_gaps(gaps: &[ReferenceFrequency]) -> Self {
        Self {
            high_priority: gaps.iter().filter(|g| g.count >= HIGH_PRIORITY_MIN).count(),
            medium_priority: gaps.iter().filter(|g| g.count == 2).count(),
            total: gaps.len(),
        }
    }
}

/// Outcome counters of the lookup phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LookupStats {
    pub found: usize,
    pub from_cache: usize,
    pub not_found: usize,
    pub errors: usize,
    /// The batch stopped early because the provider looked unreachable
    pub aborted: bool,
}

impl LookupStats {
    fn successes(&self) -> usize {
        self.found + self.not_found
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GapReport {
    pub gaps: Vec<ReferenceFrequency>,
    /// Source papers whose lookup was attempted
    pub total_analyzed: usize,
    pub summary: GapSummary,
    pub lookups: LookupStats,
}

// ============================================================================
// Engine
// ============================================================================

/// Orchestrates lookups and analysis over one bibliography snapshot.
pub struct GapAnalyzer<'a> {
    client: &'a MetadataClient,
    bibliography: &'a [BibRecord],
    used_keys: &'a [String],
}

impl<'a> GapAnalyzer<'a> {
    pub fn new(client: &'a MetadataClient, bibliography: &'a [BibRecord], used_keys: &'a [String]) -> Self {
        Self {
            client,
            bibliography,
            used_keys,
        }
    }

    /// Records actually cited in the document, in order of first use.
    pub fn used_records(&self) -> Vec<&'a BibRecord> {
        select_used(self.bibliography, self.used_keys)
    }

    /// The records whose reference lists will be mined.
    pub fn candidate_sources(&self, options: &GapOptions) -> Vec<&'a BibRecord> {
        let mut sources = if options.include_unused {
            self.bibliography.iter().collect()
        } else {
            self.used_records()
        };
        if let Some(limit) = options.limit_papers {
            sources.truncate(limit);
        }
        sources
    }

    pub async fn find_gaps(&self, options: &GapOptions) -> GapReport {
        let sources = self.candidate_sources(options);
        if !options.quiet {
            info!(sources = sources.len(), "Looking up source papers");
        }

        let (resolved, lookups) = self.collect(&sources, options.quiet).await;

        let used = self.used_records();
        let gaps = analyze(&resolved, &used, options.min_citations);
        let summary = GapSummary::from_gaps(&gaps);

        if !options.quiet {
            info!(
                gaps = summary.total,
                high = summary.high_priority,
                medium = summary.medium_priority,
                "Gap analysis complete"
            );
        }

        GapReport {
            gaps,
            total_analyzed: lookups.found + lookups.not_found + lookups.errors,
            summary,
            lookups,
        }
    }

    /// Resolve each source sequentially. Per-lookup failures are counted and
    /// skipped; a run of failures with no success at all aborts the batch.
    pub async fn collect(&self, sources: &[&BibRecord], quiet: bool) -> (Vec<SourcePaper>, LookupStats) {
        let mut resolved = Vec::new();
        let mut stats = LookupStats::default();
        let total = sources.len();

        for (i, record) in sources.iter().enumerate() {
            let progress = format!("{}/{}", i + 1, total);
            let title = record.title.as_deref().unwrap_or("");

            match self.client.resolve(record).await {
                Ok(Some(paper)) => {
                    stats.found += 1;
                    if paper.from_cache {
                        stats.from_cache += 1;
                    }
                    if !quiet {
                        let status = match (paper.references.is_empty(), paper.from_cache) {
                            (true, _) => "no references found",
                            (false, true) => "found (cached)",
                            (false, false) => "found",
                        };
                        info!(progress = %progress, key = %record.key, references = paper.references.len(), "{}", status);
                    }
                    resolved.push(SourcePaper {
                        key: record.key.clone(),
                        paper,
                    });
                }
                Ok(None) => {
                    stats.not_found += 1;
                    if !quiet {
                        info!(progress = %progress, key = %record.key, "not found");
                    }
                }
                Err(e) => {
                    stats.errors += 1;
                    if !quiet {
                        warn!(progress = %progress, key = %record.key, title = title, error = %e, "lookup failed");
                    }
                    if stats.successes() == 0 && stats.errors > MAX_ERRORS_WITHOUT_SUCCESS {
                        warn!(errors = stats.errors, "Provider looks unreachable, stopping lookups");
                        stats.aborted = true;
                        break;
                    }
                }
            }
        }

        (resolved, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(title: &str, year: Option<i32>, doi: Option<&str>) -> RemoteReference {
        RemoteReference {
            title: Some(title.to_string()),
            year,
            doi: doi.map(str::to_string),
            ..Default::default()
        }
    }

    fn source(key: &str, references: Vec<RemoteReference>) -> SourcePaper {
        SourcePaper {
            key: key.to_string(),
            paper: RemotePaper {
                title: key.to_uppercase(),
                reference_count: Some(references.len() as u64),
                references,
                ..Default::default()
            },
        }
    }

    fn record(key: &str, title: &str, year: Option<&str>, doi: Option<&str>) -> BibRecord {
        BibRecord {
            year: year.map(str::to_string),
            doi: doi.map(str::to_string),
            ..BibRecord::new(key, title)
        }
    }

    #[test]
    fn test_two_sources_citing_same_reference() {
        let x = reference("X", Some(2020), Some("10.1/x"));
        let sources = vec![source("A", vec![x.clone()]), source("B", vec![x])];

        let gaps = analyze(&sources, &[], 2);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].count, 2);
        assert_eq!(gaps[0].cited_by, vec!["A", "B"]);
        assert_eq!(gaps[0].key, ReferenceKey::Doi("10.1/x".to_string()));
    }

    #[test]
    fn test_known_doi_is_excluded_at_any_threshold() {
        let x = reference("X", Some(2020), Some("10.1/x"));
        let sources = vec![source("A", vec![x.clone()]), source("B", vec![x])];
        let existing = record("mine", "A Completely Different Title", None, Some("10.1/X"));

        for min in [0, 1, 2, 5] {
            assert!(analyze(&sources, &[&existing], min).is_empty());
        }
    }

    #[test]
    fn test_doi_on_external_ids_is_used() {
        let x = RemoteReference {
            title: Some("X".to_string()),
            external_ids: Some(crate::paper::ExternalIds {
                doi: Some("10.1/X".to_string()),
                arxiv: None,
            }),
            ..Default::default()
        };
        let existing = record("mine", "Other", None, Some("10.1/x"));
        let index = ExistingIndex::build([&existing]);
        assert!(index.find(&x).is_some());
        assert_eq!(reference_key(&x), Some(ReferenceKey::Doi("10.1/x".to_string())));
    }

    #[test]
    fn test_title_year_matching() {
        let existing = record("mine", "Deep Learning!", Some("2015"), None);
        let index = ExistingIndex::build([&existing]);

        assert!(index.find(&reference("deep   learning", Some(2015), None)).is_some());
        assert!(index.find(&reference("Deep Learning", Some(2016), None)).is_none());
        // no year on the reference: title alone decides
        assert!(index.find(&reference("Deep Learning", None, None)).is_some());
    }

    #[test]
    fn test_title_only_when_existing_has_no_year() {
        let existing = record("mine", "Deep Learning", None, None);
        let index = ExistingIndex::build([&existing]);
        assert!(index.find(&reference("Deep Learning", Some(2016), None)).is_some());
    }

    #[test]
    fn test_index_covers_every_identifier() {
        let full = BibRecord {
            isbn: Some("978-0-262-03561-3".to_string()),
            ..record("full", "Deep Learning", Some("2016"), Some("10.1/dl"))
        };
        let bare = BibRecord {
            key: "bare".to_string(),
            ..Default::default()
        };
        let index = ExistingIndex::build([&full, &bare]);

        assert_eq!(index.indexed_count(), 1);
        assert_eq!(index.by_isbn.get("9780262035613").map(|r| r.key.as_str()), Some("full"));
        assert!(index.find(&reference("unrelated", None, Some("10.1/DL"))).is_some());
    }

    #[test]
    fn test_repeated_reference_in_one_source_counts_once() {
        let x = reference("X", Some(2020), None);
        let sources = vec![source("A", vec![x.clone(), x.clone()]), source("B", vec![x])];

        let gaps = analyze(&sources, &[], 1);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].count, 2);
        assert_eq!(gaps[0].cited_by, vec!["A", "B"]);
    }

    #[test]
    fn test_reference_key_is_pure_and_discriminating() {
        let a = reference("The Same Title.", Some(2020), None);
        let b = reference("the same   title", Some(2020), None);
        let c = reference("The Same Title", Some(2021), None);
        let d = reference("The Same Title", None, None);

        assert_eq!(reference_key(&a), reference_key(&b));
        assert_ne!(reference_key(&a), reference_key(&c));
        assert_eq!(reference_key(&d), Some(ReferenceKey::Title("the same title".to_string())));
        assert_eq!(reference_key(&reference("???", None, None)), None);
    }

    #[test]
    fn test_untitled_and_unkeyable_references() {
        let untitled = RemoteReference {
            doi: Some("10.1/untitled".to_string()),
            ..Default::default()
        };
        let symbols = reference("???", None, None);
        let sources = vec![
            source("A", vec![untitled.clone(), symbols.clone()]),
            source("B", vec![untitled, symbols]),
        ];

        // untitled entries are skipped, unkeyable ones never merge
        let gaps = analyze(&sources, &[], 1);
        assert_eq!(gaps.len(), 2);
        assert!(gaps.iter().all(|g| g.count == 1));
        assert!(gaps.iter().all(|g| matches!(g.key, ReferenceKey::Unkeyed(_))));
    }

    #[test]
    fn test_min_citations_filter_and_ordering() {
        let r = |t: &str| reference(t, Some(2020), None);
        let sources = vec![
            source("A", vec![r("one"), r("two"), r("three")]),
            source("B", vec![r("two"), r("three")]),
            source("C", vec![r("three"), r("four")]),
            source("D", vec![r("four")]),
        ];

        let gaps = analyze(&sources, &[], 2);
        assert!(gaps.iter().all(|g| g.count >= 2));
        let titles: Vec<&str> = gaps.iter().filter_map(|g| g.reference.title()).collect();
        // ties keep first-seen order; this is incidental, not a contract
        assert_eq!(titles, vec!["three", "two", "four"]);

        let summary = GapSummary::from_gaps(&gaps);
        assert_eq!(
            summary,
            GapSummary {
                high_priority: 1,
                medium_priority: 2,
                total: 3
            }
        );
    }

    #[test]
    fn test_first_occurrence_payload_is_kept() {
        let first = RemoteReference {
            venue: Some("First Venue".to_string()),
            ..reference("Paper", Some(2020), Some("10.1/p"))
        };
        let second = RemoteReference {
            venue: Some("Second Venue".to_string()),
            ..reference("Paper (preprint)", Some(2019), Some("10.1/P"))
        };
        let gaps = analyze(&[source("A", vec![first]), source("B", vec![second])], &[], 2);
        assert_eq!(gaps[0].reference.venue.as_deref(), Some("First Venue"));
    }

    #[test]
    fn test_candidate_sources() -> crate::Result<()> {
        let client = MetadataClient::new(Default::default(), None, None)?;
        let bibliography = vec![
            record("a", "A", None, None),
            record("b", "B", None, None),
            record("c", "C", None, None),
        ];
        let used = vec!["c".to_string(), "a".to_string()];
        let analyzer = GapAnalyzer::new(&client, &bibliography, &used);

        let keys = |records: Vec<&BibRecord>| records.iter().map(|r| r.key.clone()).collect::<Vec<_>>();

        assert_eq!(keys(analyzer.candidate_sources(&GapOptions::default())), vec!["c", "a"]);
        let all = GapOptions {
            include_unused: true,
            limit_papers: Some(2),
            ..Default::default()
        };
        assert_eq!(keys(analyzer.candidate_sources(&all)), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_accented_bibtex_title_matches_unicode_reference() {
        let records = crate::bibliography::parse_bibtex(
            r#"@book{hilbert, title = {{\"U}ber die Grundlagen der Geometrie}, year = {1899}}"#,
        );
        let used: Vec<&BibRecord> = records.iter().collect();
        let cited = reference("Über die Grundlagen der Geometrie", Some(1899), None);
        let sources = vec![source("A", vec![cited.clone()]), source("B", vec![cited])];

        assert!(analyze(&sources, &used, 1).is_empty());
    }

    #[tokio::test]
    async fn test_batch_aborts_when_provider_unreachable() -> crate::Result<()> {
        use crate::client::ClientConfig;
        use std::time::Duration;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = ClientConfig {
            primary_base: server.uri(),
            fallback_base: server.uri(),
            min_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        let client = MetadataClient::new(config, None, None)?;

        let bibliography: Vec<BibRecord> = (0..10)
            .map(|i| record(&format!("k{}", i), "T", None, Some(&format!("10.1/{}", i))))
            .collect();
        let used: Vec<String> = bibliography.iter().map(|r| r.key.clone()).collect();

        let report = GapAnalyzer::new(&client, &bibliography, &used)
            .find_gaps(&GapOptions {
                quiet: true,
                ..Default::default()
            })
            .await;

        assert!(report.lookups.aborted);
        assert_eq!(report.lookups.errors, MAX_ERRORS_WITHOUT_SUCCESS + 1);
        assert_eq!(report.total_analyzed, MAX_ERRORS_WITHOUT_SUCCESS + 1);
        assert!(report.gaps.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_not_found_prevents_abort() -> crate::Result<()> {
        use crate::client::ClientConfig;
        use std::time::Duration;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/DOI:10.1/0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paper/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = ClientConfig {
            primary_base: server.uri(),
            fallback_base: server.uri(),
            min_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        let client = MetadataClient::new(config, None, None)?;

        let bibliography: Vec<BibRecord> = (0..8)
            .map(|i| record(&format!("k{}", i), "Some Title", None, Some(&format!("10.1/{}", i))))
            .collect();
        let used: Vec<String> = bibliography.iter().map(|r| r.key.clone()).collect();

        let report = GapAnalyzer::new(&client, &bibliography, &used)
            .find_gaps(&GapOptions {
                quiet: true,
                ..Default::default()
            })
            .await;

        assert!(!report.lookups.aborted);
        assert_eq!(report.lookups.not_found, 1);
        assert_eq!(report.lookups.errors, 7);
        assert_eq!(report.total_analyzed, 8);
        Ok(())
    }
}
