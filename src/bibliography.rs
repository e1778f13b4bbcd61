//! Bibliography records and the collaborators that supply them.
//!
//! The gap engine only needs three narrow seams: something that yields
//! bibliography records, something that yields the citation keys a document
//! actually uses, and somewhere to write generated entries. This module defines
//! those traits plus small file-backed implementations used by the CLI.
//!
//! BibTeX is read with the `biblatex` parser, so `@string` abbreviations are
//! expanded and LaTeX accent commands arrive as Unicode text.

use crate::error::{GapError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Block types that never describe a citable work
const SKIPPED_ENTRY_TYPES: &[&str] = &["comment", "string", "preamble"];

/// Start of an `@type{` block at the beginning of a line
static ENTRY_START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*@[a-zA-Z]").expect("entry regex is valid"));

/// `\cite{a,b}`, `\citep[p.~3]{a}`, `\nocite{x}`, `\parencite*{y}`, ...
static CITE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\[a-zA-Z]*cite[a-zA-Z]*\*?(?:\s*\[[^\]]*\])*\s*\{([^}]*)\}")
        .expect("cite regex is valid")
});

/// One entry of the user's bibliography, keyed by its citation key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibRecord {
    /// User-assigned citation key
    pub key: String,
    /// Entry type (`article`, `book`, ...), lowercased
    pub entry_type: String,
    pub title: Option<String>,
    /// Raw author string (`A and B and C`)
    pub author: Option<String>,
    pub year: Option<String>,
    pub doi: Option<String>,
    pub isbn: Option<String>,
    pub url: Option<String>,
    /// Explicit arXiv identifier (`eprint` with an arXiv prefix)
    pub arxiv: Option<String>,
}

impl BibRecord {
    /// Minimal record, handy for tests and programmatic callers.
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entry_type: "article".to_string(),
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Supplies the user's bibliography, in file order.
pub trait BibliographySource {
    fn parse(&self) -> Result<Vec<BibRecord>>;
}

/// Supplies the citation keys a document actually references.
pub trait CitationSource {
    /// Keys in order of first appearance, without duplicates.
    fn used_citations(&self) -> Result<Vec<String>>;
}

/// Accepts rendered bibliography-entry text.
pub trait EntrySink {
    fn write_entries(&mut self, text: &str) -> Result<()>;
}

/// Records whose key appears in `used`, ordered by first use in the document.
pub fn select_used<'a>(records: &'a [BibRecord], used: &[String]) -> Vec<&'a BibRecord> {
    let by_key: HashMap<&str, &BibRecord> = records.iter().map(|r| (r.key.as_str(), r)).collect();
    used.iter()
        .filter_map(|key| by_key.get(key.as_str()).copied())
        .collect()
}

// ============================================================================
// BibTeX file
// ============================================================================

/// A `.bib` file on disk.
pub struct BibFile {
    path: PathBuf,
}

impl BibFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BibliographySource for BibFile {
    fn parse(&self) -> Result<Vec<BibRecord>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            GapError::Bibliography(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let records = parse_bibtex(&content);
        info!(path = %self.path.display(), entries = records.len(), "Loaded bibliography");
        Ok(records)
    }
}

/// Parse BibTeX text into records, preserving file order.
///
/// The whole file is parsed first. Real files often carry a stray brace or a
/// non-standard block that fails the strict parse, so on failure each `@entry`
/// is parsed on its own and the broken ones are dropped.
pub fn parse_bibtex(content: &str) -> Vec<BibRecord> {
    match biblatex::Bibliography::parse(content) {
        Ok(bibliography) => bibliography.iter().filter_map(record_from_entry).collect(),
        Err(e) => {
            debug!(error = %e, "Bibliography does not parse as a whole, parsing per entry");
            parse_entries_individually(content)
        }
    }
}

fn parse_entries_individually(content: &str) -> Vec<BibRecord> {
    let starts: Vec<usize> = ENTRY_START_REGEX.find_iter(content).map(|m| m.start()).collect();

    let mut records = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(content.len());
        match biblatex::Bibliography::parse(&content[start..end]) {
            Ok(bibliography) => records.extend(bibliography.iter().filter_map(record_from_entry)),
            Err(e) => debug!(offset = start, error = %e, "Skipping unparsable entry"),
        }
    }
    records
}

fn record_from_entry(entry: &biblatex::Entry) -> Option<BibRecord> {
    let entry_type = entry.entry_type.to_string().to_ascii_lowercase();
    if SKIPPED_ENTRY_TYPES.contains(&entry_type.as_str()) {
        return None;
    }

    let fields: HashMap<String, String> = entry
        .fields
        .iter()
        .map(|(name, chunks)| (name.to_ascii_lowercase(), chunks_to_string(chunks)))
        .filter(|(_, value)| !value.is_empty())
        .collect();
    let field = |name: &str| fields.get(name).cloned();

    let archive = field("archiveprefix").or_else(|| field("eprinttype"));
    let arxiv = field("arxiv").or_else(|| {
        field("eprint").filter(|_| {
            archive
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case("arxiv"))
        })
    });

    Some(BibRecord {
        key: entry.key.clone(),
        entry_type,
        title: field("title"),
        author: field("author"),
        year: field("year").or_else(|| field("date")),
        doi: field("doi"),
        isbn: field("isbn"),
        url: field("url"),
        arxiv,
    })
}

/// Flatten parsed chunks to plain text. Accent commands are already decoded
/// by the parser; leftover grouping braces and whitespace runs are dropped.
fn chunks_to_string(chunks: &[biblatex::Spanned<biblatex::Chunk>]) -> String {
    let text: String = chunks
        .iter()
        .map(|c| match &c.v {
            biblatex::Chunk::Normal(s) => s.as_str(),
            biblatex::Chunk::Verbatim(s) => s.as_str(),
            biblatex::Chunk::Math(s) => s.as_str(),
        })
        .collect();
    text.replace(['{', '}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// LaTeX document
// ============================================================================

/// A LaTeX source file whose `\cite` commands define the used citations.
pub struct TexDocument {
    path: PathBuf,
}

impl TexDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CitationSource for TexDocument {
    fn used_citations(&self) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            GapError::Bibliography(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let keys = extract_citation_keys(&content);
        info!(path = %self.path.display(), keys = keys.len(), "Collected citation keys");
        Ok(keys)
    }
}

/// Citation keys in first-appearance order. Commented-out text is ignored.
pub fn extract_citation_keys(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for line in content.lines() {
        let line = strip_comment(line);
        for caps in CITE_REGEX.captures_iter(line) {
            for key in caps[1].split(',').map(str::trim) {
                if key.is_empty() || key == "*" {
                    continue;
                }
                if seen.insert(key.to_string()) {
                    keys.push(key.to_string());
                }
            }
        }
    }

    keys
}

fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'%' && (i == 0 || bytes[i - 1] != b'\\') {
            return &line[..i];
        }
    }
    line
}

// ============================================================================
// Entry sink
// ============================================================================

/// Appends generated entries to the end of a bibliography file.
pub struct BibAppender {
    path: PathBuf,
}

impl BibAppender {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EntrySink for BibAppender {
    fn write_entries(&mut self, text: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file)?;
        file.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            writeln!(file)?;
        }
        info!(path = %self.path.display(), "Appended generated entries");
        Ok(())
    }
}
