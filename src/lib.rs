//! # citegap
//!
//! Finds papers that the sources you already cite keep citing, but that are
//! missing from your own bibliography.
//!
//! ## Modules
//!
//! - [`bibliography`] - BibTeX records, LaTeX citation keys, entry sinks
//! - [`identifiers`] - DOI / arXiv / ISBN / title normalization
//! - [`cache`] - Two-tier response cache (memory + JSON files)
//! - [`client`] - Rate-limited metadata client with retry and fallback
//! - [`semanticscholar`] - Semantic Scholar Graph API types
//! - [`crossref`] - Crossref reference-list fallback
//! - [`gaps`] - Citation frequency analysis
//! - [`render`] - BibTeX rendering of suggestions
//! - [`config`] - Persisted settings and API key resolution
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use citegap::bibliography::{BibFile, BibliographySource, CitationSource, TexDocument};
//! use citegap::client::{ClientConfig, MetadataClient};
//! use citegap::gaps::{GapAnalyzer, GapOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let records = BibFile::new("refs.bib").parse()?;
//!     let used = TexDocument::new("paper.tex").used_citations()?;
//!     let client = MetadataClient::new(ClientConfig::default(), None, None)?;
//!
//!     let report = GapAnalyzer::new(&client, &records, &used)
//!         .find_gaps(&GapOptions::default())
//!         .await;
//!     println!("Found {} gaps", report.gaps.len());
//!     Ok(())
//! }
//! ```

pub mod bibliography;
pub mod cache;
pub mod client;
pub mod config;
pub mod crossref;
pub mod error;
pub mod gaps;
pub mod identifiers;
pub mod paper;
pub mod render;
pub mod semanticscholar;

pub use error::{GapError, Result};
