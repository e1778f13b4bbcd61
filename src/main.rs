//! citegap - find frequently co-cited papers missing from your bibliography
//!
//! Looks up every paper your LaTeX document cites, collects their reference
//! lists, and ranks the references you have not cited yet by how many of
//! your sources cite them.
//!
//! ## Usage
//!
//! ```bash
//! citegap gaps --bib refs.bib --tex paper.tex --min-citations 3
//! citegap cache stats
//! citegap config set-key <KEY>
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use citegap::bibliography::{BibAppender, BibFile, BibliographySource, CitationSource, EntrySink, TexDocument};
use citegap::cache::CacheStore;
use citegap::client::{ClientConfig, MetadataClient};
use citegap::config::{default_cache_dir, resolve_api_key, Settings, SettingsManager};
use citegap::gaps::{GapAnalyzer, GapOptions, GapReport, ReferenceFrequency, DEFAULT_MIN_CITATIONS};
use citegap::render;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definitions
// ============================================================================

/// Find papers your sources cite that your bibliography is missing
#[derive(Parser)]
#[command(name = "citegap")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a document for citation gaps
    Gaps {
        /// BibTeX bibliography
        #[arg(long)]
        bib: PathBuf,

        /// LaTeX document whose \cite commands define the used citations
        #[arg(long)]
        tex: PathBuf,

        /// Minimum number of citing sources for a suggestion
        #[arg(long, default_value_t = DEFAULT_MIN_CITATIONS)]
        min_citations: usize,

        /// Look up at most N source papers
        #[arg(long)]
        limit: Option<usize>,

        /// Also analyze bibliography entries the document does not cite
        #[arg(long)]
        include_unused: bool,

        /// Suppress per-paper progress
        #[arg(short, long)]
        quiet: bool,

        /// Semantic Scholar API key (overrides env and settings)
        #[arg(long)]
        api_key: Option<String>,

        /// Cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Show only the top N suggestions
        #[arg(long, default_value = "20")]
        top: usize,

        /// Print BibTeX entries for the shown suggestions
        #[arg(long)]
        bibtex: bool,

        /// Append BibTeX entries for the shown suggestions to this file
        #[arg(long)]
        append: Option<PathBuf>,

        /// Export the full ranking as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Manage the response cache
    Cache {
        /// Cache directory
        #[arg(long, global = true)]
        cache_dir: Option<PathBuf>,

        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts and size
    Stats,
    /// Remove expired entries
    Clean,
    /// Remove every entry
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Persist a Semantic Scholar API key
    SetKey { key: String },
    /// Show settings file path
    Path,
    /// Show current settings
    Show,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Gaps {
            bib,
            tex,
            min_citations,
            limit,
            include_unused,
            quiet,
            api_key,
            cache_dir,
            top,
            bibtex,
            append,
            csv,
        } => {
            let options = GapOptions {
                min_citations,
                limit_papers: limit,
                quiet,
                include_unused,
            };
            let output = OutputOptions { top, bibtex, append, csv };
            run_gaps(&bib, &tex, options, api_key, cache_dir, output).await
        }
        Commands::Cache { cache_dir, action } => handle_cache(cache_dir, action),
        Commands::Config { action } => handle_config(action),
    }
}

// ============================================================================
// Gap Analysis
// ============================================================================

struct OutputOptions {
    top: usize,
    bibtex: bool,
    append: Option<PathBuf>,
    csv: Option<PathBuf>,
}

async fn run_gaps(
    bib: &Path,
    tex: &Path,
    options: GapOptions,
    api_key: Option<String>,
    cache_dir: Option<PathBuf>,
    output: OutputOptions,
) -> Result<()> {
    let records = BibFile::new(bib)
        .parse()
        .context("Failed to load bibliography")?;
    let used = TexDocument::new(tex)
        .used_citations()
        .context("Failed to read LaTeX document")?;

    if records.is_empty() {
        println!("Bibliography {} has no entries.", bib.display());
        return Ok(());
    }

    let settings = load_settings();
    let cache_dir = pick_cache_dir(cache_dir, &settings);
    let cache = match CacheStore::open(&cache_dir) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(dir = %cache_dir.display(), error = %e, "Cache unavailable, continuing without it");
            None
        }
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let api_key = resolve_api_key(api_key.as_deref(), &settings, &cwd);
    if api_key.is_none() {
        info!("No API key configured, using the shared rate limit");
    }

    let client = MetadataClient::new(ClientConfig::default(), cache, api_key)
        .context("Failed to build metadata client")?;

    let report = GapAnalyzer::new(&client, &records, &used)
        .find_gaps(&options)
        .await;

    print_report(&report, output.top);

    let shown = &report.gaps[..report.gaps.len().min(output.top)];

    if output.bibtex && !shown.is_empty() {
        println!("\n--- Suggested BibTeX ---\n");
        println!("{}", render::render_entries(shown));
    }

    if let Some(path) = &output.append {
        if shown.is_empty() {
            println!("Nothing to append to {}", path.display());
        } else {
            BibAppender::new(path)
                .write_entries(&render::render_entries(shown))
                .with_context(|| format!("Failed to append entries to {}", path.display()))?;
            println!("Appended {} entries to {}", shown.len(), path.display());
        }
    }

    if let Some(path) = &output.csv {
        let rows: Vec<GapRow> = report.gaps.iter().map(GapRow::from).collect();
        save_csv(path, &rows)?;
    }

    Ok(())
}

fn print_report(report: &GapReport, top: usize) {
    let lookups = &report.lookups;
    println!(
        "\nAnalyzed {} source papers: {} found ({} cached), {} not found, {} failed",
        report.total_analyzed, lookups.found, lookups.from_cache, lookups.not_found, lookups.errors
    );
    if lookups.aborted {
        println!("Stopped early: the metadata provider did not answer any request.");
    }

    if report.gaps.is_empty() {
        println!("\nNo citation gaps found.");
        return;
    }

    println!("\n--- Citation Gaps ---\n");
    for (i, gap) in report.gaps.iter().take(top).enumerate() {
        let reference = &gap.reference;
        let year = reference.year.map(|y| format!(" ({})", y)).unwrap_or_default();
        println!(
            "{:>3}. [{}x] {}{}",
            i + 1,
            gap.count,
            reference.title().unwrap_or("(untitled)"),
            year
        );
        if let Some(author) = reference.authors.first() {
            let et_al = if reference.authors.len() > 1 { " et al." } else { "" };
            println!("       {}{}", author, et_al);
        }
        println!("       cited by: {}", gap.cited_by.join(", "));
    }
    if report.gaps.len() > top {
        println!("\n... and {} more", report.gaps.len() - top);
    }

    let summary = &report.summary;
    println!(
        "\nSummary: {} gaps ({} high priority, {} medium priority)",
        summary.total, summary.high_priority, summary.medium_priority
    );
}

/// One CSV row of the ranking
#[derive(Serialize)]
struct GapRow {
    rank_key: String,
    count: usize,
    title: String,
    authors: String,
    year: Option<i32>,
    venue: Option<String>,
    doi: Option<String>,
    citation_count: Option<u64>,
    cited_by: String,
}

impl From<&ReferenceFrequency> for GapRow {
    fn from(gap: &ReferenceFrequency) -> Self {
        let reference = &gap.reference;
        Self {
            rank_key: gap.key.to_string(),
            count: gap.count,
            title: reference.title().unwrap_or("").to_string(),
            authors: reference.authors.join("; "),
            year: reference.year,
            venue: reference.venue.clone(),
            doi: reference.doi(),
            citation_count: reference.citation_count,
            cited_by: gap.cited_by.join("; "),
        }
    }
}

fn save_csv<T: Serialize>(path: &Path, data: &[T]) -> Result<()> {
    if data.is_empty() {
        println!("No data to save to {:?}", path);
        return Ok(());
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context("Failed to create CSV writer")?;

    for item in data {
        wtr.serialize(item).context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    println!("Saved: {:?}", path);
    Ok(())
}

// ============================================================================
// Settings and Cache Commands
// ============================================================================

fn load_settings() -> Settings {
    match SettingsManager::new() {
        Ok(manager) => manager.load(),
        Err(e) => {
            warn!(error = %e, "Settings unavailable, using defaults");
            Settings::default()
        }
    }
}

/// `--cache-dir` > persisted setting > platform default
fn pick_cache_dir(explicit: Option<PathBuf>, settings: &Settings) -> PathBuf {
    explicit
        .or_else(|| settings.cache_dir.clone())
        .unwrap_or_else(default_cache_dir)
}

fn handle_cache(cache_dir: Option<PathBuf>, action: CacheAction) -> Result<()> {
    let dir = pick_cache_dir(cache_dir, &load_settings());
    let cache = CacheStore::open(&dir)
        .with_context(|| format!("Failed to open cache at {}", dir.display()))?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("Cache directory: {}", cache.dir().display());
            println!("Entries: {}", stats.durable_count);
            println!("Size: {:.1} KiB", stats.total_size_bytes as f64 / 1024.0);
        }
        CacheAction::Clean => {
            let removed = cache.cleanup();
            println!("Removed {} expired entries.", removed);
        }
        CacheAction::Clear => {
            cache.clear().context("Failed to clear cache")?;
            println!("Cache cleared.");
        }
    }

    Ok(())
}

fn handle_config(action: ConfigAction) -> Result<()> {
    let manager = SettingsManager::new()?;

    match action {
        ConfigAction::SetKey { key } => {
            manager.set_api_key(&key)?;
            println!("API key saved to {:?}", manager.path());
        }
        ConfigAction::Path => {
            println!("Settings file: {:?}", manager.path());
        }
        ConfigAction::Show => {
            let settings = manager.load();
            let key = settings
                .api_key
                .as_deref()
                .map(mask_key)
                .unwrap_or_else(|| "(not set)".to_string());
            let cache_dir = pick_cache_dir(None, &settings);
            println!("API key:   {}", key);
            println!("Cache dir: {}", cache_dir.display());
        }
    }

    Ok(())
}

fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{}...", visible)
}
