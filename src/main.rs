//! # Citation Harness CLI (`cite`)
//!
//! ## Usage
//!
//! ```bash
//! cite --config ./config/cite.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cite map <citations.json>` | Map citations to positioned highlights (`--report` adds diagnostics) |
//! | `cite search "<query>"` | Search the retrieval service and page through highlights |
//! | `cite answer <answer.txt> <documents.json>` | Resolve the chunks a model answer cites |
//!
//! ## Examples
//!
//! ```bash
//! # Map with measured page sizes
//! cite map citations.json --pages pages.json
//!
//! # Fetch three pages of results
//! cite search "quarterly revenue" --pages 3
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides `[logging] filter`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use citation_harness::{answer, config, logging, map_cmd, renderer, search};

/// Citation Harness CLI: map retrieval citations onto rendered documents.
#[derive(Parser)]
#[command(
    name = "cite",
    about = "Citation Harness: map retrieval citations onto rendered documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cite.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/cite.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map a citation file to positioned highlights.
    ///
    /// Malformed citations are skipped with a warning; the rest are
    /// printed as a JSON array.
    Map {
        /// JSON array of citations, or an object with a `citations` array.
        citations: PathBuf,

        /// JSON object of measured page sizes keyed by page number.
        #[arg(long)]
        pages: Option<PathBuf>,

        /// Reorder bounding-box corners so x1 <= x2 and y1 <= y2.
        #[arg(long)]
        normalize_corners: bool,

        /// Print `{highlights, diagnostics}` instead of the bare highlight list.
        #[arg(long)]
        report: bool,
    },

    /// Search the retrieval service.
    Search {
        /// The search query string.
        query: String,

        /// Number of result pages to load.
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// Attach citations to a model answer.
    Answer {
        /// Raw model output.
        answer: PathBuf,

        /// Retrieved documents in prompt order.
        documents: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    logging::init(&cfg.logging.filter);
    renderer::install(renderer::RendererSettings::from_config(&cfg))?;

    match cli.command {
        Commands::Map {
            citations,
            pages,
            normalize_corners,
            report,
        } => {
            map_cmd::run_map(&citations, pages.as_deref(), normalize_corners, report)?;
        }
        Commands::Search { query, pages } => {
            search::run_search(&cfg, &query, pages.max(1)).await?;
        }
        Commands::Answer { answer, documents } => {
            answer::run_answer(&answer, &documents)?;
        }
    }

    Ok(())
}
