use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "kindle-scraper",
    about = "Scrape Kindle notebook highlights and the library book list into CSV, then convert them to JSON, reports, or Obsidian notes"
)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape per-book highlights from the notebook view into a CSV file
    ScrapeHighlights {
        /// Show the browser window so you can log in to Amazon manually
        #[arg(long)]
        headful: bool,

        /// Output CSV path (default: <out_dir>/highlights.csv)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Scrape the library book list into a CSV file
    ScrapeLibrary {
        /// Show the browser window so you can log in to Amazon manually
        #[arg(long)]
        headful: bool,
    },

    /// Convert the highlights CSV into JSON grouped by book
    FormatJson {
        /// Input CSV path (default: <out_dir>/highlights.csv)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output JSON path (default: <out_dir>/highlights.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Analyze the highlights CSV and write a profile report
    Analyze {
        /// Input CSV path (default: <out_dir>/highlights.csv)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Export highlights as one Markdown note per book
    ExportObsidian {
        /// Input CSV path (default: <out_dir>/highlights.csv)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output directory (default: <out_dir>/obsidian)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Open the notebook page and dump DOM details for selector debugging
    DebugDom,
}
