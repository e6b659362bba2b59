//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod inspect;
mod run_cmd;
mod vectors;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use takeoff::config::{Config, TileScanMode};
use takeoff::ocr::TileGrid;
use takeoff::services::ExportFormat;
use takeoff::vector::DEFAULT_VECTOR_DPI;

#[derive(Parser)]
#[command(name = "takeoff")]
#[command(about = "Quantity takeoff extraction and reconciliation for construction bid documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full takeoff over bid documents
    Run(run_cmd::RunArgs),

    /// Show which documents triage would select
    Triage {
        /// PDF files or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Acquire and classify a single page
    Page {
        /// PDF file
        file: PathBuf,
        /// Page number (1-indexed)
        page: u32,
        /// Print the full page text instead of a preview
        #[arg(long)]
        full: bool,
    },

    /// Tile-scan pages at high resolution and list discovered codes
    Scan {
        /// PDF file
        file: PathBuf,
        /// Pages to scan (e.g. "1", "1-5", "1,3,5-10"); all pages by default
        #[arg(short, long)]
        pages: Option<String>,
        /// Tile grid rows
        #[arg(long)]
        rows: Option<u32>,
        /// Tile grid columns
        #[arg(long)]
        cols: Option<u32>,
        /// Overlap between adjacent tiles, in pixels
        #[arg(long)]
        overlap: Option<u32>,
        /// Rendering DPI for tiles
        #[arg(long)]
        dpi: Option<u32>,
    },

    /// Reconcile three counts for one code
    Reconcile {
        /// Occurrences counted in native page text
        #[arg(long, default_value = "0")]
        text: u32,
        /// Quantity read from a schedule or legend
        #[arg(long, default_value = "0")]
        primary: u32,
        /// Placements found by the tiled scan
        #[arg(long, default_value = "0")]
        verify: u32,
    },

    /// Extract cleaned drawing vectors and snap points from a page
    Vectors {
        /// PDF file
        file: PathBuf,
        /// Page number (1-indexed)
        #[arg(default_value = "1")]
        page: u32,
        /// Output resolution
        #[arg(long, default_value_t = DEFAULT_VECTOR_DPI)]
        dpi: f64,
        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check external tool and collaborator availability
    Check,
}

/// Export options shared by commands that render line items.
#[derive(clap::Args, Debug, Clone)]
pub struct ExportArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,

    /// Add a File Path column
    #[arg(long)]
    pub include_file_path: bool,
}

/// Scan options shared by commands that acquire pages.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Which pages get a tiled high-resolution scan
    #[arg(long, value_enum)]
    pub tile_scan: Option<TileScanMode>,

    /// Number of concurrent page workers
    #[arg(short, long)]
    pub workers: Option<usize>,
}

impl ScanArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.tile_scan {
            config.ocr.tile_scan = mode;
        }
        if let Some(workers) = self.workers {
            config.workers = workers.max(1);
        }
    }
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load_from_path(&path).await?),
        None => Ok(Config::load().await),
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config).await?;

    if let Some(path) = &config.source_path {
        tracing::info!("Using config file {}", path.display());
    }

    match cli.command {
        Commands::Run(args) => {
            args.scan.apply(&mut config);
            run_cmd::cmd_run(config, args).await
        }
        Commands::Triage { inputs } => inspect::cmd_triage(&config, &inputs).await,
        Commands::Page { file, page, full } => inspect::cmd_page(config, &file, page, full).await,
        Commands::Scan {
            file,
            pages,
            rows,
            cols,
            overlap,
            dpi,
        } => {
            let grid = TileGrid {
                rows: rows.unwrap_or(config.ocr.rows).max(1),
                cols: cols.unwrap_or(config.ocr.cols).max(1),
                overlap_px: overlap.unwrap_or(config.ocr.overlap_px),
            };
            let dpi = dpi.unwrap_or(config.ocr.dpi);
            inspect::cmd_scan(config, &file, pages.as_deref(), grid, dpi).await
        }
        Commands::Reconcile {
            text,
            primary,
            verify,
        } => inspect::cmd_reconcile(&config, text, primary, verify),
        Commands::Vectors {
            file,
            page,
            dpi,
            output,
        } => vectors::cmd_vectors(file, page, dpi, output.as_deref()).await,
        Commands::Check => check::cmd_check(&config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "takeoff",
            "run",
            "bids/",
            "--format",
            "json",
            "--tile-scan",
            "all",
            "-w",
            "8",
            "--job-id",
            "bid-42",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.inputs, vec![PathBuf::from("bids/")]);
        assert_eq!(args.export.format, ExportFormat::Json);
        assert_eq!(args.scan.tile_scan, Some(TileScanMode::All));
        assert_eq!(args.job_id.as_deref(), Some("bid-42"));

        let mut config = Config::default();
        args.scan.apply(&mut config);
        assert_eq!(config.workers, 8);
        assert_eq!(config.ocr.tile_scan, TileScanMode::All);
    }

    #[test]
    fn test_global_verbose_after_subcommand() {
        let cli = Cli::try_parse_from(["takeoff", "reconcile", "--primary", "10", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
