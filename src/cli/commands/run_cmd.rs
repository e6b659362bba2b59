//! Full takeoff command.

use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use indicatif::ProgressBar;
use tokio::sync::mpsc;

use takeoff::config::Config;
use takeoff::llm::DocumentUnderstandingClient;
use takeoff::ocr::Toolchain;
use takeoff::services::export::render;
use takeoff::services::{TakeoffEvent, TakeoffReport, TakeoffService};

use super::{ExportArgs, ScanArgs};
use crate::cli::helpers::{bar_style, collect_documents, write_output};

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// PDF files or directories containing them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Write the takeoff table here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write every placement (code, page, tile, evidence) as JSON
    #[arg(long)]
    pub placements: Option<PathBuf>,

    /// Write the complete report (counts, pages, warnings) as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Job identifier shown in logs and written to the report (random by default)
    #[arg(long)]
    pub job_id: Option<String>,

    /// Enable the document-understanding collaborator
    #[arg(long)]
    pub llm: bool,

    #[command(flatten)]
    pub export: ExportArgs,

    #[command(flatten)]
    pub scan: ScanArgs,
}

pub async fn cmd_run(mut config: Config, args: RunArgs) -> anyhow::Result<()> {
    let documents = collect_documents(&args.inputs)?;
    if documents.is_empty() {
        println!("{} No PDF documents found", style("!").yellow());
        return Ok(());
    }

    if args.llm {
        config.llm.enabled = true;
    }
    if args.export.include_file_path {
        config.export.include_file_path = true;
    }

    let tools = Toolchain::system(&config.ocr);
    let mut service = TakeoffService::new(config.clone(), tools);
    if config.llm.enabled {
        let client = DocumentUnderstandingClient::new(config.llm.clone())?;
        service = service.with_collaborator(Arc::new(client));
    }

    let job_id = args
        .job_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (event_tx, event_rx) = mpsc::channel::<TakeoffEvent>(100);
    let event_handler = tokio::spawn(render_events(event_rx));

    let report = service.run(&job_id, &documents, event_tx).await;
    // The sender is dropped with `run`, so the handler drains and exits.
    let _ = event_handler.await;

    print_summary(&report);

    let table = render(&report.line_items, args.export.format, &config.export)?;
    write_output(args.output.as_deref(), &table).await?;

    if let Some(path) = &args.placements {
        let placements: Vec<_> = report.placements().collect();
        tokio::fs::write(path, serde_json::to_string_pretty(&placements)?).await?;
        println!(
            "{} Wrote {} placements to {}",
            style("✓").green(),
            placements.len(),
            path.display()
        );
    }

    if let Some(path) = &args.report {
        tokio::fs::write(path, serde_json::to_string_pretty(&report)?).await?;
        println!("{} Wrote report to {}", style("✓").green(), path.display());
    }

    Ok(())
}

/// Drive a progress bar from pipeline events.
async fn render_events(mut event_rx: mpsc::Receiver<TakeoffEvent>) {
    let mut progress: Option<ProgressBar> = None;
    let mut ocr_pages = 0usize;
    let mut tiled_pages = 0usize;

    while let Some(event) = event_rx.recv().await {
        match event {
            TakeoffEvent::TriageComplete {
                total_documents,
                selected,
                fallback,
            } => {
                let note = if fallback { " (no filename matched)" } else { "" };
                eprintln!(
                    "{} Triage selected {} of {} documents{}",
                    style("→").cyan(),
                    selected,
                    total_documents,
                    note
                );
            }
            TakeoffEvent::PagesStarted { total_pages } => {
                let bar = ProgressBar::new(total_pages as u64);
                bar.set_style(bar_style());
                bar.set_message("Reading pages...");
                progress = Some(bar);
            }
            TakeoffEvent::DocumentFailed { document_id, error } => {
                let line = format!(
                    "  {} Document {} failed: {}",
                    style("✗").red(),
                    document_id,
                    error
                );
                match &progress {
                    Some(bar) => bar.suspend(|| eprintln!("{}", line)),
                    None => eprintln!("{}", line),
                }
            }
            TakeoffEvent::PageAcquired { method, .. } => {
                if method == takeoff::models::TextMethod::Ocr {
                    ocr_pages += 1;
                }
                if let Some(bar) = &progress {
                    bar.inc(1);
                }
            }
            TakeoffEvent::TilesScanned {
                page_number,
                tiles,
                empty_tiles,
                ..
            } => {
                tiled_pages += 1;
                if let Some(bar) = &progress {
                    bar.set_message(format!(
                        "page {}: {} tiles ({} empty)",
                        page_number, tiles, empty_tiles
                    ));
                }
            }
            TakeoffEvent::CodesDiscovered { count } => {
                if let Some(bar) = progress.take() {
                    bar.finish_and_clear();
                }
                eprintln!(
                    "{} Pages read ({} via OCR, {} tile-scanned); {} codes discovered",
                    style("✓").green(),
                    ocr_pages,
                    tiled_pages,
                    count
                );
            }
            TakeoffEvent::PlacementCapReached { document_id, cap } => {
                eprintln!(
                    "  {} Placement cap of {} reached in {}",
                    style("!").yellow(),
                    cap,
                    document_id
                );
            }
            TakeoffEvent::DocumentCompleted {
                document_id,
                pages,
                placements,
            } => {
                tracing::debug!(
                    "{}: {} pages, {} placements",
                    document_id,
                    pages,
                    placements
                );
            }
            TakeoffEvent::ReconciliationComplete { codes } => {
                eprintln!("{} Reconciled {} codes", style("✓").green(), codes);
            }
            TakeoffEvent::CollaboratorComplete { entries } => {
                eprintln!(
                    "{} Qualitative review returned {} entries",
                    style("✓").green(),
                    entries
                );
            }
            TakeoffEvent::CollaboratorDegraded { reason } => {
                eprintln!(
                    "  {} Qualitative review skipped: {}",
                    style("!").yellow(),
                    reason
                );
            }
        }
    }

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
}

fn print_summary(report: &TakeoffReport) {
    eprintln!(
        "{} {} documents, {} pages, {} line items",
        style("→").cyan(),
        report.documents.len(),
        report.page_count(),
        report.line_items.len()
    );
    for warning in &report.warnings {
        eprintln!("  {} {}", style("!").yellow(), warning);
    }
}
