//! Single-stage inspection commands: triage, page, scan and reconcile.

use std::path::{Path, PathBuf};

use console::style;
use indicatif::ProgressBar;

use takeoff::config::Config;
use takeoff::models::Document;
use takeoff::ocr::{truncate_chars, TileGrid, TiledScanner, Toolchain};
use takeoff::services::codes::{discover_codes, extract_placements, verify_counts};
use takeoff::services::triage::score_filename;
use takeoff::services::{reconcile_counts, triage, TakeoffService};

use crate::cli::helpers::{bar_style, collect_documents, parse_page_range};

const PREVIEW_CHARS: usize = 600;

/// Show triage scores and the selected subset.
pub async fn cmd_triage(config: &Config, inputs: &[PathBuf]) -> anyhow::Result<()> {
    let documents = collect_documents(inputs)?;
    let result = triage("cli", &documents, &config.triage);

    println!(
        "\n{} (cap {}{})",
        style("Triage").bold(),
        result.cap,
        if result.fallback { ", fallback" } else { "" }
    );
    println!("{}", "-".repeat(60));
    for document in &documents {
        let mark = if result.is_selected(&document.id) {
            style("✓").green()
        } else {
            style("·").dim()
        };
        println!(
            "  {} {:>4}  {}",
            mark,
            score_filename(&document.filename),
            document.filename
        );
    }
    println!(
        "\n{} of {} documents selected",
        result.selected.len(),
        documents.len()
    );
    Ok(())
}

/// Acquire, classify and snippet one page.
pub async fn cmd_page(config: Config, file: &Path, page: u32, full: bool) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("No such file: {}", file.display());
    }
    let document = Document::from_path(file);
    let tools = Toolchain::system(&config.ocr);
    let service = TakeoffService::new(config, tools);
    let analysis = service.analyze_page(&document, page).await;

    println!("\n{} {}", style("Page").bold(), page);
    println!("{}", "-".repeat(60));
    println!("  {:<12} {}", "Method:", analysis.method);
    println!("  {:<12} {}", "Needs OCR:", analysis.needs_ocr);
    println!("  {:<12} {}", "Kind:", analysis.kind.as_str());
    println!(
        "  {:<12} {}",
        "Sheet:",
        analysis.sheet_reference.as_deref().unwrap_or("-")
    );
    if !analysis.tiles.is_empty() {
        println!("  {:<12} {}", "Tiles:", analysis.tiles.len());
    }

    if !analysis.snippets.is_empty() {
        println!("\n{}", style("Evidence:").cyan());
        for snippet in &analysis.snippets {
            println!("  {} {}", style("→").dim(), snippet.text);
        }
    }

    println!("\n{}", style("Text:").cyan());
    if full {
        println!("{}", analysis.text);
    } else {
        let preview = truncate_chars(&analysis.text, PREVIEW_CHARS);
        println!("{}", preview);
        if preview.len() < analysis.text.len() {
            println!("{}", style("... (use --full for the rest)").dim());
        }
    }
    Ok(())
}

/// Tile-scan pages and report discovered codes with their verify counts.
pub async fn cmd_scan(
    config: Config,
    file: &Path,
    pages: Option<&str>,
    grid: TileGrid,
    dpi: u32,
) -> anyhow::Result<()> {
    let tools = Toolchain::system(&config.ocr);
    let page_count = tools.text.page_count(file).await?;
    let pages = match pages {
        Some(range) => parse_page_range(range, page_count),
        None => (1..=page_count).collect(),
    };
    if pages.is_empty() {
        println!("{} No pages to scan", style("!").yellow());
        return Ok(());
    }

    let scanner = TiledScanner::new(tools, &config.ocr)
        .with_grid(grid)
        .with_dpi(dpi);
    println!(
        "{} Scanning {} pages in a {}x{} grid at {} dpi ({} px overlap)",
        style("→").cyan(),
        pages.len(),
        grid.rows,
        grid.cols,
        dpi,
        grid.overlap_px
    );

    let progress = ProgressBar::new(pages.len() as u64);
    progress.set_style(bar_style());
    let mut tiles = Vec::new();
    for page in pages {
        progress.set_message(format!("page {}", page));
        tiles.extend(scanner.scan_page(file, page).await);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let codes = discover_codes(tiles.iter().map(|t| t.text.as_str()), &config.discovery);
    let scan = extract_placements(&tiles, &codes, &config.discovery);
    let verified = verify_counts(&scan.placements);

    let empty = tiles.iter().filter(|t| t.text.is_empty()).count();
    println!(
        "{} {} tiles ({} empty), {} codes, {} placements",
        style("✓").green(),
        tiles.len(),
        empty,
        codes.len(),
        scan.placements.len()
    );
    if scan.truncated {
        println!(
            "  {} placement cap of {} reached",
            style("!").yellow(),
            config.discovery.max_placements
        );
    }

    if !codes.is_empty() {
        println!("\n  {:<12} {:>8} {:>8}", "Code", "Seen", "Verify");
        for token in &codes {
            println!(
                "  {:<12} {:>8} {:>8}",
                token.code,
                token.occurrences,
                verified.get(&token.code).copied().unwrap_or(0)
            );
        }
    }
    Ok(())
}

/// Print how three counts reconcile under the current settings.
pub fn cmd_reconcile(config: &Config, text: u32, primary: u32, verify: u32) -> anyhow::Result<()> {
    let final_qty = reconcile_counts(text, primary, verify, &config.reconcile);
    println!(
        "text {}, schedule {}, verify {} {} {}",
        text,
        primary,
        verify,
        style("→").cyan(),
        style(final_qty).bold()
    );
    Ok(())
}
