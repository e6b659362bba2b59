//! Drawing vector extraction command.

use std::path::{Path, PathBuf};

use console::style;

use takeoff::vector::extract_page_vectors;

use crate::cli::helpers::write_output;

pub async fn cmd_vectors(
    file: PathBuf,
    page: u32,
    dpi: f64,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    // lopdf parsing is CPU-bound.
    let extraction =
        tokio::task::spawn_blocking(move || extract_page_vectors(&file, page, dpi)).await??;

    eprintln!(
        "{} Page {}: {} raw lines, {} cleaned, {} snap points ({} quality)",
        style("✓").green(),
        extraction.page_number,
        extraction.stats.raw_count,
        extraction.stats.cleaned_count,
        extraction.stats.snap_count,
        extraction.quality
    );

    write_output(output, &serde_json::to_string_pretty(&extraction)?).await
}
