//! Tool availability check.

use console::style;

use takeoff::config::Config;
use takeoff::llm::DocumentUnderstandingClient;
use takeoff::ocr::check_tools;

/// Check external tools and the document-understanding service.
pub async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("Tool Status").bold());
    println!("{}", "-".repeat(50));

    println!("\n{}", style("External Tools:").cyan());
    let mut all_found = true;
    for (tool, available) in check_tools() {
        let status = if available {
            style("✓ found").green()
        } else {
            all_found = false;
            style("✗ not found").red()
        };
        println!("  {:<15} {}", tool, status);
    }

    println!("\n{}", style("Document Understanding:").cyan());
    if config.llm.enabled {
        let client = DocumentUnderstandingClient::new(config.llm.clone())?;
        let status = if client.is_available().await {
            style("✓ reachable").green()
        } else {
            style("✗ unreachable").red()
        };
        println!(
            "  {:<15} {} ({} at {})",
            config.llm.provider.as_str(),
            status,
            config.llm.model,
            config.llm.endpoint
        );
    } else {
        println!(
            "  {:<15} {}",
            "disabled",
            style("set LLM_ENABLED=true or pass --llm to run").dim()
        );
    }

    println!();
    if all_found {
        println!("{} All extraction tools are available", style("✓").green());
    } else {
        println!(
            "{} Some tools are missing. Install them for full extraction:",
            style("!").yellow()
        );
        println!("  - pdftotext, pdftoppm, pdfinfo: poppler-utils package");
        println!("  - tesseract: tesseract-ocr package");
    }

    Ok(())
}
