//! Shared helper functions for CLI commands.

use std::path::{Path, PathBuf};

use console::style;
use indicatif::ProgressStyle;

use takeoff::models::Document;

/// Expand files and directories into PDF documents, sorted by path.
/// Directories are walked recursively.
pub fn collect_documents(inputs: &[PathBuf]) -> anyhow::Result<Vec<Document>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            walk_pdfs(input, &mut paths)?;
        } else if input.exists() {
            paths.push(input.clone());
        } else {
            anyhow::bail!("No such file or directory: {}", input.display());
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths.iter().map(|p| Document::from_path(p)).collect())
}

fn walk_pdfs(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_pdfs(&path, out)?;
        } else if is_pdf(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Parse a page range string like "1", "1-5", "1,3,5-10" into sorted page
/// numbers within `1..=max_pages`.
pub fn parse_page_range(range_str: &str, max_pages: u32) -> Vec<u32> {
    let mut pages = Vec::new();

    for part in range_str.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.trim().parse().unwrap_or(1);
            let end: u32 = end.trim().parse().unwrap_or(max_pages);
            for p in start.max(1)..=end.min(max_pages) {
                if !pages.contains(&p) {
                    pages.push(p);
                }
            }
        } else if let Ok(p) = part.parse::<u32>() {
            if p >= 1 && p <= max_pages && !pages.contains(&p) {
                pages.push(p);
            }
        }
    }

    pages.sort();
    pages
}

/// Write to a file, or to stdout when no path is given.
pub async fn write_output(path: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, contents).await?;
            println!("{} Wrote {}", style("✓").green(), path.display());
        }
        None => println!("{}", contents),
    }
    Ok(())
}

pub fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_range() {
        assert_eq!(parse_page_range("1", 10), vec![1]);
        assert_eq!(parse_page_range("3-5", 10), vec![3, 4, 5]);
        assert_eq!(parse_page_range("8-", 10), vec![8, 9, 10]);
        assert_eq!(parse_page_range("5,1-2,2", 10), vec![1, 2, 5]);
        assert_eq!(parse_page_range("0,11", 10), Vec::<u32>::new());
    }

    #[test]
    fn test_collect_documents_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("addenda");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("A-101.pdf"), b"%PDF").unwrap();
        std::fs::write(nested.join("Sign Schedule.PDF"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let docs = collect_documents(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["A-101.pdf", "Sign Schedule.PDF"]);
    }

    #[test]
    fn test_collect_documents_missing_input() {
        assert!(collect_documents(&[PathBuf::from("/nonexistent/bid.pdf")]).is_err());
    }
}
