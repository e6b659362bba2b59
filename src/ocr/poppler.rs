//! Poppler command-line tools: pdfinfo, pdftotext and pdftoppm.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;

use crate::config::OcrSettings;
use crate::models::PixelRect;

use super::backend::{PageSize, Rasterizer, TextLayer, ToolError};
use super::tools::run_tool;

const POPPLER_HINT: &str = "install poppler-utils";

static PAGE_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"size:\s*([0-9.]+)\s*x\s*([0-9.]+)\s*pts").unwrap());
static PAGE_ROT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"rot:\s*(\d+)").unwrap());

/// Text layer and rasterizer backed by Poppler.
pub struct PopplerTools {
    native_timeout: Duration,
    raster_timeout: Duration,
}

impl PopplerTools {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            native_timeout: Duration::from_secs(settings.native_timeout_secs),
            raster_timeout: Duration::from_secs(settings.raster_timeout_secs),
        }
    }

    /// Run pdftoppm for one page into a fresh temp dir and read back the PNG.
    ///
    /// The temp dir is dropped (and removed) before returning, so concurrent
    /// renders never share files.
    async fn pdftoppm(
        &self,
        pdf: &Path,
        page: u32,
        dpi: u32,
        region: Option<PixelRect>,
    ) -> Result<Vec<u8>, ToolError> {
        let temp_dir = TempDir::new()?;
        let prefix = temp_dir.path().join("render");

        let page_str = page.to_string();
        let dpi_str = dpi.to_string();
        let mut args: Vec<String> = vec![
            "-png".into(),
            "-r".into(),
            dpi_str,
            "-f".into(),
            page_str.clone(),
            "-l".into(),
            page_str,
            "-singlefile".into(),
        ];
        if let Some(r) = region {
            args.extend([
                "-x".into(),
                r.x.to_string(),
                "-y".into(),
                r.y.to_string(),
                "-W".into(),
                r.w.to_string(),
                "-H".into(),
                r.h.to_string(),
            ]);
        }
        args.push(pdf.display().to_string());
        args.push(prefix.display().to_string());

        run_tool("pdftoppm", &args, self.raster_timeout, POPPLER_HINT).await?;

        let image_path = png_path(&prefix);
        match tokio::fs::read(&image_path).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(ToolError::ToolFailed {
                tool: "pdftoppm".to_string(),
                message: format!("empty image for page {}", page),
            }),
            Err(_) => Err(ToolError::ToolFailed {
                tool: "pdftoppm".to_string(),
                message: format!("no image generated for page {}", page),
            }),
        }
    }
}

fn png_path(prefix: &Path) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(".png");
    PathBuf::from(path)
}

/// Parse `Pages:` from pdfinfo output.
pub(crate) fn parse_page_count(info: &str) -> Option<u32> {
    info.lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
}

/// Parse page size (and rotation) from pdfinfo output.
pub(crate) fn parse_page_size(info: &str) -> Option<PageSize> {
    let caps = PAGE_SIZE.captures(info)?;
    let width: f64 = caps.get(1)?.as_str().parse().ok()?;
    let height: f64 = caps.get(2)?.as_str().parse().ok()?;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    let rotation: u32 = PAGE_ROT
        .captures(info)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    if rotation % 180 == 90 {
        Some(PageSize {
            width_pts: height,
            height_pts: width,
        })
    } else {
        Some(PageSize {
            width_pts: width,
            height_pts: height,
        })
    }
}

#[async_trait]
impl TextLayer for PopplerTools {
    async fn page_count(&self, pdf: &Path) -> Result<u32, ToolError> {
        let out = run_tool("pdfinfo", [pdf.as_os_str()], self.native_timeout, POPPLER_HINT).await?;
        parse_page_count(&String::from_utf8_lossy(&out)).ok_or_else(|| ToolError::ToolFailed {
            tool: "pdfinfo".to_string(),
            message: "no page count in output".to_string(),
        })
    }

    async fn page_size(&self, pdf: &Path, page: u32) -> Result<PageSize, ToolError> {
        let page_str = page.to_string();
        let args: [&OsStr; 5] = [
            "-f".as_ref(),
            page_str.as_ref(),
            "-l".as_ref(),
            page_str.as_ref(),
            pdf.as_os_str(),
        ];
        let out = run_tool("pdfinfo", args, self.native_timeout, POPPLER_HINT).await?;
        parse_page_size(&String::from_utf8_lossy(&out)).ok_or_else(|| {
            ToolError::InvalidPageGeometry(format!("{} page {}", pdf.display(), page))
        })
    }

    async fn page_text(&self, pdf: &Path, page: u32) -> Result<String, ToolError> {
        let page_str = page.to_string();
        let args: [&OsStr; 9] = [
            "-layout".as_ref(),
            "-enc".as_ref(),
            "UTF-8".as_ref(),
            "-f".as_ref(),
            page_str.as_ref(),
            "-l".as_ref(),
            page_str.as_ref(),
            pdf.as_os_str(),
            "-".as_ref(),
        ];
        let out = run_tool("pdftotext", args, self.native_timeout, POPPLER_HINT).await?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }
}

#[async_trait]
impl Rasterizer for PopplerTools {
    async fn render_page(&self, pdf: &Path, page: u32, dpi: u32) -> Result<Vec<u8>, ToolError> {
        self.pdftoppm(pdf, page, dpi, None).await
    }

    async fn render_region(
        &self,
        pdf: &Path,
        page: u32,
        dpi: u32,
        region: PixelRect,
    ) -> Result<Vec<u8>, ToolError> {
        self.pdftoppm(pdf, page, dpi, Some(region)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDFINFO_RANGE: &str = "Producer:       AutoCAD\n\
        Pages:          12\n\
        Page    3 size: 2592 x 1728 pts\n\
        Page    3 rot:  0\n";

    #[test]
    fn test_parse_page_count() {
        assert_eq!(parse_page_count(PDFINFO_RANGE), Some(12));
        assert_eq!(parse_page_count("Producer: x\n"), None);
    }

    #[test]
    fn test_parse_page_size() {
        let size = parse_page_size(PDFINFO_RANGE).unwrap();
        assert_eq!(size.width_pts, 2592.0);
        assert_eq!(size.height_pts, 1728.0);

        let letter = parse_page_size("Page size:      612 x 792 pts (letter)\n").unwrap();
        assert_eq!(letter.width_pts, 612.0);
    }

    #[test]
    fn test_parse_rotated_page_size() {
        let size = parse_page_size("Page    1 size: 612 x 792 pts (letter)\nPage    1 rot:  90\n")
            .unwrap();
        assert_eq!(size.width_pts, 792.0);
        assert_eq!(size.height_pts, 612.0);
    }

    #[test]
    fn test_parse_page_size_missing() {
        assert!(parse_page_size("Pages: 1\n").is_none());
    }

    #[tokio::test]
    async fn test_missing_file_errors_not_panics() {
        let tools = PopplerTools::new(&OcrSettings::default());
        let missing = Path::new("/nonexistent/takeoff/missing.pdf");
        assert!(tools.page_text(missing, 1).await.is_err());
        assert!(tools.page_size(missing, 1).await.is_err());
        assert!(tools.render_page(missing, 1, 72).await.is_err());
    }
}
