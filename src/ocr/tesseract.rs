//! Tesseract OCR backend.
//!
//! Uses Tesseract via command-line. Each call writes the image into its own
//! temp dir so concurrent tiles never collide.

use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::config::OcrSettings;

use super::backend::{OcrEngine, ToolError};
use super::tools::{check_binary, run_tool};

/// Tesseract OCR backend.
pub struct TesseractBackend {
    language: String,
    psm: Option<u8>,
    timeout: Duration,
}

impl TesseractBackend {
    /// Create a new Tesseract backend with default configuration.
    pub fn new() -> Self {
        Self::with_settings(&OcrSettings::default())
    }

    /// Create a backend using the OCR section of the config.
    pub fn with_settings(settings: &OcrSettings) -> Self {
        Self {
            language: settings.language.clone(),
            psm: settings.psm,
            timeout: Duration::from_secs(settings.ocr_timeout_secs),
        }
    }

    pub fn is_available() -> bool {
        check_binary("tesseract")
    }

    fn args(&self, image_path: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            image_path.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        if let Some(psm) = self.psm {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }
        args
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractBackend {
    async fn ocr_image(&self, image: &[u8]) -> Result<String, ToolError> {
        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join("input.png");
        tokio::fs::write(&image_path, image).await?;

        let out = run_tool(
            "tesseract",
            self.args(&image_path),
            self.timeout,
            "install tesseract-ocr",
        )
        .await?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_include_psm() {
        let backend = TesseractBackend::new();
        let args = backend.args(std::path::Path::new("/tmp/x.png"));
        assert_eq!(args[1], "stdout");
        assert!(args.windows(2).any(|w| w[0] == "--psm" && w[1] == "11"));
    }

    #[test]
    fn test_args_without_psm() {
        let settings = OcrSettings {
            psm: None,
            language: "deu".to_string(),
            ..OcrSettings::default()
        };
        let args = TesseractBackend::with_settings(&settings).args(std::path::Path::new("a.png"));
        assert_eq!(args, vec!["a.png", "stdout", "-l", "deu"]);
    }
}
