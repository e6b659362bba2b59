//! Configuration management for takeoff using the prefer crate for discovery.
//!
//! A config file (`takeoff.toml`, `takeoff.yaml`, `takeoff.json`, ...) is
//! optional. Every field has a default, and a handful of environment
//! variables override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmConfig;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse { format: &'static str, message: String },
}

/// Which pages get a tiled high-resolution scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TileScanMode {
    /// Only pages whose native text is too sparse.
    #[default]
    Sparse,
    /// Every page.
    All,
    /// Never tile; rely on native text and full-page OCR.
    Never,
}

/// Text acquisition and tiled OCR settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Native text shorter than this triggers the OCR fallback.
    pub min_chars: usize,
    /// Tile rendering resolution.
    pub dpi: u32,
    /// Full-page fallback rendering resolution.
    pub page_dpi: u32,
    pub rows: u32,
    pub cols: u32,
    /// Pixels each tile extends past its grid cell on every side.
    pub overlap_px: u32,
    /// Tesseract language.
    pub language: String,
    /// Tesseract page segmentation mode (11 = sparse text, suits drawings).
    pub psm: Option<u8>,
    pub native_timeout_secs: u64,
    pub raster_timeout_secs: u64,
    pub ocr_timeout_secs: u64,
    /// Tiles of one page rendered/OCR'd at the same time.
    pub tile_concurrency: usize,
    pub tile_scan: TileScanMode,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            min_chars: 30,
            dpi: 300,
            page_dpi: 250,
            rows: 3,
            cols: 2,
            overlap_px: 20,
            language: "eng".to_string(),
            psm: Some(11),
            native_timeout_secs: 25,
            raster_timeout_secs: 45,
            ocr_timeout_secs: 60,
            tile_concurrency: 2,
            tile_scan: TileScanMode::Sparse,
        }
    }
}

/// Code discovery and placement extraction bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Occurrences across tiles required before a token counts as a code.
    pub min_occurrences: usize,
    pub max_codes: usize,
    /// Characters of context kept on each side of a placement.
    pub evidence_radius: usize,
    /// Hard stop on placements per scan.
    pub max_placements: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            max_codes: 250,
            evidence_radius: 140,
            max_placements: 6000,
        }
    }
}

/// Empirical reconciliation constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Multiplier compensating for systematic OCR under-count.
    pub verify_uplift: f64,
    /// Share of the schedule count reported when nothing else was found.
    pub schedule_only_ratio: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            verify_uplift: 1.15,
            schedule_only_ratio: 0.4,
        }
    }
}

/// Document triage bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Share of the folder to keep before clamping.
    pub fraction: f64,
    pub min_docs: usize,
    pub max_docs: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            fraction: 0.12,
            min_docs: 8,
            max_docs: 25,
        }
    }
}

/// How equal quantities from separate sources are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqualQuantityPolicy {
    /// Equal values from separate entries are added (5 and 5 give 10).
    #[default]
    Sum,
    /// Equal values confirm each other (5 and 5 give 5).
    Confirm,
}

/// Export formatting options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Emit the optional File Path column.
    pub include_file_path: bool,
    /// Maximum pages listed per row after cross-document merging.
    pub page_cap: usize,
    pub equal_quantities: EqualQuantityPolicy,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_file_path: false,
            page_cap: 10,
            equal_quantities: EqualQuantityPolicy::Sum,
        }
    }
}

/// Evidence snippet selection bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetConfig {
    pub per_page: usize,
    pub max_chars: usize,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            per_page: 2,
            max_chars: 400,
        }
    }
}

fn default_workers() -> usize {
    4
}

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ocr: OcrSettings,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub snippets: SnippetConfig,
    /// Size of the page/document worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Optional document-understanding service.
    #[serde(default, skip_serializing_if = "LlmConfig::is_default")]
    pub llm: LlmConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ocr: OcrSettings::default(),
            discovery: DiscoveryConfig::default(),
            reconcile: ReconcileConfig::default(),
            triage: TriageConfig::default(),
            export: ExportConfig::default(),
            snippets: SnippetConfig::default(),
            workers: default_workers(),
            llm: LlmConfig::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults (plus env overrides) when nothing is found.
    pub async fn load() -> Self {
        match prefer::load("takeoff").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}; using defaults", e);
                            Self::default().with_env_overrides()
                        }
                    }
                } else {
                    Self::default().with_env_overrides()
                }
            }
            Err(_) => Self::default().with_env_overrides(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format is chosen by extension; anything unknown is read as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `TAKEOFF_WORKERS`: worker pool size
    /// - `TAKEOFF_OCR_DPI`: tile rendering DPI
    /// - `TAKEOFF_OCR_LANG`: Tesseract language
    /// - `LLM_*`: see [`LlmConfig::with_env_overrides`]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(workers) = env_parse::<usize>("TAKEOFF_WORKERS") {
            self.workers = workers.max(1);
        }
        if let Some(dpi) = env_parse::<u32>("TAKEOFF_OCR_DPI") {
            self.ocr.dpi = dpi;
        }
        if let Ok(lang) = std::env::var("TAKEOFF_OCR_LANG") {
            if !lang.is_empty() {
                self.ocr.language = lang;
            }
        }
        self.llm = self.llm.with_env_overrides();
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ocr.min_chars, 30);
        assert_eq!(config.ocr.dpi, 300);
        assert_eq!((config.ocr.rows, config.ocr.cols), (3, 2));
        assert_eq!(config.ocr.overlap_px, 20);
        assert_eq!(config.discovery.max_placements, 6000);
        assert_eq!(config.reconcile.verify_uplift, 1.15);
        assert_eq!(config.reconcile.schedule_only_ratio, 0.4);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::parse(
            r#"
workers = 6

[ocr]
dpi = 400
overlap_px = 40

[reconcile]
verify_uplift = 1.2
"#,
            "toml",
        )
        .unwrap();
        assert_eq!(config.workers, 6);
        assert_eq!(config.ocr.dpi, 400);
        assert_eq!(config.ocr.overlap_px, 40);
        assert_eq!(config.ocr.rows, 3);
        assert_eq!(config.reconcile.verify_uplift, 1.2);
        assert_eq!(config.reconcile.schedule_only_ratio, 0.4);
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = Config::parse("ocr:\n  tile_scan: all\n", "yml").unwrap();
        assert_eq!(yaml.ocr.tile_scan, TileScanMode::All);

        let json = Config::parse(r#"{"export": {"equal_quantities": "confirm"}}"#, "json").unwrap();
        assert_eq!(json.export.equal_quantities, EqualQuantityPolicy::Confirm);
    }

    #[test]
    fn test_parse_error() {
        let err = Config::parse("workers = [", "toml").unwrap_err();
        assert!(err.to_string().contains("TOML"));
    }
}
