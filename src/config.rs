//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.company-kb.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".company-kb.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Summarizer settings.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Archiver settings.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Query settings.
    #[serde(default)]
    pub query: QueryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path of the global company index.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            verbose: false,
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("company_index.json")
}

/// Where the summarizer looks for collaborator output, and how much it keeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Narrative report, relative to the run directory.
    #[serde(default = "default_report_file")]
    pub report_file: String,

    /// Company info file, relative to the run directory.
    #[serde(default = "default_company_info_file")]
    pub company_info_file: String,

    /// Financial data candidates; the first existing file is used.
    #[serde(default = "default_financial_data_files")]
    pub financial_data_files: Vec<String>,

    /// All announcements file, relative to the run directory.
    #[serde(default = "default_announcements_file")]
    pub announcements_file: String,

    /// Important announcements file, relative to the run directory.
    #[serde(default = "default_important_announcements_file")]
    pub important_announcements_file: String,

    /// Directory holding annual report PDFs.
    #[serde(default = "default_annual_reports_dir")]
    pub annual_reports_dir: String,

    /// Heading text that opens the investment-points block.
    #[serde(default = "default_thesis_markers")]
    pub thesis_markers: Vec<String>,

    /// Metrics kept per year. Empty keeps every metric.
    #[serde(default = "default_key_metrics")]
    pub key_metrics: Vec<String>,

    /// Maximum report sections recorded.
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,

    /// Maximum investment points recorded.
    #[serde(default = "default_max_theses")]
    pub max_theses: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            report_file: default_report_file(),
            company_info_file: default_company_info_file(),
            financial_data_files: default_financial_data_files(),
            announcements_file: default_announcements_file(),
            important_announcements_file: default_important_announcements_file(),
            annual_reports_dir: default_annual_reports_dir(),
            thesis_markers: default_thesis_markers(),
            key_metrics: default_key_metrics(),
            max_sections: default_max_sections(),
            max_theses: default_max_theses(),
        }
    }
}

fn default_report_file() -> String {
    "analysis_report.md".to_string()
}

fn default_company_info_file() -> String {
    "processed_data/company_info.json".to_string()
}

fn default_financial_data_files() -> Vec<String> {
    vec![
        "processed_data/financial_data_with_source.json",
        "processed_data/financial_data_from_reports.json",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_announcements_file() -> String {
    "processed_data/all_announcements.json".to_string()
}

fn default_important_announcements_file() -> String {
    "processed_data/important_announcements.json".to_string()
}

fn default_annual_reports_dir() -> String {
    "raw_data/annual_reports".to_string()
}

fn default_thesis_markers() -> Vec<String> {
    vec![
        "核心投资逻辑",
        "核心投资要点",
        "core investment points",
        "key investment points",
        "investment thesis",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_key_metrics() -> Vec<String> {
    vec![
        "revenue",
        "net_profit",
        "gross_margin",
        "net_margin",
        "roe",
        "total_assets",
        "total_equity",
        "total_liabilities",
        "asset_liability_ratio",
        "operating_cash_flow",
        "营业收入",
        "净利润",
        "毛利率",
        "净利率",
        "ROE",
        "总资产",
        "净资产",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_sections() -> usize {
    20
}

fn default_max_theses() -> usize {
    10
}

/// Archiver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Create an archive after summarizing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Raw-input subtree, relative to the run directory.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: String,

    /// Keep the uncompressed subtree after a verified archive.
    #[serde(default = "default_true")]
    pub keep_original: bool,

    /// gzip level, 0-9.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            raw_dir: default_raw_dir(),
            keep_original: true,
            compression_level: default_compression_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_raw_dir() -> String {
    "raw_data".to_string()
}

fn default_compression_level() -> u32 {
    6
}

/// Query rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Investment points shown by `load` and `compare`.
    #[serde(default = "default_display_theses")]
    pub display_theses: usize,

    /// Announcement titles shown in the learning summary.
    #[serde(default = "default_sample_titles")]
    pub sample_titles: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            display_theses: default_display_theses(),
            sample_titles: default_sample_titles(),
        }
    }
}

fn default_display_theses() -> usize {
    5
}

fn default_sample_titles() -> usize {
    5
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref index) = args.index {
            self.general.index_path = index.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(crate::cli::Command::Summarize {
            no_keep_original,
            skip_archive,
            ..
        }) = &args.command
        {
            if *no_keep_original {
                self.archive.keep_original = false;
            }
            if *skip_archive {
                self.archive.enabled = false;
            }
        }

        self.archive.compression_level = self.archive.compression_level.min(9);
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.index_path, PathBuf::from("company_index.json"));
        assert_eq!(config.archive.raw_dir, "raw_data");
        assert!(config.archive.keep_original);
        assert_eq!(config.summarizer.max_sections, 20);
        assert!(config.summarizer.key_metrics.contains(&"revenue".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
index_path = "/srv/kb/company_index.json"
verbose = true

[summarizer]
max_theses = 3
key_metrics = []

[archive]
keep_original = false
compression_level = 9
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(
            config.general.index_path,
            PathBuf::from("/srv/kb/company_index.json")
        );
        assert!(config.general.verbose);
        assert_eq!(config.summarizer.max_theses, 3);
        assert!(config.summarizer.key_metrics.is_empty());
        assert_eq!(config.summarizer.report_file, "analysis_report.md");
        assert!(!config.archive.keep_original);
        assert!(config.archive.enabled);
    }

    #[test]
    fn test_merge_with_summarize_flags() {
        let args = Args {
            command: Some(Command::Summarize {
                analysis_dir: PathBuf::from("company_analysis_09992.HK_20260126"),
                no_keep_original: true,
                skip_archive: true,
            }),
            index: Some(PathBuf::from("kb/index.json")),
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        };

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.general.index_path, PathBuf::from("kb/index.json"));
        assert!(!config.general.verbose);
        assert!(!config.archive.keep_original);
        assert!(!config.archive.enabled);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[summarizer]"));
        assert!(toml_str.contains("[archive]"));
    }
}
