//! Data models for the knowledge base.
//!
//! This module contains the summary record written for each analysis run,
//! the index entry that points at it, and the archive artifact that holds
//! the run's raw inputs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Version written into every summary record.
pub const SCHEMA_VERSION: &str = "1.0";

/// Structured summary file name inside a run directory.
pub const SUMMARY_JSON: &str = "knowledge_summary.json";
/// Readable summary file name inside a run directory.
pub const SUMMARY_MARKDOWN: &str = "KNOWLEDGE_SUMMARY.md";
/// Condensed learning summary file name inside a run directory.
pub const LEARNING_MARKDOWN: &str = "LEARNING_SUMMARY.md";

/// Who the record is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Exchange-qualified code, e.g. `09992.HK`.
    pub company_code: String,
    pub company_name: String,
    /// Market classification, e.g. `Hong Kong` or `A-share`.
    pub market: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

/// Fiscal years and the key metrics reported for each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialSummary {
    /// Strictly increasing, duplicate-free.
    pub years_covered: Vec<i32>,
    /// Year -> metric name -> display string.
    pub key_metrics: BTreeMap<i32, BTreeMap<String, String>>,
    /// Annual report PDFs found under the raw-input tree.
    #[serde(default)]
    pub annual_reports_count: usize,
    /// Financial data file the figures were read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl FinancialSummary {
    /// The most recent year that has metrics, with those metrics.
    pub fn latest_metrics(&self) -> Option<(i32, &BTreeMap<String, String>)> {
        self.key_metrics
            .iter()
            .rev()
            .find(|(_, metrics)| !metrics.is_empty())
            .map(|(year, metrics)| (*year, metrics))
    }

    /// `2022-2024` style span, or `None` when no years are covered.
    pub fn year_span(&self) -> Option<String> {
        match (self.years_covered.first(), self.years_covered.last()) {
            (Some(first), Some(last)) if first == last => Some(first.to_string()),
            (Some(first), Some(last)) => Some(format!("{}-{}", first, last)),
            _ => None,
        }
    }
}

/// What the narrative report says, in brief.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeSummary {
    pub report_exists: bool,
    /// Report size in bytes.
    pub report_size: u64,
    pub key_investment_points: Vec<String>,
    pub sections: Vec<String>,
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Announcements and filings ingested by the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingSummary {
    pub total_count: usize,
    pub important_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub sample_titles: Vec<String>,
}

/// Whether an inventoried file can still be read from the run directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// On disk at its recorded path.
    #[default]
    Present,
    /// Gone from disk, but held by the run's archive.
    Archived,
    /// Gone from disk with no archive to recover it from.
    Missing,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Present => write!(f, "present"),
            FileStatus::Archived => write!(f, "archived"),
            FileStatus::Missing => write!(f, "missing"),
        }
    }
}

/// One file of the run, keyed by its role in [`SummaryRecord::file_inventory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Path relative to the run directory, `/`-separated.
    pub path: String,
    pub size: u64,
    /// Lies under the raw-input root, so it may have been archived.
    pub raw_input: bool,
    #[serde(default)]
    pub status: FileStatus,
}

/// Bookkeeping for a summary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub created_at: DateTime<Utc>,
    pub schema_version: String,
    /// Run directory the record was built from.
    pub source_dir: String,
    pub analysis_date: NaiveDate,
}

/// Canonical digest of one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub identity: Identity,
    pub financial_summary: FinancialSummary,
    pub narrative_summary: NarrativeSummary,
    /// `None` when the run produced no announcement data.
    pub filing_summary: Option<FilingSummary>,
    pub file_inventory: BTreeMap<String, InventoryEntry>,
    pub metadata: RecordMetadata,
}

impl SummaryRecord {
    pub fn total_files(&self) -> usize {
        self.file_inventory.len()
    }

    pub fn total_size(&self) -> u64 {
        self.file_inventory.values().map(|e| e.size).sum()
    }
}

/// One row of the global company index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Exchange-qualified display code; the registry key is its normalized form.
    pub company_code: String,
    pub company_name: String,
    pub market: String,
    pub analysis_date: NaiveDate,
    pub analysis_dir: PathBuf,
    pub summary_file_path: PathBuf,
    pub report_file_path: PathBuf,
    #[serde(default)]
    pub years_covered: Vec<i32>,
    #[serde(default)]
    pub key_investment_points: Vec<String>,
    #[serde(default)]
    pub file_count: usize,
    #[serde(default)]
    pub total_size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
}

impl IndexEntry {
    /// Registry key for this entry.
    pub fn key(&self) -> String {
        crate::company::normalize_key(&self.company_code)
    }
}

/// Compressed copy of a run's raw-input subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveArtifact {
    pub path: PathBuf,
    /// Sum of the archived files' sizes, in bytes.
    pub original_size: u64,
    /// Size of the archive file, in bytes.
    pub compressed_size: u64,
    pub file_count: usize,
    /// The uncompressed subtree was deleted after verification.
    pub source_removed: bool,
}

impl ArchiveArtifact {
    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.original_size, self.compressed_size)
    }
}

/// Percentage saved by compression; 0 for an empty source.
pub fn reduction_percent(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - compressed as f64 / original as f64) * 100.0
}

/// Bytes as megabytes with two decimals.
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}
