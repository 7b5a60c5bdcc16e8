//! Read-only queries over the company index and summary records.

use crate::config::QueryConfig;
use crate::error::{KbError, Result};
use crate::fsutil::write_atomically;
use crate::index::{FileBackend, IndexBackend, IndexStore, Snapshot};
use crate::models::{FileStatus, IndexEntry, SummaryRecord, LEARNING_MARKDOWN};
use crate::report::generator::generate_learning_summary;
use crate::run_dir::RunId;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Shown in a comparison cell when a company does not report a metric.
pub const MISSING_MARKER: &str = "N/A";

/// A summary record together with the index row that points at it.
#[derive(Debug, Clone)]
pub struct LoadedRecord {
    pub entry: IndexEntry,
    /// Inventory statuses resolved against the current filesystem.
    pub record: SummaryRecord,
    /// Archive file, if one exists on disk.
    pub archive: Option<PathBuf>,
}

impl LoadedRecord {
    /// Number of inventoried files with the given status.
    pub fn count_with_status(&self, status: FileStatus) -> usize {
        self.record
            .file_inventory
            .values()
            .filter(|e| e.status == status)
            .count()
    }
}

/// A company that could not be compared, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unavailable {
    pub company_code: String,
    pub reason: String,
}

/// Latest-year metrics of several companies, aligned by metric name.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub companies: Vec<LoadedRecord>,
    /// Union of every compared company's latest-year metric names.
    pub metrics: Vec<String>,
    pub unavailable: Vec<Unavailable>,
}

impl Comparison {
    /// Year whose metrics are compared for `company`.
    pub fn latest_year(&self, company: usize) -> Option<i32> {
        self.companies
            .get(company)
            .and_then(|c| c.record.financial_summary.latest_metrics())
            .map(|(year, _)| year)
    }

    /// Display value of `metric` for `company`, or [`MISSING_MARKER`].
    pub fn value(&self, company: usize, metric: &str) -> &str {
        self.companies
            .get(company)
            .and_then(|c| c.record.financial_summary.latest_metrics())
            .and_then(|(_, metrics)| metrics.get(metric))
            .map(String::as_str)
            .unwrap_or(MISSING_MARKER)
    }
}

/// Query engine over an index store.
pub struct QueryEngine<B: IndexBackend = FileBackend> {
    store: IndexStore<B>,
    config: QueryConfig,
}

impl<B: IndexBackend> QueryEngine<B> {
    pub fn new(store: IndexStore<B>, config: QueryConfig) -> Self {
        Self { store, config }
    }

    /// Every indexed company, oldest analysis first.
    pub fn list(&self) -> Result<Snapshot> {
        self.store.all()
    }

    /// Load the stored knowledge for one company.
    pub fn load(&self, company_code: &str) -> Result<LoadedRecord> {
        let entry = self
            .store
            .get(company_code)?
            .ok_or_else(|| KbError::NotFound(company_code.trim().to_string()))?;
        load_record(entry)
    }

    /// Compare the latest-year metrics of two or more companies.
    ///
    /// Companies that cannot be loaded are listed in
    /// [`Comparison::unavailable`] and the rest are still compared. Only a
    /// failure to read the index itself aborts the comparison.
    pub fn compare(&self, company_codes: &[String]) -> Result<Comparison> {
        let mut seen = HashSet::new();
        let codes: Vec<&String> = company_codes
            .iter()
            .filter(|c| seen.insert(crate::company::normalize_key(c)))
            .collect();

        if codes.len() < 2 {
            return Err(KbError::InvalidArgument(
                "compare needs at least 2 distinct company codes".to_string(),
            ));
        }

        let mut companies = Vec::new();
        let mut unavailable = Vec::new();
        for code in codes {
            match self.load(code) {
                Ok(loaded) => companies.push(loaded),
                Err(e @ KbError::IndexRead { .. }) => return Err(e),
                Err(e) => {
                    warn!("Skipping {} in comparison: {}", code, e);
                    unavailable.push(Unavailable {
                        company_code: code.trim().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let metrics: BTreeSet<String> = companies
            .iter()
            .filter_map(|c| c.record.financial_summary.latest_metrics())
            .flat_map(|(_, metrics)| metrics.keys().cloned())
            .collect();

        debug!(
            "Comparing {} companies over {} metrics",
            companies.len(),
            metrics.len()
        );

        Ok(Comparison {
            companies,
            metrics: metrics.into_iter().collect(),
            unavailable,
        })
    }

    /// Write `LEARNING_SUMMARY.md` into the company's run directory.
    pub fn summary(&self, company_code: &str) -> Result<PathBuf> {
        let loaded = self.load(company_code)?;
        let path = loaded.entry.analysis_dir.join(LEARNING_MARKDOWN);

        let content = generate_learning_summary(&loaded, self.config.sample_titles);
        write_atomically(&path, content.as_bytes())?;

        info!("Wrote learning summary {}", path.display());
        Ok(path)
    }

    /// Companies whose code or name contains `keyword`, newest first.
    pub fn search(&self, keyword: &str) -> Result<Vec<IndexEntry>> {
        self.store.find(keyword)
    }
}

/// Read the record an entry points at and resolve its file statuses.
pub fn load_record(entry: IndexEntry) -> Result<LoadedRecord> {
    let summary_path = &entry.summary_file_path;
    let unreadable = |reason: String| KbError::RecordUnreadable {
        code: entry.company_code.clone(),
        path: summary_path.clone(),
        reason,
    };

    let content = match std::fs::read(summary_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(KbError::RecordMissing {
                code: entry.company_code.clone(),
                path: summary_path.clone(),
            })
        }
        Err(e) => return Err(unreadable(e.to_string())),
    };

    let mut record: SummaryRecord =
        serde_json::from_slice(&content).map_err(|e| unreadable(e.to_string()))?;

    let archive = archive_on_disk(&entry);
    resolve_statuses(&mut record, &entry.analysis_dir, archive.is_some());

    Ok(LoadedRecord {
        entry,
        record,
        archive,
    })
}

fn archive_on_disk(entry: &IndexEntry) -> Option<PathBuf> {
    let conventional = RunId::from_dir(&entry.analysis_dir)
        .ok()
        .map(|run| entry.analysis_dir.join(run.archive_name()));

    entry
        .archive_path
        .iter()
        .cloned()
        .chain(conventional)
        .find(|p| p.is_file())
}

/// Mark each inventoried file present, archived, or missing.
pub fn resolve_statuses(record: &mut SummaryRecord, run_dir: &Path, archive_exists: bool) {
    for entry in record.file_inventory.values_mut() {
        entry.status = if run_dir.join(&entry.path).exists() {
            FileStatus::Present
        } else if entry.raw_input && archive_exists {
            FileStatus::Archived
        } else {
            FileStatus::Missing
        };
    }
}
