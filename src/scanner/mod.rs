//! File scanner for building a run's file inventory.
//!
//! Walks an analysis directory in lexicographic order, skips the files the
//! knowledge base writes itself, and infers a logical role for every file.

use crate::error::Result;
use crate::fsutil::TEMP_PREFIX;
use crate::models::{FileStatus, InventoryEntry, LEARNING_MARKDOWN, SUMMARY_JSON, SUMMARY_MARKDOWN};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Raw-input subtree, relative to the run root.
    pub raw_dir: String,
    /// Annual report directory, relative to the run root.
    pub annual_reports_dir: String,
    /// Narrative report, relative to the run root.
    pub report_file: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            raw_dir: "raw_data".to_string(),
            annual_reports_dir: "raw_data/annual_reports".to_string(),
            report_file: "analysis_report.md".to_string(),
        }
    }
}

impl From<&crate::config::Config> for ScanConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            raw_dir: config.archive.raw_dir.clone(),
            annual_reports_dir: config.summarizer.annual_reports_dir.clone(),
            report_file: config.summarizer.report_file.clone(),
        }
    }
}

/// Scanned file information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Relative path from the run root, `/`-separated.
    pub path: String,
    /// File size in bytes
    pub size: u64,
    pub raw_input: bool,
}

/// File scanner for one analysis run.
pub struct FileScanner {
    config: ScanConfig,
    run_root: PathBuf,
}

impl FileScanner {
    /// Create a new file scanner.
    pub fn new(run_root: PathBuf, config: ScanConfig) -> Self {
        Self { config, run_root }
    }

    /// Scan for all inventoried files, in lexicographic path order.
    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.run_root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with(TEMP_PREFIX));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", self.run_root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let rel = relative_path(&self.run_root, entry.path());
            if self.is_excluded(&rel) {
                debug!("Not inventoried: {}", rel);
                continue;
            }

            let size = entry
                .metadata()
                .map(|m| m.len())
                .map_err(std::io::Error::from)?;
            let raw_input = self.is_raw_input(&rel);
            files.push(ScannedFile {
                path: rel,
                size,
                raw_input,
            });
        }

        Ok(files)
    }

    /// Build the role -> file mapping for a summary record.
    pub fn inventory(&self) -> Result<BTreeMap<String, InventoryEntry>> {
        let mut inventory = BTreeMap::new();

        for file in self.scan()? {
            let mut role = infer_role(&file.path, &self.config);
            if inventory.contains_key(&role) {
                role = format!("{} [{}]", role, file.path);
            }
            inventory.insert(
                role,
                InventoryEntry {
                    path: file.path,
                    size: file.size,
                    raw_input: file.raw_input,
                    status: FileStatus::Present,
                },
            );
        }

        Ok(inventory)
    }

    /// Check if a path lies under the raw-input root.
    pub fn is_raw_input(&self, rel: &str) -> bool {
        rel.strip_prefix(self.config.raw_dir.trim_end_matches('/'))
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Files the knowledge base writes into the run root itself.
    fn is_excluded(&self, rel: &str) -> bool {
        if rel.contains('/') {
            return false;
        }
        rel == SUMMARY_JSON
            || rel == SUMMARY_MARKDOWN
            || rel == LEARNING_MARKDOWN
            || is_archive_name(rel)
    }
}

/// Whether a file name looks like a raw-data archive artifact.
pub fn is_archive_name(name: &str) -> bool {
    name.ends_with(".tar.gz") && name.contains("_raw_data_")
}

/// Relative `/`-separated path of `path` under `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// First plausible four-digit year in a file name.
pub fn extract_year(name: &str) -> Option<i32> {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let re = YEAR.get_or_init(|| {
        Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:\D|$)").expect("valid year regex")
    });
    re.captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Infer the logical role of a file from its directory and name.
pub fn infer_role(rel: &str, config: &ScanConfig) -> String {
    let path = Path::new(rel);
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or(rel);
    let stem = humanize(path.file_stem().and_then(|s| s.to_str()).unwrap_or(name));

    let annual_prefix = format!("{}/", config.annual_reports_dir.trim_end_matches('/'));
    if rel.starts_with(&annual_prefix) {
        return match extract_year(name) {
            Some(year) => format!("annual report {}", year),
            None => format!("annual report {}", stem),
        };
    }

    let parts: Vec<&str> = rel.split('/').collect();
    match parts.as_slice() {
        [single] if *single == config.report_file => "analysis report".to_string(),
        [_] => format!("file {}", stem),
        [top, _] if *top == config.raw_dir => format!("raw {}", stem),
        [top, sub, ..] if *top == config.raw_dir => format!("{} {}", humanize(sub), stem),
        [top, ..] if *top == "processed_data" => format!("processed {}", stem),
        [top, ..] => format!("{} {}", humanize(top), stem),
        [] => stem,
    }
}

fn humanize(s: &str) -> String {
    s.replace(['_', '-'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_infer_role() {
        let config = ScanConfig::default();
        assert_eq!(
            infer_role("raw_data/annual_reports/09992_2024_annual.pdf", &config),
            "annual report 2024"
        );
        assert_eq!(infer_role("analysis_report.md", &config), "analysis report");
        assert_eq!(
            infer_role("raw_data/announcements/all_announcements.json", &config),
            "announcements all announcements"
        );
        assert_eq!(
            infer_role("processed_data/company_info.json", &config),
            "processed company info"
        );
        assert_eq!(infer_role("raw_data/notes.txt", &config), "raw notes");
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("09992_2024_annual.pdf"), Some(2024));
        assert_eq!(extract_year("report2023.pdf"), Some(2023));
        assert_eq!(extract_year("id_120245.pdf"), None);
        assert_eq!(extract_year("notes.pdf"), None);
    }

    #[test]
    fn test_scan_is_sorted_and_skips_own_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "raw_data/b.txt", b"bb");
        write(root, "raw_data/a/z.txt", b"z");
        write(root, "analysis_report.md", b"# r");
        write(root, SUMMARY_JSON, b"{}");
        write(root, SUMMARY_MARKDOWN, b"#");
        write(root, "09992.HK_raw_data_20260126.tar.gz", b"gz");

        let scanner = FileScanner::new(root.to_path_buf(), ScanConfig::default());
        let files = scanner.scan().unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(
            paths,
            vec!["analysis_report.md", "raw_data/a/z.txt", "raw_data/b.txt"]
        );
        assert!(!files[0].raw_input);
        assert!(files[1].raw_input);
        assert_eq!(files[2].size, 2);
    }

    #[test]
    fn test_inventory_disambiguates_roles() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "raw_data/annual_reports/2024_annual.pdf", b"pdf");
        write(root, "raw_data/annual_reports/2024_annual.txt", b"txt!");

        let scanner = FileScanner::new(root.to_path_buf(), ScanConfig::default());
        let inventory = scanner.inventory().unwrap();

        assert_eq!(inventory.len(), 2);
        assert_eq!(
            inventory["annual report 2024"].path,
            "raw_data/annual_reports/2024_annual.pdf"
        );
        let second = "annual report 2024 [raw_data/annual_reports/2024_annual.txt]";
        assert_eq!(inventory[second].size, 4);
    }

    #[test]
    fn test_is_raw_input_requires_directory_boundary() {
        let scanner = FileScanner::new(PathBuf::from("/run"), ScanConfig::default());
        assert!(scanner.is_raw_input("raw_data/x.pdf"));
        assert!(!scanner.is_raw_input("raw_data_notes.md"));
    }
}
