//! Summarizer for analysis runs.
//!
//! Turns one `company_analysis_<code>_<YYYYMMDD>` directory into a
//! [`SummaryRecord`], writes `knowledge_summary.json` and
//! `KNOWLEDGE_SUMMARY.md` next to the run's other outputs, and builds the
//! [`IndexEntry`] that points at them.

pub mod extract;
pub mod financial;
pub mod filings;

use crate::archive::{ArchiveOptions, Archiver};
use crate::company;
use crate::config::Config;
use crate::error::{KbError, Result};
use crate::fsutil::write_atomically;
use crate::index::{IndexBackend, IndexStore};
use crate::models::{
    ArchiveArtifact, Identity, IndexEntry, NarrativeSummary, RecordMetadata, SummaryRecord,
    SCHEMA_VERSION, SUMMARY_JSON, SUMMARY_MARKDOWN,
};
use crate::report::generator::generate_knowledge_summary;
use crate::run_dir::RunId;
use crate::scanner::{FileScanner, ScanConfig};
use chrono::{DateTime, Utc};
use extract::ExtractOptions;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A written summary and where it lives.
#[derive(Debug, Clone)]
pub struct SummaryOutput {
    pub run: RunId,
    /// Canonical run directory.
    pub run_dir: PathBuf,
    pub record: SummaryRecord,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}

/// Builds summary records from analysis run directories.
pub struct Summarizer<'a> {
    config: &'a Config,
}

impl<'a> Summarizer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Summarize a run and write both renderings into its directory.
    pub fn summarize(&self, run_dir: &Path) -> Result<SummaryOutput> {
        let run_dir = run_dir.canonicalize()?;
        let (run, record) = self.build_record(&run_dir, Utc::now())?;

        let json_path = run_dir.join(SUMMARY_JSON);
        let mut json = serde_json::to_string_pretty(&record)?;
        json.push('\n');
        write_atomically(&json_path, json.as_bytes())?;
        debug!("Wrote {}", json_path.display());

        let markdown_path = run_dir.join(SUMMARY_MARKDOWN);
        write_atomically(&markdown_path, generate_knowledge_summary(&record).as_bytes())?;
        debug!("Wrote {}", markdown_path.display());

        info!(
            "Summarized {} ({} files, {} theses)",
            record.identity.company_code,
            record.total_files(),
            record.narrative_summary.key_investment_points.len()
        );

        Ok(SummaryOutput {
            run,
            run_dir,
            record,
            json_path,
            markdown_path,
        })
    }

    /// Build the record for a run without writing anything.
    pub fn build_record(
        &self,
        run_dir: &Path,
        created_at: DateTime<Utc>,
    ) -> Result<(RunId, SummaryRecord)> {
        let run = RunId::from_dir(run_dir)?;
        let settings = &self.config.summarizer;
        debug!("Summarizing run {} in {}", run, run_dir.display());

        let financial_summary = financial::load(run_dir, settings)?;
        let narrative_summary = self.narrative(run_dir)?;
        let filings = filings::load(run_dir, settings)?;

        let scanner = FileScanner::new(run_dir.to_path_buf(), ScanConfig::from(self.config));
        let file_inventory = scanner.inventory()?;

        let identity = self.identity(
            run_dir,
            &run,
            filings.as_ref().and_then(|f| f.issuer_name.as_deref()),
        );

        let record = SummaryRecord {
            identity,
            financial_summary,
            narrative_summary,
            filing_summary: filings.map(|f| f.summary),
            file_inventory,
            metadata: RecordMetadata {
                created_at,
                schema_version: SCHEMA_VERSION.to_string(),
                source_dir: run_dir.display().to_string(),
                analysis_date: run.date,
            },
        };

        Ok((run, record))
    }

    fn narrative(&self, run_dir: &Path) -> Result<NarrativeSummary> {
        let settings = &self.config.summarizer;
        let report_path = run_dir.join(&settings.report_file);

        if !report_path.is_file() {
            warn!("No analysis report at {}", report_path.display());
            return Ok(NarrativeSummary::default());
        }

        let bytes = std::fs::read(&report_path)?;
        let text = String::from_utf8_lossy(&bytes);
        let extracted = extract::extract(
            &text,
            &ExtractOptions {
                thesis_markers: &settings.thesis_markers,
                max_sections: settings.max_sections,
                max_theses: settings.max_theses,
            },
        );

        if extracted.theses.is_empty() {
            debug!("No investment points block found in {}", report_path.display());
        }

        Ok(NarrativeSummary {
            report_exists: true,
            report_size: bytes.len() as u64,
            key_investment_points: extracted.theses,
            sections: extracted.sections,
        })
    }

    fn identity(&self, run_dir: &Path, run: &RunId, issuer_name: Option<&str>) -> Identity {
        let company_code = company::qualify(&run.code);
        let info = read_company_info(&run_dir.join(&self.config.summarizer.company_info_file));
        let field = |name: &str| {
            info.as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let company_name = field("company_name")
            .or_else(|| field("sec_name"))
            .or_else(|| issuer_name.map(str::to_string))
            .unwrap_or_else(|| company_code.clone());
        let market = field("market").unwrap_or_else(|| company::market_for(&company_code).to_string());

        Identity {
            company_name,
            market,
            industry: field("industry"),
            company_code,
        }
    }
}

fn read_company_info(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&content) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => {
            warn!("Ignoring {}: not a JSON object", path.display());
            None
        }
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            None
        }
    }
}

/// Index row for a written summary.
///
/// `archive` is the artifact created in this invocation; without one, an
/// archive left by an earlier run of the same directory is still recorded.
pub fn index_entry(
    output: &SummaryOutput,
    archive: Option<&ArchiveArtifact>,
    config: &Config,
) -> IndexEntry {
    let record = &output.record;
    let archive_path = match archive {
        Some(artifact) => Some(artifact.path.clone()),
        None => Some(output.run_dir.join(output.run.archive_name())).filter(|p| p.is_file()),
    };

    IndexEntry {
        company_code: record.identity.company_code.clone(),
        company_name: record.identity.company_name.clone(),
        market: record.identity.market.clone(),
        analysis_date: record.metadata.analysis_date,
        analysis_dir: output.run_dir.clone(),
        summary_file_path: output.json_path.clone(),
        report_file_path: output.run_dir.join(&config.summarizer.report_file),
        years_covered: record.financial_summary.years_covered.clone(),
        key_investment_points: record.narrative_summary.key_investment_points.clone(),
        file_count: record.total_files(),
        total_size_bytes: record.total_size(),
        archive_path,
    }
}

/// What [`summarize_and_index`] did to one run.
#[derive(Debug)]
pub struct Ingested {
    pub output: SummaryOutput,
    /// Archive created by this invocation.
    pub artifact: Option<ArchiveArtifact>,
    /// Set when archiving failed; the run is then only partially summarized.
    pub archive_error: Option<KbError>,
    pub entry: IndexEntry,
}

/// Summarize a run, archive its raw inputs, and record it in the index.
///
/// Both summary files are written before the index is touched. An archive
/// failure is returned in [`Ingested::archive_error`] and the run is still
/// indexed; summary and index failures are errors.
pub fn summarize_and_index<B: IndexBackend>(
    config: &Config,
    run_dir: &Path,
    store: &IndexStore<B>,
    show_progress: bool,
) -> Result<Ingested> {
    let output = Summarizer::new(config).summarize(run_dir)?;

    let mut archive_error = None;
    let artifact = if config.archive.enabled {
        let mut options = ArchiveOptions::from(config);
        options.show_progress = show_progress;

        match Archiver::new(options).archive(&output.run_dir, &output.run) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("Archiving {} failed: {}", output.run_dir.display(), e);
                archive_error = Some(e);
                None
            }
        }
    } else {
        debug!("Archiving disabled");
        None
    };

    let entry = index_entry(&output, artifact.as_ref(), config);
    store.upsert(entry.clone())?;
    info!("Indexed {} in {}", entry.company_code, store.location().display());

    Ok(Ingested {
        output,
        artifact,
        archive_error,
        entry,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::index::tests::MemoryBackend;
    use chrono::{NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;
    use std::fs;

    pub(crate) const REPORT: &str = "\
# 泡泡玛特深度分析

## 一、执行摘要

### 核心投资逻辑

1. **全球化IP运营平台**：Labubu 与 Molly 驱动复购
2. **海外业务高速增长**：海外收入翻倍
3. **经营杠杆释放**：门店效率提升

### 主要风险

- 潮流消费退潮

## 二、财务分析

## 三、估值
";

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// A complete run directory for Pop Mart, as the analysis pipeline leaves it.
    pub(crate) fn fixture_run(parent: &Path) -> PathBuf {
        let run = parent.join("company_analysis_09992_20260126");
        write(&run, "analysis_report.md", REPORT.as_bytes());
        write(
            &run,
            "processed_data/company_info.json",
            r#"{"stock_code": "09992", "company_name": "泡泡玛特", "industry": "Consumer"}"#
                .as_bytes(),
        );
        write(
            &run,
            "processed_data/financial_data_with_source.json",
            br#"{
                "2023_annual": {"year": 2023, "report_type": "annual",
                                "indicators": {"revenue": {"value": 6301.0}, "roe": {"value": 16.1}}},
                "2024_annual": {"year": 2024, "report_type": "annual",
                                "indicators": {"revenue": {"value": 13038.0}, "roe": {"value": 34.6},
                                               "net_profit": {"value": 3125.0}}},
                "2025_semi": {"year": 2025, "report_type": "semi",
                              "indicators": {"revenue": {"value": 13876.0}}}
            }"#,
        );
        write(
            &run,
            "processed_data/all_announcements.json",
            br#"[{"title": "2024 Annual Results", "date": "2025-03-26", "sec_name": "POP MART"},
                 {"title": "Interim Report", "date": 1724198400000}]"#,
        );
        write(&run, "raw_data/annual_reports/09992_2023_annual.pdf", b"%PDF-2023");
        write(&run, "raw_data/annual_reports/09992_2024_annual.pdf", b"%PDF-2024");
        write(&run, "raw_data/announcements/notice.txt", b"");
        run
    }

    #[test]
    fn test_summarize_pop_mart_run() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = fixture_run(dir.path());
        let config = Config::default();

        let output = Summarizer::new(&config).summarize(&run_dir).unwrap();
        let record = &output.record;

        assert_eq!(record.identity.company_code, "09992.HK");
        assert_eq!(record.identity.company_name, "泡泡玛特");
        assert_eq!(record.identity.market, "Hong Kong");
        assert_eq!(record.identity.industry.as_deref(), Some("Consumer"));

        assert_eq!(record.financial_summary.years_covered, vec![2023, 2024, 2025]);
        assert_eq!(record.financial_summary.key_metrics[&2024]["roe"], "34.60%");
        assert_eq!(record.financial_summary.annual_reports_count, 2);

        assert_eq!(
            record.narrative_summary.key_investment_points,
            vec!["全球化IP运营平台", "海外业务高速增长", "经营杠杆释放"]
        );
        assert_eq!(
            record.narrative_summary.sections,
            vec!["一、执行摘要", "二、财务分析", "三、估值"]
        );

        let filings = record.filing_summary.as_ref().unwrap();
        assert_eq!(filings.total_count, 2);
        assert_eq!(
            filings.date_range.map(|r| r.start),
            NaiveDate::from_ymd_opt(2024, 8, 21)
        );

        assert_eq!(
            record.file_inventory["annual report 2024"].path,
            "raw_data/annual_reports/09992_2024_annual.pdf"
        );
        assert_eq!(record.file_inventory["announcements notice"].size, 0);
        assert!(record.file_inventory.values().all(|e| run_dir.join(&e.path).exists()));

        assert_eq!(record.metadata.analysis_date, NaiveDate::from_ymd_opt(2026, 1, 26).unwrap());
        assert!(output.json_path.is_file());
        assert!(output.markdown_path.is_file());

        let stored: SummaryRecord =
            serde_json::from_str(&fs::read_to_string(&output.json_path).unwrap()).unwrap();
        assert_eq!(&stored, record);
    }

    #[test]
    fn test_summarize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = fixture_run(dir.path());
        let config = Config::default();
        let summarizer = Summarizer::new(&config);

        let first = summarizer.summarize(&run_dir).unwrap();
        let first_json = fs::read_to_string(&first.json_path).unwrap();
        let second = summarizer.summarize(&run_dir).unwrap();
        let second_json = fs::read_to_string(&second.json_path).unwrap();

        let strip = |json: &str| {
            let mut value: Value = serde_json::from_str(json).unwrap();
            value["metadata"]
                .as_object_mut()
                .unwrap()
                .remove("created_at");
            value
        };
        assert_eq!(strip(&first_json), strip(&second_json));
        assert_eq!(first.record.file_inventory, second.record.file_inventory);
    }

    #[test]
    fn test_build_record_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = fixture_run(dir.path()).canonicalize().unwrap();
        let config = Config::default();
        let at = Utc.with_ymd_and_hms(2026, 1, 26, 9, 30, 0).unwrap();

        let (_, a) = Summarizer::new(&config).build_record(&run_dir, at).unwrap();
        let (_, b) = Summarizer::new(&config).build_record(&run_dir, at).unwrap();
        assert_eq!(
            serde_json::to_string_pretty(&a).unwrap(),
            serde_json::to_string_pretty(&b).unwrap()
        );
    }

    #[test]
    fn test_malformed_run_name() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("analysis_09992");
        fs::create_dir_all(&bad).unwrap();

        let config = Config::default();
        let err = Summarizer::new(&config).summarize(&bad).unwrap_err();
        assert!(matches!(err, crate::error::KbError::MalformedRun { .. }));
    }

    #[test]
    fn test_sparse_run_yields_empty_parts() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("company_analysis_600519_20250101");
        fs::create_dir_all(&run_dir).unwrap();

        let config = Config::default();
        let output = Summarizer::new(&config).summarize(&run_dir).unwrap();
        let record = &output.record;

        assert_eq!(record.identity.company_code, "600519.SH");
        assert_eq!(record.identity.company_name, "600519.SH");
        assert_eq!(record.identity.market, "A-share");
        assert!(record.financial_summary.years_covered.is_empty());
        assert!(!record.narrative_summary.report_exists);
        assert!(record.filing_summary.is_none());
        assert!(record.file_inventory.is_empty());
    }

    #[test]
    fn test_index_entry_from_output() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = fixture_run(dir.path());
        let config = Config::default();
        let output = Summarizer::new(&config).summarize(&run_dir).unwrap();

        let entry = index_entry(&output, None, &config);
        assert_eq!(entry.key(), "09992");
        assert_eq!(entry.company_code, "09992.HK");
        assert_eq!(entry.years_covered, vec![2023, 2024, 2025]);
        assert_eq!(entry.file_count, output.record.total_files());
        assert_eq!(entry.report_file_path, output.run_dir.join("analysis_report.md"));
        assert_eq!(entry.archive_path, None);
    }

    #[test]
    fn test_summarize_and_index_archives_then_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = fixture_run(dir.path());
        let mut config = Config::default();
        config.archive.keep_original = false;
        let store = IndexStore::with_backend(MemoryBackend::default());

        let ingested = summarize_and_index(&config, &run_dir, &store, false).unwrap();
        let artifact = ingested.artifact.as_ref().unwrap();
        assert!(ingested.archive_error.is_none());
        assert!(artifact.source_removed);
        assert!(!run_dir.join("raw_data").exists());

        let indexed = store.get("09992.HK").unwrap().unwrap();
        assert_eq!(indexed.archive_path.as_deref(), Some(artifact.path.as_path()));
        assert_eq!(indexed, ingested.entry);
    }

    #[test]
    fn test_archive_failure_still_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = fixture_run(dir.path());
        let mut config = Config::default();
        config.archive.keep_original = false;
        let store = IndexStore::with_backend(MemoryBackend::default());

        // A directory squatting on the archive name makes the final rename fail.
        let archive_name = RunId::from_dir(&run_dir).unwrap().archive_name();
        write(&run_dir, &format!("{}/occupied", archive_name), b"x");

        let ingested = summarize_and_index(&config, &run_dir, &store, false).unwrap();
        assert!(ingested.artifact.is_none());
        assert!(ingested.archive_error.is_some());

        assert!(run_dir.join("raw_data/annual_reports/09992_2024_annual.pdf").is_file());
        assert!(run_dir.join("raw_data/announcements/notice.txt").is_file());
        assert!(ingested.output.json_path.is_file());

        let indexed = store.get("09992").unwrap().unwrap();
        assert_eq!(indexed.summary_file_path, ingested.output.json_path);
        assert_eq!(indexed.archive_path, None);
    }

    #[test]
    fn test_summary_is_written_before_index_update() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = fixture_run(dir.path());
        let mut config = Config::default();
        config.archive.enabled = false;
        let store = IndexStore::with_backend(MemoryBackend {
            fail_writes: true,
            ..MemoryBackend::default()
        });

        let err = summarize_and_index(&config, &run_dir, &store, false).unwrap_err();
        assert!(matches!(err, KbError::IndexWrite { .. }));
        assert!(run_dir.join(SUMMARY_JSON).is_file());
        assert!(run_dir.join(SUMMARY_MARKDOWN).is_file());
        assert_eq!(store.get("09992").unwrap(), None);
    }
}
