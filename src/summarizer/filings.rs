//! Announcement and filing summary.

use crate::config::SummarizerConfig;
use crate::error::Result;
use crate::models::{DateRange, FilingSummary};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Titles kept in [`FilingSummary::sample_titles`].
pub const SAMPLE_TITLES: usize = 10;

/// Exchange timestamps are China Standard Time.
const EXCHANGE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Filing summary plus the issuer name the announcements carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingScan {
    pub summary: FilingSummary,
    /// First non-empty `sec_name` seen.
    pub issuer_name: Option<String>,
}

/// Summarize the run's announcement files.
///
/// Returns `None` when the announcements file is absent or unreadable; the
/// run is still summarized without it.
pub fn load(run_root: &Path, config: &SummarizerConfig) -> Result<Option<FilingScan>> {
    let path = run_root.join(&config.announcements_file);
    if !path.is_file() {
        debug!("No announcements file at {}", path.display());
        return Ok(None);
    }

    let content = std::fs::read(&path)?;
    let records = match parse_records(&content) {
        Ok(records) => records,
        Err(reason) => {
            warn!("Ignoring announcements file {}: {}", path.display(), reason);
            return Ok(None);
        }
    };

    let important_path = run_root.join(&config.important_announcements_file);
    let important_count = if important_path.is_file() {
        let content = std::fs::read(&important_path)?;
        parse_records(&content).map(|r| r.len()).unwrap_or_else(|reason| {
            warn!(
                "Ignoring important announcements file {}: {}",
                important_path.display(),
                reason
            );
            0
        })
    } else {
        0
    };

    let mut scan = summarize(&records);
    scan.summary.important_count = important_count;
    Ok(Some(scan))
}

/// Accepts a bare array or an object wrapping one under `announcements`.
fn parse_records(content: &[u8]) -> std::result::Result<Vec<Value>, String> {
    let value: Value = serde_json::from_slice(content).map_err(|e| format!("invalid JSON: {}", e))?;
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut object) => match object.remove("announcements") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err("expected an array of announcements".to_string()),
        },
        _ => Err("expected an array of announcements".to_string()),
    }
}

/// Count records, find their date range, and keep a few titles.
pub fn summarize(records: &[Value]) -> FilingScan {
    let mut start: Option<NaiveDate> = None;
    let mut end: Option<NaiveDate> = None;

    for date in records.iter().filter_map(|r| r.get("date")).filter_map(parse_date) {
        start = Some(start.map_or(date, |s| s.min(date)));
        end = Some(end.map_or(date, |e| e.max(date)));
    }

    let sample_titles = records
        .iter()
        .filter_map(|r| r.get("title").and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(SAMPLE_TITLES)
        .map(str::to_string)
        .collect();

    let issuer_name = records
        .iter()
        .filter_map(|r| r.get("sec_name").and_then(Value::as_str))
        .map(str::trim)
        .find(|n| !n.is_empty())
        .map(str::to_string);

    FilingScan {
        summary: FilingSummary {
            total_count: records.len(),
            important_count: 0,
            date_range: start.zip(end).map(|(start, end)| DateRange { start, end }),
            sample_titles,
        },
        issuer_name,
    }
}

/// Epoch milliseconds (number or digit string) or a `YYYY-MM-DD` prefix.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n.as_i64().and_then(from_epoch_millis),
        Value::String(s) => {
            let s = s.trim();
            if s.len() >= 10 && s.chars().all(|c| c.is_ascii_digit()) {
                return s.parse().ok().and_then(from_epoch_millis);
            }
            let prefix = s.get(..10)?.replace('/', "-");
            NaiveDate::parse_from_str(&prefix, "%Y-%m-%d").ok()
        }
        _ => None,
    }
}

fn from_epoch_millis(millis: i64) -> Option<NaiveDate> {
    let offset = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS)?;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&offset).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_forms() {
        // 2024-03-26 00:00 in Beijing
        assert_eq!(parse_date(&json!(1711382400000_i64)), Some(date(2024, 3, 26)));
        assert_eq!(parse_date(&json!("1711382400000")), Some(date(2024, 3, 26)));
        assert_eq!(parse_date(&json!("2024-03-26 18:30:00")), Some(date(2024, 3, 26)));
        assert_eq!(parse_date(&json!("2024/03/26")), Some(date(2024, 3, 26)));
        assert_eq!(parse_date(&json!("soon")), None);
        assert_eq!(parse_date(&json!(null)), None);
    }

    #[test]
    fn test_summarize_counts_and_range() {
        let records = vec![
            json!({"title": "Annual Results", "date": "2025-03-26", "sec_name": "泡泡玛特"}),
            json!({"title": "Interim Results", "date": "2024-08-21"}),
            json!({"title": "  ", "date": "bad"}),
        ];

        let scan = summarize(&records);
        assert_eq!(scan.summary.total_count, 3);
        assert_eq!(
            scan.summary.date_range,
            Some(DateRange {
                start: date(2024, 8, 21),
                end: date(2025, 3, 26)
            })
        );
        assert_eq!(scan.summary.sample_titles, vec!["Annual Results", "Interim Results"]);
        assert_eq!(scan.issuer_name.as_deref(), Some("泡泡玛特"));
    }

    #[test]
    fn test_sample_titles_are_capped() {
        let records: Vec<Value> = (0..25).map(|i| json!({"title": format!("t{}", i)})).collect();
        let scan = summarize(&records);
        assert_eq!(scan.summary.sample_titles.len(), SAMPLE_TITLES);
        assert_eq!(scan.summary.date_range, None);
    }

    #[test]
    fn test_load_absent_and_important() {
        let dir = tempfile::tempdir().unwrap();
        let config = SummarizerConfig::default();
        assert_eq!(load(dir.path(), &config).unwrap(), None);

        let processed = dir.path().join("processed_data");
        std::fs::create_dir_all(&processed).unwrap();
        std::fs::write(
            processed.join("all_announcements.json"),
            r#"[{"title": "a", "date": "2024-01-02"}, {"title": "b", "date": "2024-05-06"}]"#,
        )
        .unwrap();
        std::fs::write(processed.join("important_announcements.json"), r#"[{"title": "a"}]"#)
            .unwrap();

        let scan = load(dir.path(), &config).unwrap().unwrap();
        assert_eq!(scan.summary.total_count, 2);
        assert_eq!(scan.summary.important_count, 1);
    }

    #[test]
    fn test_load_unreadable_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("processed_data");
        std::fs::create_dir_all(&processed).unwrap();
        std::fs::write(processed.join("all_announcements.json"), "{\"oops\": 1}").unwrap();

        assert_eq!(load(dir.path(), &SummarizerConfig::default()).unwrap(), None);
    }

    #[test]
    fn test_load_invalid_utf8_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let processed = dir.path().join("processed_data");
        std::fs::create_dir_all(&processed).unwrap();
        let config = SummarizerConfig::default();

        std::fs::write(processed.join("all_announcements.json"), b"[{\"title\": \"\xff\xfe\"}]")
            .unwrap();
        assert_eq!(load(dir.path(), &config).unwrap(), None);

        // A garbled important file only zeroes the important count.
        std::fs::write(processed.join("all_announcements.json"), r#"[{"title": "a"}]"#).unwrap();
        std::fs::write(processed.join("important_announcements.json"), b"[\xff]").unwrap();
        let scan = load(dir.path(), &config).unwrap().unwrap();
        assert_eq!(scan.summary.total_count, 1);
        assert_eq!(scan.summary.important_count, 0);
    }
}
