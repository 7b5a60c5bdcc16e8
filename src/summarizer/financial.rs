//! Financial data summary.
//!
//! Reads the figures the extraction pipeline already computed. Two shapes
//! are accepted:
//!
//! ```text
//! {"2024_annual": {"year": 2024, "report_type": "annual",
//!                  "indicators": {"revenue": {"value": 130.5, "source": {...}}}}}
//! {"2024": {"revenue": 130.5, "roe": 18.2}}
//! ```
//!
//! When several reports cover one year the annual report wins, then q3,
//! semi, q1.

use crate::config::SummarizerConfig;
use crate::error::{KbError, Result};
use crate::models::FinancialSummary;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Metrics displayed as percentages.
const PERCENT_METRICS: &[&str] = &[
    "gross_margin",
    "net_margin",
    "roe",
    "asset_liability_ratio",
    "毛利率",
    "净利率",
    "净资产收益率",
    "资产负债率",
];

fn report_priority(report_type: &str) -> u8 {
    match report_type {
        "annual" => 0,
        "q3" => 1,
        "semi" => 2,
        "q1" => 3,
        _ => 4,
    }
}

/// Load the first configured financial data file from a run directory.
///
/// An absent file yields an empty summary; a file that exists but cannot be
/// read as a JSON object is a malformed run.
pub fn load(run_root: &Path, config: &SummarizerConfig) -> Result<FinancialSummary> {
    let mut summary = match config
        .financial_data_files
        .iter()
        .find(|rel| run_root.join(rel).is_file())
    {
        Some(rel) => {
            let path = run_root.join(rel);
            debug!("Reading financial data from {}", path.display());

            let content = std::fs::read(&path)?;
            let value: Value = serde_json::from_slice(&content)
                .map_err(|e| KbError::malformed(&path, format!("invalid JSON: {}", e)))?;

            let mut summary = summarize(&value, &config.key_metrics)
                .map_err(|reason| KbError::malformed(&path, reason))?;
            summary.source_file = Some(rel.clone());
            info!(
                "Financial data covers {} year(s) from {}",
                summary.years_covered.len(),
                rel
            );
            summary
        }
        None => {
            warn!("No financial data file found in {}", run_root.display());
            FinancialSummary::default()
        }
    };

    summary.annual_reports_count = count_annual_reports(&run_root.join(&config.annual_reports_dir));
    Ok(summary)
}

/// Summarize a parsed financial data document.
pub fn summarize(value: &Value, key_metrics: &[String]) -> std::result::Result<FinancialSummary, String> {
    let root = value
        .as_object()
        .ok_or_else(|| "financial data is not a JSON object".to_string())?;

    let mut years = BTreeSet::new();
    let mut chosen: BTreeMap<i32, (u8, BTreeMap<String, String>)> = BTreeMap::new();

    for (key, entry) in root {
        if key == "years_covered" {
            let listed = entry
                .as_array()
                .ok_or_else(|| "'years_covered' is not an array".to_string())?;
            years.extend(
                listed
                    .iter()
                    .filter_map(Value::as_i64)
                    .filter_map(|y| i32::try_from(y).ok()),
            );
            continue;
        }

        let Some(year) = entry_year(key, entry) else {
            debug!("Skipping financial entry without a year: {}", key);
            continue;
        };
        years.insert(year);

        let Some(object) = entry.as_object() else {
            continue;
        };

        let report_type = object
            .get("report_type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| key.split_once('_').map(|(_, t)| t.to_string()))
            .unwrap_or_else(|| "annual".to_string());
        let priority = report_priority(&report_type);

        let indicators = match object.get("indicators").and_then(Value::as_object) {
            Some(indicators) => indicators,
            None => object,
        };
        let metrics = select_metrics(indicators, key_metrics);

        match chosen.get(&year) {
            Some((existing, _)) if *existing <= priority => {}
            _ => {
                chosen.insert(year, (priority, metrics));
            }
        }
    }

    Ok(FinancialSummary {
        years_covered: years.into_iter().collect(),
        key_metrics: chosen
            .into_iter()
            .filter(|(_, (_, metrics))| !metrics.is_empty())
            .map(|(year, (_, metrics))| (year, metrics))
            .collect(),
        annual_reports_count: 0,
        source_file: None,
    })
}

fn entry_year(key: &str, entry: &Value) -> Option<i32> {
    if let Some(year) = entry.get("year").and_then(Value::as_i64) {
        return i32::try_from(year).ok();
    }
    let prefix = key.get(..4)?;
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if key.len() > 4 && key.as_bytes()[4].is_ascii_digit() {
        return None;
    }
    prefix.parse().ok().filter(|y| (1900..2100).contains(y))
}

fn select_metrics(indicators: &Map<String, Value>, key_metrics: &[String]) -> BTreeMap<String, String> {
    indicators
        .iter()
        .filter(|(name, _)| key_metrics.is_empty() || key_metrics.iter().any(|k| k == *name))
        .filter_map(|(name, value)| display_value(name, value).map(|v| (name.clone(), v)))
        .collect()
}

/// Render one indicator value for display.
pub fn display_value(name: &str, value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| format_metric(name, v)),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(object) => match object.get("value") {
            Some(inner) if !inner.is_object() => display_value(name, inner),
            _ => None,
        },
        _ => None,
    }
}

fn format_metric(name: &str, value: f64) -> String {
    let lowered = name.to_lowercase();
    if PERCENT_METRICS.contains(&lowered.as_str()) {
        format!("{:.2}%", value)
    } else {
        format_number(value)
    }
}

/// Two decimals with thousands separators, e.g. `13,038.00`.
pub fn format_number(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

fn count_annual_reports(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .count()
}
