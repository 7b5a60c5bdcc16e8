//! Analysis run directory naming.
//!
//! Run directories are named `company_analysis_<code>_<YYYYMMDD>`. This
//! module is the only place that knows the format.

use crate::error::{KbError, Result};
use chrono::NaiveDate;
use std::fmt;
use std::path::Path;

const PREFIX: &str = "company_analysis_";
const DATE_FORMAT: &str = "%Y%m%d";

/// Identity of one analysis run, as encoded in its directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunId {
    /// Company code exactly as written in the directory name.
    pub code: String,
    pub date: NaiveDate,
}

impl RunId {
    pub fn new(code: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            code: code.into(),
            date,
        }
    }

    /// Parse a directory name. Returns a reason string on mismatch.
    pub fn parse(name: &str) -> std::result::Result<Self, String> {
        let rest = name
            .strip_prefix(PREFIX)
            .ok_or_else(|| format!("name does not start with '{}'", PREFIX))?;

        let (code, date) = rest
            .rsplit_once('_')
            .ok_or_else(|| "missing '_<YYYYMMDD>' date suffix".to_string())?;

        if code.is_empty() {
            return Err("empty company code".to_string());
        }

        if date.len() != 8 || !date.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("'{}' is not a YYYYMMDD date", date));
        }

        let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|e| format!("invalid date '{}': {}", date, e))?;

        Ok(Self::new(code, date))
    }

    /// Parse the final component of a run directory path.
    pub fn from_dir(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| KbError::malformed(path, "directory has no usable name"))?;

        Self::parse(name).map_err(|reason| KbError::malformed(path, reason))
    }

    /// The directory name this run is stored under.
    pub fn dir_name(&self) -> String {
        format!("{}{}_{}", PREFIX, self.code, self.date.format(DATE_FORMAT))
    }

    /// File name of the raw-data archive for this run.
    pub fn archive_name(&self) -> String {
        format!("{}_raw_data_{}.tar.gz", self.code, self.date.format(DATE_FORMAT))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hk_run() {
        let run = RunId::parse("company_analysis_09992.HK_20260126").unwrap();
        assert_eq!(run.code, "09992.HK");
        assert_eq!(run.date, NaiveDate::from_ymd_opt(2026, 1, 26).unwrap());
    }

    #[test]
    fn test_parse_format_round_trip() {
        for name in [
            "company_analysis_09992.HK_20260126",
            "company_analysis_600519_20240101",
            "company_analysis_BRK_B_20231231",
        ] {
            let run = RunId::parse(name).unwrap();
            assert_eq!(run.dir_name(), name);
            assert_eq!(RunId::parse(&run.dir_name()).unwrap(), run);
        }
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert!(RunId::parse("analysis_09992.HK_20260126").is_err());
        assert!(RunId::parse("company_analysis_09992.HK").is_err());
        assert!(RunId::parse("company_analysis__20260126").is_err());
        assert!(RunId::parse("company_analysis_09992.HK_2026012").is_err());
        assert!(RunId::parse("company_analysis_09992.HK_20261301").is_err());
    }

    #[test]
    fn test_from_dir_reports_malformed_run() {
        let err = RunId::from_dir(Path::new("/data/not_a_run")).unwrap_err();
        assert!(matches!(err, KbError::MalformedRun { .. }));
    }

    #[test]
    fn test_archive_name() {
        let run = RunId::parse("company_analysis_09992.HK_20260126").unwrap();
        assert_eq!(run.archive_name(), "09992.HK_raw_data_20260126.tar.gz");
    }
}
