//! Company code handling.
//!
//! Codes arrive in many spellings (`09992`, `09992.hk`, ` 09992.HK `).
//! Display codes are exchange-qualified; index keys are normalized so that
//! every spelling of one company lands on the same registry row.

/// Exchange suffixes recognized when qualifying or normalizing a code.
const MARKET_SUFFIXES: &[&str] = &["HK", "SH", "SZ", "BJ", "SS", "US"];

/// Qualify a raw stock code with its exchange suffix.
///
/// Codes that already carry a suffix are only upper-cased. Bare numeric
/// codes follow the mainland/HK numbering conventions; anything else is
/// returned as-is.
pub fn qualify(code: &str) -> String {
    let code = code.trim().to_uppercase();

    if code.contains('.') || code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
        return code;
    }

    if code.len() == 5 {
        return format!("{}.HK", code);
    }

    let suffix = match code.as_bytes()[0] {
        b'6' => "SH",
        b'0' | b'3' => "SZ",
        b'4' | b'8' => "BJ",
        _ => "SH",
    };
    format!("{}.{}", code, suffix)
}

/// Normalize a code into its registry key.
///
/// Case-insensitive, trims a trailing market suffix, and drops any
/// remaining punctuation or whitespace.
pub fn normalize_key(code: &str) -> String {
    let upper = code.trim().to_uppercase();

    let base = match upper.rsplit_once('.') {
        Some((head, suffix)) if MARKET_SUFFIXES.contains(&suffix) => head,
        _ => upper.as_str(),
    };

    base.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Market classification for a qualified code.
pub fn market_for(code: &str) -> &'static str {
    let suffix = code.rsplit_once('.').map(|(_, s)| s).unwrap_or("");
    match suffix.to_uppercase().as_str() {
        "HK" => "Hong Kong",
        "SH" | "SZ" | "BJ" | "SS" => "A-share",
        "US" => "US",
        _ => "Unknown",
    }
}
