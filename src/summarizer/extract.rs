//! Narrative extraction from a Markdown analysis report.
//!
//! `extract` is pure: it sees only the report text.
//!
//! - Sections are the titles of level-two headings (`## Title`), in order.
//! - Investment theses come from the block opened by a heading whose title
//!   contains one of the configured markers (case-insensitive). The block
//!   ends at the next heading of any level. Each unindented numbered
//!   (`1.`, `1)`, `1、`) or bulleted (`-`, `*`, `+`, `•`) line is one thesis;
//!   when the item has bold text, the first bold span is the thesis.
//! - Headings inside fenced code blocks are ignored.
//! - No match yields empty lists.

use regex::Regex;
use std::sync::OnceLock;

/// What the report says, before it is stored in a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrativeExtract {
    pub theses: Vec<String>,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions<'a> {
    pub thesis_markers: &'a [String],
    pub max_sections: usize,
    pub max_theses: usize,
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid heading regex"))
}

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\d+[.)、]\s*|[-*+•]\s+)(.+)$").expect("valid list item regex")
    })
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold regex"))
}

/// Extract section titles and investment theses from report text.
pub fn extract(text: &str, options: &ExtractOptions<'_>) -> NarrativeExtract {
    let markers: Vec<String> = options
        .thesis_markers
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect();

    let mut result = NarrativeExtract::default();
    let mut in_fence = false;
    let mut in_thesis_block = false;
    let mut thesis_block_seen = false;

    for raw in text.lines() {
        let line = raw.trim_end();

        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = heading_re().captures(line) {
            let level = caps[1].len();
            let title = caps[2].trim();

            if level == 2 && result.sections.len() < options.max_sections {
                result.sections.push(title.to_string());
            }

            in_thesis_block = false;
            if !thesis_block_seen {
                let lowered = title.to_lowercase();
                if markers.iter().any(|m| lowered.contains(m.as_str())) {
                    in_thesis_block = true;
                    thesis_block_seen = true;
                }
            }
            continue;
        }

        if in_thesis_block && result.theses.len() < options.max_theses {
            if let Some(thesis) = parse_item(line) {
                result.theses.push(thesis);
            }
        }
    }

    result
}

/// One unindented list item, reduced to its thesis text.
fn parse_item(line: &str) -> Option<String> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }

    let caps = item_re().captures(line)?;
    let body = caps.get(1)?.as_str().trim();

    let thesis = match bold_re().captures(body) {
        Some(bold) => bold[1].trim().to_string(),
        None => body.to_string(),
    };
    let thesis = thesis.trim_end_matches([':', '：']).trim().to_string();

    if thesis.is_empty() {
        None
    } else {
        Some(thesis)
    }
}
