//! Markdown report generation.
//!
//! Renders summary records as `KNOWLEDGE_SUMMARY.md` and
//! `LEARNING_SUMMARY.md`, and formats query results for the terminal.

use crate::models::{
    format_mb, FileStatus, FilingSummary, FinancialSummary, IndexEntry, SummaryRecord,
};
use crate::query::{Comparison, LoadedRecord, MISSING_MARKER};
use std::collections::BTreeSet;

/// Generate `KNOWLEDGE_SUMMARY.md` for a record.
pub fn generate_knowledge_summary(record: &SummaryRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Knowledge Summary: {} ({})\n\n",
        record.identity.company_name, record.identity.company_code
    ));

    output.push_str(&generate_identity_section(record));
    output.push_str(&generate_financial_section(&record.financial_summary));
    output.push_str(&generate_theses_section(
        &record.narrative_summary.key_investment_points,
    ));

    // Report structure
    if !record.narrative_summary.sections.is_empty() {
        output.push_str("## Report Sections\n\n");
        for section in &record.narrative_summary.sections {
            output.push_str(&format!("- {}\n", section));
        }
        output.push('\n');
    }

    output.push_str(&generate_filing_section(record.filing_summary.as_ref(), 10));
    output.push_str(&generate_inventory_section(record));
    output.push_str(&generate_footer(record));

    output
}

/// Generate `LEARNING_SUMMARY.md`: the condensed view of one company.
pub fn generate_learning_summary(loaded: &LoadedRecord, sample_titles: usize) -> String {
    let record = &loaded.record;
    let mut output = String::new();

    output.push_str(&format!(
        "# Learning Summary: {} ({})\n\n",
        record.identity.company_name, record.identity.company_code
    ));
    output.push_str(&format!(
        "*Market: {} | Analysis date: {}*\n\n",
        record.identity.market, record.metadata.analysis_date
    ));

    output.push_str(&generate_theses_section(
        &record.narrative_summary.key_investment_points,
    ));

    let table = generate_metric_table(&record.financial_summary);
    if !table.is_empty() {
        output.push_str("## Key Metrics\n\n");
        output.push_str(&table);
        output.push('\n');
    }

    if !record.narrative_summary.sections.is_empty() {
        output.push_str("## Report Sections\n\n");
        for (i, section) in record.narrative_summary.sections.iter().enumerate() {
            output.push_str(&format!("{}. {}\n", i + 1, section));
        }
        output.push('\n');
    }

    output.push_str(&generate_filing_section(
        record.filing_summary.as_ref(),
        sample_titles,
    ));

    // Where the data lives now
    output.push_str("## Data Location\n\n");
    output.push_str(&format!(
        "- **Analysis directory:** `{}`\n",
        loaded.entry.analysis_dir.display()
    ));
    output.push_str(&format!(
        "- **Report:** `{}`\n",
        loaded.entry.report_file_path.display()
    ));
    match &loaded.archive {
        Some(path) => output.push_str(&format!("- **Raw data archive:** `{}`\n", path.display())),
        None => output.push_str("- **Raw data archive:** none\n"),
    }
    let archived = loaded.count_with_status(FileStatus::Archived);
    let missing = loaded.count_with_status(FileStatus::Missing);
    if archived > 0 || missing > 0 {
        output.push_str(&format!(
            "- **Files:** {} present, {} archived, {} missing\n",
            loaded.count_with_status(FileStatus::Present),
            archived,
            missing
        ));
    }
    output.push('\n');

    output.push_str(&generate_footer(record));
    output
}

fn generate_identity_section(record: &SummaryRecord) -> String {
    let mut section = String::new();

    section.push_str("## Company\n\n");
    section.push_str(&format!("- **Code:** {}\n", record.identity.company_code));
    section.push_str(&format!("- **Name:** {}\n", record.identity.company_name));
    section.push_str(&format!("- **Market:** {}\n", record.identity.market));
    if let Some(ref industry) = record.identity.industry {
        section.push_str(&format!("- **Industry:** {}\n", industry));
    }
    section.push_str(&format!(
        "- **Analysis Date:** {}\n\n",
        record.metadata.analysis_date
    ));

    section
}

fn generate_financial_section(financial: &FinancialSummary) -> String {
    let mut section = String::new();

    section.push_str("## Financial Overview\n\n");
    match financial.year_span() {
        Some(span) => section.push_str(&format!(
            "- **Years Covered:** {} ({} years)\n",
            span,
            financial.years_covered.len()
        )),
        None => section.push_str("- **Years Covered:** none\n"),
    }
    section.push_str(&format!(
        "- **Annual Reports:** {}\n",
        financial.annual_reports_count
    ));
    if let Some(ref source) = financial.source_file {
        section.push_str(&format!("- **Source:** `{}`\n", source));
    }
    section.push('\n');

    if let Some((year, metrics)) = financial.latest_metrics() {
        section.push_str(&format!("### Key Metrics ({})\n\n", year));
        section.push_str("| Metric | Value |\n");
        section.push_str("|:---|---:|\n");
        for (name, value) in metrics {
            section.push_str(&format!("| {} | {} |\n", table_cell(name), table_cell(value)));
        }
        section.push('\n');
    }

    section
}

/// Metrics as rows, years as columns.
fn generate_metric_table(financial: &FinancialSummary) -> String {
    let names: BTreeSet<&String> = financial
        .key_metrics
        .values()
        .flat_map(|metrics| metrics.keys())
        .collect();
    if names.is_empty() {
        return String::new();
    }

    let years: Vec<i32> = financial.key_metrics.keys().copied().collect();
    let mut table = String::new();

    table.push_str("| Metric |");
    for year in &years {
        table.push_str(&format!(" {} |", year));
    }
    table.push_str("\n|:---|");
    table.push_str(&"---:|".repeat(years.len()));
    table.push('\n');

    for name in names {
        table.push_str(&format!("| {} |", table_cell(name)));
        for year in &years {
            let value = financial.key_metrics[year]
                .get(name)
                .map(String::as_str)
                .unwrap_or(MISSING_MARKER);
            table.push_str(&format!(" {} |", table_cell(value)));
        }
        table.push('\n');
    }

    table
}

fn generate_theses_section(theses: &[String]) -> String {
    let mut section = String::new();

    section.push_str("## Core Investment Points\n\n");
    if theses.is_empty() {
        section.push_str("No investment points were found in the analysis report.\n\n");
        return section;
    }

    for (i, thesis) in theses.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, thesis));
    }
    section.push('\n');

    section
}

fn generate_filing_section(filings: Option<&FilingSummary>, sample_titles: usize) -> String {
    let Some(filings) = filings else {
        return String::new();
    };

    let mut section = String::new();

    section.push_str("## Announcements\n\n");
    section.push_str(&format!("- **Total:** {}\n", filings.total_count));
    section.push_str(&format!("- **Important:** {}\n", filings.important_count));
    if let Some(range) = filings.date_range {
        section.push_str(&format!(
            "- **Date Range:** {} to {}\n",
            range.start, range.end
        ));
    }
    section.push('\n');

    if sample_titles > 0 && !filings.sample_titles.is_empty() {
        section.push_str("### Recent Titles\n\n");
        for title in filings.sample_titles.iter().take(sample_titles) {
            section.push_str(&format!("- {}\n", title));
        }
        section.push('\n');
    }

    section
}

fn generate_inventory_section(record: &SummaryRecord) -> String {
    let mut section = String::new();

    section.push_str("## File Inventory\n\n");
    section.push_str(&format!(
        "*{} files, {}*\n\n",
        record.total_files(),
        format_mb(record.total_size())
    ));

    if record.file_inventory.is_empty() {
        return section;
    }

    section.push_str("| Role | Path | Size |\n");
    section.push_str("|:---|:---|---:|\n");
    for (role, entry) in &record.file_inventory {
        section.push_str(&format!(
            "| {} | `{}` | {} |\n",
            table_cell(role),
            table_cell(&entry.path),
            format_size(entry.size)
        ));
    }
    section.push('\n');

    section
}

fn generate_footer(record: &SummaryRecord) -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Generated by company-kb v{} (schema {})*\n",
        env!("CARGO_PKG_VERSION"),
        record.metadata.schema_version
    ));

    footer
}

/// Escape a value for a Markdown table cell.
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format_mb(bytes)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// One line per index entry, for `list` and `search`.
pub fn format_entry(entry: &IndexEntry) -> String {
    let years = match (entry.years_covered.first(), entry.years_covered.last()) {
        (Some(first), Some(last)) if first != last => format!("{}-{}", first, last),
        (Some(only), _) => only.to_string(),
        _ => "no financial years".to_string(),
    };

    format!(
        "{} {} [{}] analysed {} | {} | {} files{}",
        entry.company_code,
        entry.company_name,
        entry.market,
        entry.analysis_date,
        years,
        entry.file_count,
        if entry.archive_path.is_some() { " | archived" } else { "" }
    )
}

/// Terminal view of one loaded company.
pub fn render_company(loaded: &LoadedRecord, display_theses: usize) -> String {
    let record = &loaded.record;
    let mut out = String::new();

    out.push_str(&format!(
        "🏢 {} ({})\n",
        record.identity.company_name, record.identity.company_code
    ));
    out.push_str(&format!("   Market: {}\n", record.identity.market));
    if let Some(ref industry) = record.identity.industry {
        out.push_str(&format!("   Industry: {}\n", industry));
    }
    out.push_str(&format!(
        "   Analysis date: {}\n",
        record.metadata.analysis_date
    ));
    out.push_str(&format!(
        "   Directory: {}\n",
        loaded.entry.analysis_dir.display()
    ));

    match record.financial_summary.latest_metrics() {
        Some((year, metrics)) => {
            out.push_str(&format!("\n📊 Key metrics ({}):\n", year));
            for (name, value) in metrics {
                out.push_str(&format!("   {}: {}\n", name, value));
            }
        }
        None => out.push_str("\n📊 No financial metrics recorded\n"),
    }

    let theses = &record.narrative_summary.key_investment_points;
    if !theses.is_empty() {
        out.push_str("\n💡 Core investment points:\n");
        for (i, thesis) in theses.iter().take(display_theses).enumerate() {
            out.push_str(&format!("   {}. {}\n", i + 1, thesis));
        }
        if theses.len() > display_theses {
            out.push_str(&format!("   ... and {} more\n", theses.len() - display_theses));
        }
    }

    if let Some(ref filings) = record.filing_summary {
        out.push_str(&format!(
            "\n📰 Announcements: {} total, {} important\n",
            filings.total_count, filings.important_count
        ));
    }

    out.push_str(&format!(
        "\n📁 Files: {} ({})",
        record.total_files(),
        format_mb(record.total_size())
    ));
    let archived = loaded.count_with_status(FileStatus::Archived);
    let missing = loaded.count_with_status(FileStatus::Missing);
    if archived > 0 {
        out.push_str(&format!(", {} archived", archived));
    }
    if missing > 0 {
        out.push_str(&format!(", ⚠️  {} missing", missing));
    }
    out.push('\n');

    out
}

/// Terminal view of a comparison: one row per metric, one column per company.
pub fn render_comparison(comparison: &Comparison, display_theses: usize) -> String {
    let mut out = String::new();

    let header: Vec<String> = comparison
        .companies
        .iter()
        .enumerate()
        .map(|(i, c)| match comparison.latest_year(i) {
            Some(year) => format!("{} ({})", c.record.identity.company_code, year),
            None => c.record.identity.company_code.clone(),
        })
        .collect();

    let metric_width = comparison
        .metrics
        .iter()
        .map(|m| m.chars().count())
        .chain(std::iter::once("Metric".len()))
        .max()
        .unwrap_or(6);
    let column_widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            comparison
                .metrics
                .iter()
                .map(|m| comparison.value(i, m).chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    out.push_str("📊 Key metrics comparison\n\n");
    out.push_str(&pad("Metric", metric_width));
    for (h, w) in header.iter().zip(&column_widths) {
        out.push_str("  ");
        out.push_str(&pad(h, *w));
    }
    out.push('\n');
    out.push_str(&"-".repeat(metric_width + column_widths.iter().map(|w| w + 2).sum::<usize>()));
    out.push('\n');

    if comparison.metrics.is_empty() {
        out.push_str("(no metrics recorded)\n");
    }
    for metric in &comparison.metrics {
        out.push_str(&pad(metric, metric_width));
        for (i, w) in column_widths.iter().enumerate() {
            out.push_str("  ");
            out.push_str(&pad(comparison.value(i, metric), *w));
        }
        out.push('\n');
    }

    for company in &comparison.companies {
        let record = &company.record;
        out.push_str(&format!(
            "\n🏢 {} ({})\n",
            record.identity.company_name, record.identity.company_code
        ));
        for (i, thesis) in record
            .narrative_summary
            .key_investment_points
            .iter()
            .take(display_theses)
            .enumerate()
        {
            out.push_str(&format!("   {}. {}\n", i + 1, thesis));
        }
        out.push_str(&format!(
            "   Data: {} annual reports, {} announcements, report {}\n",
            record.financial_summary.annual_reports_count,
            record
                .filing_summary
                .as_ref()
                .map(|f| f.total_count)
                .unwrap_or(0),
            if record.narrative_summary.report_exists {
                format_size(record.narrative_summary.report_size)
            } else {
                "missing".to_string()
            }
        ));
    }

    for unavailable in &comparison.unavailable {
        out.push_str(&format!(
            "\n⚠️  {}: {}\n",
            unavailable.company_code, unavailable.reason
        ));
    }

    out
}

/// Left-align to a display width counted in chars.
fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{}{}", s, " ".repeat(width.saturating_sub(len)))
}
