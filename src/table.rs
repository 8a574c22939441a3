//! Printable roster table for manual fingerprint and ID checks.

use std::collections::HashSet;
use std::path::Path;

use crate::batch::list_files;
use crate::declaration::parse_record;
use crate::error::{Error, Result};
use crate::types::KeyRecord;

const HEADER: [&str; 4] = ["name", "fingerprint", "fp verified", "id verified"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub name: String,
    pub fingerprint: String,
}

/// Formats a fingerprint for reading aloud: lower case, groups of four,
/// with a double space between the two halves.
///
/// ```
/// assert_eq!(
///     keyroster::table::format_fingerprint("0xABAF11C65A2970B130ABE3C479BE3E4300411886"),
///     "abaf 11c6 5a29 70b1 30ab  e3c4 79be 3e43 0041 1886"
/// );
/// ```
pub fn format_fingerprint(raw: &str) -> String {
    let compact: Vec<char> = crate::validation::normalize_fingerprint(raw)
        .to_ascii_lowercase()
        .chars()
        .collect();

    compact
        .chunks(20)
        .map(|half| {
            half.chunks(4)
                .map(|group| group.iter().collect::<String>())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("  ")
}

/// Rows for every record not in `previous`, sorted by name.
pub fn build_rows(records: &[KeyRecord], previous: &HashSet<String>) -> Vec<TableRow> {
    let mut rows: Vec<TableRow> = records
        .iter()
        .filter(|r| !previous.contains(&r.name))
        .map(|r| TableRow {
            name: r.name.clone(),
            fingerprint: format_fingerprint(&r.fingerprint),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// Renders rows as a padded markdown table with two blank check columns.
pub fn render_markdown(rows: &[TableRow]) -> String {
    let body: Vec<[&str; 4]> = rows
        .iter()
        .map(|r| [r.name.as_str(), r.fingerprint.as_str(), "", ""])
        .collect();

    let mut widths = HEADER.map(|h| h.chars().count().max(3));
    for row in &body {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADER, &widths);
    let rule = widths.map(|w| "-".repeat(w));
    push_row(&mut out, &rule.each_ref().map(String::as_str), &widths);
    for row in &body {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[&str; 4], widths: &[usize; 4]) {
    out.push('|');
    for (cell, width) in cells.iter().zip(widths) {
        let pad = width - cell.chars().count();
        out.push(' ');
        out.push_str(cell);
        out.push_str(&" ".repeat(pad));
        out.push_str(" |");
    }
    out.push('\n');
}

/// Loads every declaration in `dir` and renders the table.
pub async fn table_for_dir(dir: &Path, previous: &HashSet<String>) -> Result<String> {
    let mut records = Vec::new();
    for path in list_files(dir).await? {
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
        records.push(parse_record(&path.display().to_string(), &text)?);
    }
    Ok(render_markdown(&build_rows(&records, previous)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, fingerprint: &str) -> KeyRecord {
        KeyRecord {
            source: format!("keys/{name}"),
            name: name.to_string(),
            fingerprint: fingerprint.to_string(),
        }
    }

    #[test]
    fn test_format_fingerprint() {
        assert_eq!(
            format_fingerprint("ABAF 11C6 5A29 70B1 30AB E3C4 79BE 3E43 0041 1886"),
            "abaf 11c6 5a29 70b1 30ab  e3c4 79be 3e43 0041 1886"
        );
    }

    #[test]
    fn test_build_rows_filters_and_sorts() {
        let fpr = "ABAF11C65A2970B130ABE3C479BE3E4300411886";
        let records = vec![
            record("Zed", fpr),
            record("Mark Einon", fpr),
            record("Alice Example", fpr),
        ];
        let previous: HashSet<String> = ["Mark Einon".to_string()].into_iter().collect();

        let rows = build_rows(&records, &previous);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alice Example", "Zed"]);
        assert_eq!(
            rows[0].fingerprint,
            "abaf 11c6 5a29 70b1 30ab  e3c4 79be 3e43 0041 1886"
        );
    }

    #[test]
    fn test_render_markdown() {
        let rows = vec![TableRow {
            name: "Al".to_string(),
            fingerprint: "abcd".to_string(),
        }];
        let table = render_markdown(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(
            lines,
            vec![
                "| name | fingerprint | fp verified | id verified |",
                "| ---- | ----------- | ----------- | ----------- |",
                "| Al   | abcd        |             |             |",
            ]
        );
    }

    #[test]
    fn test_render_markdown_empty() {
        assert_eq!(render_markdown(&[]).lines().count(), 2);
    }
}
