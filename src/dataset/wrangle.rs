//! Raw-to-clean dataset wrangling.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use super::{is_na, DatasetDefinition, DatasetError, Table};

/// Counters describing what one wrangling pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WrangleReport {
    pub dataset: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped_missing: usize,
    pub dropped_bad_date: usize,
    pub duplicates_removed: usize,
    pub cells_imputed: usize,
}

/// Cleans a raw table into its clean contract.
///
/// Steps, in order: validate the raw schema, project and rename columns,
/// strip reference markers, coerce numerics, normalize day-first dates, drop
/// rows missing required fields, mean-impute gaps, remove exact duplicates.
pub fn wrangle(raw: &Table, def: &DatasetDefinition) -> Result<(Table, WrangleReport), DatasetError> {
    raw.validate(&def.raw_schema())?;

    let clean_schema = def.clean_schema();
    let source_idx: Vec<usize> = def
        .mappings
        .iter()
        .filter_map(|(raw_col, _)| raw.column_index(raw_col))
        .collect();

    let mut report = WrangleReport {
        dataset: def.name.to_string(),
        rows_in: raw.len(),
        ..Default::default()
    };

    let col = |name: &str| clean_schema.columns.iter().position(|c| c == name);
    let numeric_idx: Vec<usize> = def.numeric.iter().filter_map(|c| col(*c)).collect();
    let required_idx: Vec<usize> = def.required.iter().filter_map(|c| col(*c)).collect();
    let strip_idx: Vec<usize> = def.strip_references.iter().filter_map(|c| col(*c)).collect();
    let date_idx = def.day_first_date.and_then(col);

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(raw.len());
    for raw_row in &raw.rows {
        let mut row: Vec<String> = source_idx
            .iter()
            .map(|&i| {
                let cell = raw_row.get(i).map(|c| c.trim()).unwrap_or_default();
                if is_na(cell) {
                    String::new()
                } else {
                    cell.to_string()
                }
            })
            .collect();

        for &i in &strip_idx {
            row[i] = strip_reference_markers(&row[i]);
        }
        for &i in &numeric_idx {
            row[i] = extract_number(&row[i])
                .map(format_number)
                .unwrap_or_default();
        }
        if let Some(i) = date_idx {
            if !row[i].is_empty() {
                match normalize_day_first_date(&row[i]) {
                    Some(iso) => row[i] = iso,
                    None => {
                        report.dropped_bad_date += 1;
                        continue;
                    }
                }
            }
        }
        if required_idx.iter().any(|&i| row[i].is_empty()) {
            report.dropped_missing += 1;
            continue;
        }
        rows.push(row);
    }

    for column in def.impute_mean {
        let Some(i) = col(*column) else { continue };
        let present: Vec<f64> = rows
            .iter()
            .filter_map(|r| r[i].parse::<f64>().ok())
            .collect();
        if present.is_empty() {
            continue;
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        for row in rows.iter_mut().filter(|r| r[i].is_empty()) {
            row[i] = format_number(mean);
            report.cells_imputed += 1;
        }
    }

    let mut seen = HashSet::with_capacity(rows.len());
    let before = rows.len();
    rows.retain(|r| seen.insert(r.clone()));
    report.duplicates_removed = before - rows.len();

    report.rows_out = rows.len();
    Ok((
        Table {
            columns: clean_schema.columns,
            rows,
        },
        report,
    ))
}

/// Removes bracketed citation markers, e.g. `Seoul[12]` -> `Seoul`.
pub fn strip_reference_markers(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    for ch in value.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First numeric token of a cell, ignoring thousands separators and
/// reference markers (`"4,115 [23]"` -> `4115`).
pub fn extract_number(value: &str) -> Option<f64> {
    let cleaned = strip_reference_markers(value).replace(',', "");
    let start = cleaned.find(|c: char| c.is_ascii_digit() || c == '-' || c == '.')?;
    let token: String = cleaned[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == 'e' || *c == 'E')
        .collect();
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// `dd/mm/yyyy` -> `yyyy-mm-dd`; ISO input passes through.
pub fn normalize_day_first_date(value: &str) -> Option<String> {
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}
