//! Agency CSV parsing
//!
//! All-or-nothing: the first structural or validation problem fails the whole
//! document and no records are returned. Row numbers in errors count data
//! rows from 1 (the header is not counted).

use std::collections::HashMap;

use super::record::{Column, CsvRecord};

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsvError {
    #[error("CSV must contain a header row and at least one data row")]
    NoData,

    #[error("Missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    #[error("Row {row}: expected {expected} columns but found {found}")]
    ColumnCount {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Row {row}: Missing required field '{column}'")]
    MissingField { row: usize, column: &'static str },

    #[error("Row {row}: Trust score must be between 0 and 100")]
    InvalidTrustScore { row: usize },

    #[error("Row {row}: Price must be a non-negative number")]
    InvalidPrice { row: usize },
}

impl CsvError {
    /// Data row the error refers to, if any.
    pub fn row(&self) -> Option<usize> {
        match self {
            CsvError::ColumnCount { row, .. }
            | CsvError::MissingField { row, .. }
            | CsvError::InvalidTrustScore { row }
            | CsvError::InvalidPrice { row } => Some(*row),
            CsvError::NoData | CsvError::MissingColumns(_) => None,
        }
    }
}

/// Parse an agency upload into validated records, in file order.
pub fn parse_agencies_csv(text: &str) -> Result<Vec<CsvRecord>, CsvError> {
    let lines = split_lines(text);
    let Some((header_line, data_lines)) = lines.split_first() else {
        return Err(CsvError::NoData);
    };
    if data_lines.is_empty() {
        return Err(CsvError::NoData);
    }

    let header = split_fields(header_line);
    let columns = map_header(&header);

    let missing: Vec<&'static str> = Column::REQUIRED
        .into_iter()
        .filter(|c| !columns.contains_key(c))
        .map(Column::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(CsvError::MissingColumns(missing));
    }

    data_lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let row = index + 1;
            let fields = split_fields(line);
            if fields.len() != header.len() {
                return Err(CsvError::ColumnCount {
                    row,
                    expected: header.len(),
                    found: fields.len(),
                });
            }
            build_record(row, &columns, &fields)
        })
        .collect()
}

/// First position of each recognised column. Later duplicates are ignored.
fn map_header(header: &[String]) -> HashMap<Column, usize> {
    let mut columns = HashMap::new();
    for (position, name) in header.iter().enumerate() {
        if let Some(column) = Column::from_header(name) {
            columns.entry(column).or_insert(position);
        }
    }
    columns
}

fn build_record(
    row: usize,
    columns: &HashMap<Column, usize>,
    fields: &[String],
) -> Result<CsvRecord, CsvError> {
    let value = |column: Column| -> Option<&str> {
        columns
            .get(&column)
            .and_then(|&i| fields.get(i))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    };
    let required = |column: Column| -> Result<String, CsvError> {
        value(column)
            .map(str::to_string)
            .ok_or(CsvError::MissingField {
                row,
                column: column.as_str(),
            })
    };

    let name = required(Column::Name)?;
    let location = required(Column::Location)?;
    let description = required(Column::Description)?;
    let contact_email = required(Column::ContactEmail)?;

    let trust_score = match value(Column::TrustScore) {
        None => 0.0,
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| (0.0..=100.0).contains(v))
            .ok_or(CsvError::InvalidTrustScore { row })?,
    };
    let price = match value(Column::Price) {
        None => 0.0,
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or(CsvError::InvalidPrice { row })?,
    };

    Ok(CsvRecord {
        name,
        location,
        description,
        contact_email,
        trust_score,
        price,
        contact_phone: value(Column::ContactPhone).map(str::to_string),
        website: value(Column::Website).map(str::to_string),
        business_hours: value(Column::BusinessHours).map(str::to_string),
    })
}

/// Split on `\r\n`, `\n` or `\r`, dropping a leading BOM and blank lines.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.strip_prefix(BOM)
        .unwrap_or(text)
        .split(['\r', '\n'])
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Split one line on commas outside double quotes. `""` inside quotes is a
/// literal quote. Fields are trimmed.
pub(crate) fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}
