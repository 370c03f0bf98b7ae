//! Data-table row selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Selected data-table rows, written 1-based (`1,3-5`) and held as sorted,
/// disjoint 0-based inclusive ranges
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableRows(Vec<(usize, usize)>);

impl TableRows {
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTableRows(source.to_string(), reason);

        let mut ranges = Vec::new();
        for part in source.split(',').map(str::trim) {
            if part.is_empty() {
                return Err(invalid("empty row selection".to_string()));
            }
            let (start, end) = match part.split_once('-') {
                Some((start, end)) => (parse_row(start).map_err(invalid)?, parse_row(end).map_err(invalid)?),
                None => {
                    let row = parse_row(part).map_err(invalid)?;
                    (row, row)
                }
            };
            if start > end {
                return Err(invalid(format!("range {start}-{end} is descending")));
            }
            ranges.push((start - 1, end - 1));
        }

        ranges.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Ok(Self(merged))
    }

    /// Whether the 0-based row index is selected
    pub fn contains(&self, index: usize) -> bool {
        self.0
            .iter()
            .any(|&(start, end)| start <= index && index <= end)
    }

    /// Highest selected 0-based index
    pub fn max_index(&self) -> Option<usize> {
        self.0.last().map(|&(_, end)| end)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().flat_map(|&(start, end)| start..=end)
    }
}

fn parse_row(text: &str) -> Result<usize, String> {
    let row: usize = text
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a row number", text.trim()))?;
    if row == 0 {
        return Err("row numbers start at 1".to_string());
    }
    Ok(row)
}

impl FromStr for TableRows {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TableRows {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TableRows> for String {
    fn from(rows: TableRows) -> Self {
        rows.to_string()
    }
}

impl fmt::Display for TableRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<String> = self
            .0
            .iter()
            .map(|&(start, end)| {
                if start == end {
                    (start + 1).to_string()
                } else {
                    format!("{}-{}", start + 1, end + 1)
                }
            })
            .collect();
        write!(f, "{}", rows.join(","))
    }
}
