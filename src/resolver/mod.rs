//! Step argument resolution
//!
//! Turns raw step arguments into the parameters sent to a runner: data-table
//! rows for dynamic arguments and `kind:value` tokens for special ones.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ResolverError;
use crate::models::{DataTable, StepArg, TableRow};
use crate::runner::Parameter;

/// Value produced by a special-parameter kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    Text(String),
    Table(DataTable),
}

pub trait Resolver: Send + Sync {
    /// Rows of a data table, validated against its headers
    fn resolve_table(&self, table: &DataTable) -> Result<Vec<TableRow>, ResolverError>;

    /// Resolve a `kind:value` token
    fn resolve_special(&self, token: &str) -> Result<ArgValue, ResolverError>;
}

type SpecialKind = Box<dyn Fn(&str, &Path) -> Result<ArgValue, String> + Send + Sync>;

/// Resolver with pluggable special-parameter kinds
///
/// `file:<path>` and `table:<path.csv>` are registered by default. Relative
/// paths are taken from the project root.
pub struct SpecialTypeResolver {
    base_dir: PathBuf,
    kinds: HashMap<String, SpecialKind>,
}

impl SpecialTypeResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let mut resolver = Self {
            base_dir: base_dir.into(),
            kinds: HashMap::new(),
        };
        resolver.register("file", |value, base| {
            fs::read_to_string(base.join(value))
                .map(ArgValue::Text)
                .map_err(|e| e.to_string())
        });
        resolver.register("table", |value, base| {
            let text = fs::read_to_string(base.join(value)).map_err(|e| e.to_string())?;
            convert_csv_to_table(&text).map(ArgValue::Table)
        });
        resolver
    }

    pub fn register<F>(&mut self, kind: &str, resolve: F)
    where
        F: Fn(&str, &Path) -> Result<ArgValue, String> + Send + Sync + 'static,
    {
        self.kinds.insert(kind.to_lowercase(), Box::new(resolve));
    }
}

impl Resolver for SpecialTypeResolver {
    fn resolve_table(&self, table: &DataTable) -> Result<Vec<TableRow>, ResolverError> {
        let width = table.headers.len();
        table
            .rows
            .iter()
            .enumerate()
            .map(|(index, cells)| {
                if cells.len() != width {
                    return Err(ResolverError::MalformedTable {
                        row: index + 1,
                        expected: width,
                        found: cells.len(),
                    });
                }
                Ok(TableRow {
                    index,
                    values: table.headers.iter().cloned().zip(cells.iter().cloned()).collect(),
                })
            })
            .collect()
    }

    fn resolve_special(&self, token: &str) -> Result<ArgValue, ResolverError> {
        let (kind, value) = token
            .split_once(':')
            .ok_or_else(|| ResolverError::NotFound(token.to_string()))?;
        let resolve = self
            .kinds
            .get(&kind.trim().to_lowercase())
            .ok_or_else(|| ResolverError::NotFound(token.to_string()))?;

        resolve(value.trim(), &self.base_dir).map_err(|reason| ResolverError::InvalidSpecialParam {
            token: token.to_string(),
            reason,
        })
    }
}

/// Parse CSV text with a header line into a table
pub fn convert_csv_to_table(text: &str) -> Result<DataTable, String> {
    if text.trim().is_empty() {
        return Ok(DataTable::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| e.to_string())
        })
        .collect::<Result<Vec<Vec<String>>, String>>()?;

    Ok(DataTable::new(headers, rows))
}

/// Resolve every argument of a step against the current data-table row
pub fn resolve_step_args(
    resolver: &dyn Resolver,
    args: &[StepArg],
    row: Option<&TableRow>,
) -> Result<Vec<Parameter>, ResolverError> {
    args.iter()
        .map(|arg| match arg {
            StepArg::Static(value) => Ok(Parameter::Static {
                name: value.clone(),
                value: value.clone(),
            }),
            StepArg::Dynamic(column) => row
                .and_then(|r| r.get(column))
                .map(|value| Parameter::Static {
                    name: column.clone(),
                    value: value.to_string(),
                })
                .ok_or_else(|| ResolverError::UnknownColumn(column.clone())),
            StepArg::Special(token) => Ok(match resolver.resolve_special(token)? {
                ArgValue::Text(value) => Parameter::Special {
                    name: token.clone(),
                    value,
                },
                ArgValue::Table(table) => Parameter::Table {
                    name: token.clone(),
                    table,
                },
            }),
            StepArg::Table(table) => Ok(Parameter::Table {
                name: "table".to_string(),
                table: table.clone(),
            }),
        })
        .collect()
}
