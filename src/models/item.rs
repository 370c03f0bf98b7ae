//! Executable item tree
//!
//! Specifications, scenarios, steps and concepts as handed over by the
//! parse/validation stage. The tree is read-only during execution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::ParseError;
use crate::filter::TagExpr;

/// Data table shared by the scenarios of a specification
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTable {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Cells of a column, top to bottom
    pub fn column(&self, header: &str) -> Option<Vec<&str>> {
        let index = self.headers.iter().position(|h| h == header)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

/// One resolved data-table row, ready for step argument substitution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRow {
    /// Zero-based row index in the owning table
    pub index: usize,
    pub values: HashMap<String, String>,
}

impl TableRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}

/// Raw step argument as written in the specification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StepArg {
    /// Literal value
    Static(String),
    /// Reference to a data-table column
    Dynamic(String),
    /// `kind:value` token handled by a special-parameter resolver
    Special(String),
    /// Inline table
    Table(DataTable),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub args: Vec<StepArg>,
}

impl Step {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            line: 0,
            args: Vec::new(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn with_arg(mut self, arg: StepArg) -> Self {
        self.args.push(arg);
        self
    }

    fn uses_dynamic_args(&self) -> bool {
        self.args.iter().any(|a| matches!(a, StepArg::Dynamic(_)))
    }
}

/// Macro-expanded group of steps executed as one opaque step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub text: String,
    #[serde(default)]
    pub line: usize,
    pub steps: Vec<StepItem>,
}

impl Concept {
    pub fn new(text: impl Into<String>, steps: Vec<StepItem>) -> Self {
        Self {
            text: text.into(),
            line: 0,
            steps,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepItem {
    Step(Step),
    Concept(Concept),
}

impl StepItem {
    pub fn text(&self) -> &str {
        match self {
            StepItem::Step(s) => &s.text,
            StepItem::Concept(c) => &c.text,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            StepItem::Step(s) => s.line,
            StepItem::Concept(c) => c.line,
        }
    }

    fn uses_dynamic_args(&self) -> bool {
        match self {
            StepItem::Step(s) => s.uses_dynamic_args(),
            StepItem::Concept(c) => c.steps.iter().any(StepItem::uses_dynamic_args),
        }
    }

    /// Every plain step in this item, concepts flattened
    pub fn flatten(&self) -> Vec<&Step> {
        match self {
            StepItem::Step(s) => vec![s],
            StepItem::Concept(c) => c.steps.iter().flat_map(StepItem::flatten).collect(),
        }
    }
}

impl From<Step> for StepItem {
    fn from(step: Step) -> Self {
        StepItem::Step(step)
    }
}

impl From<Concept> for StepItem {
    fn from(concept: Concept) -> Self {
        StepItem::Concept(concept)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub heading: String,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<StepItem>,
}

impl Scenario {
    pub fn new(heading: impl Into<String>, steps: Vec<StepItem>) -> Self {
        Self {
            heading: heading.into(),
            line: 0,
            tags: Vec::new(),
            steps,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Whether any step refers to a data-table column
    pub fn uses_data_table(&self) -> bool {
        self.steps.iter().any(StepItem::uses_dynamic_args)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub heading: String,
    pub file_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub data_table: Option<DataTable>,
    pub scenarios: Vec<Scenario>,
}

impl Specification {
    pub fn new(
        heading: impl Into<String>,
        file_name: impl Into<String>,
        scenarios: Vec<Scenario>,
    ) -> Self {
        Self {
            heading: heading.into(),
            file_name: file_name.into(),
            tags: Vec::new(),
            data_table: None,
            scenarios,
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_data_table(mut self, table: DataTable) -> Self {
        self.data_table = Some(table);
        self
    }

    /// Spec tags followed by the scenario's own tags
    pub fn scenario_tags<'a>(&'a self, scenario: &'a Scenario) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .chain(scenario.tags.iter())
            .map(String::as_str)
    }

    /// Copy of this spec keeping only scenarios that match `filter`
    pub fn filtered(&self, filter: &TagExpr) -> Option<Specification> {
        let scenarios: Vec<Scenario> = self
            .scenarios
            .iter()
            .filter(|sc| filter.matches(self.scenario_tags(sc)))
            .cloned()
            .collect();
        if scenarios.is_empty() {
            return None;
        }
        Some(Specification {
            scenarios,
            ..self.clone()
        })
    }
}

impl fmt::Display for Specification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.heading, self.file_name)
    }
}

/// Ordered sequence of specifications to execute
#[derive(Clone, Debug, Default)]
pub struct SpecCollection {
    specs: Vec<Arc<Specification>>,
}

impl SpecCollection {
    pub fn new(specs: Vec<Specification>) -> Self {
        Self {
            specs: specs.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[Arc<Specification>] {
        &self.specs
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Specification>> {
        self.specs.iter()
    }

    /// Specs paired with their position in the collection
    pub fn indexed(&self) -> Vec<(usize, Arc<Specification>)> {
        self.specs.iter().cloned().enumerate().collect()
    }

    /// Collection restricted to scenarios matching `filter`; specs left
    /// without scenarios are dropped
    pub fn filter_by_tags(&self, filter: &TagExpr) -> SpecCollection {
        Self {
            specs: self
                .specs
                .iter()
                .filter_map(|spec| spec.filtered(filter))
                .map(Arc::new)
                .collect(),
        }
    }
}

impl FromIterator<Specification> for SpecCollection {
    fn from_iter<T: IntoIterator<Item = Specification>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Named override supplied at invocation time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionArg {
    pub name: String,
    pub value: Vec<String>,
}

impl ExecutionArg {
    /// Parse `name=v1,v2`
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, value) = raw.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.split(',').map(|v| v.trim().to_string()).collect(),
        })
    }
}

/// Parse and validation failures keyed by spec (and scenario) identity
#[derive(Clone, Debug, Default)]
pub struct BuildErrors {
    spec_errs: HashMap<String, Vec<ParseError>>,
    scenario_errs: HashMap<(String, usize), Vec<ParseError>>,
}

impl BuildErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_spec_error(&mut self, file_name: impl Into<String>, err: ParseError) {
        self.spec_errs.entry(file_name.into()).or_default().push(err);
    }

    pub fn add_scenario_error(&mut self, file_name: impl Into<String>, line: usize, err: ParseError) {
        self.scenario_errs
            .entry((file_name.into(), line))
            .or_default()
            .push(err);
    }

    pub fn spec_errors(&self, spec: &Specification) -> Option<&[ParseError]> {
        self.spec_errs.get(&spec.file_name).map(Vec::as_slice)
    }

    pub fn scenario_errors(&self, spec: &Specification, scenario: &Scenario) -> Option<&[ParseError]> {
        self.scenario_errs
            .get(&(spec.file_name.clone(), scenario.line))
            .map(Vec::as_slice)
    }

    pub fn has_errors(&self) -> bool {
        !self.spec_errs.is_empty() || !self.scenario_errs.is_empty()
    }

    pub fn merge(&mut self, other: BuildErrors) {
        for (file, errs) in other.spec_errs {
            self.spec_errs.entry(file).or_default().extend(errs);
        }
        for (key, errs) in other.scenario_errs {
            self.scenario_errs.entry(key).or_default().extend(errs);
        }
    }

    /// Every recorded error, spec-level first
    pub fn all(&self) -> Vec<&ParseError> {
        self.spec_errs
            .values()
            .chain(self.scenario_errs.values())
            .flatten()
            .collect()
    }
}

/// Identity of the item an execution event refers to
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Suite,
    Specification {
        file_name: String,
        heading: String,
    },
    Scenario {
        file_name: String,
        heading: String,
        line: usize,
        table_row: Option<usize>,
    },
    Step {
        file_name: String,
        text: String,
        line: usize,
    },
    Concept {
        file_name: String,
        text: String,
        line: usize,
    },
}

impl Item {
    pub fn spec(spec: &Specification) -> Self {
        Item::Specification {
            file_name: spec.file_name.clone(),
            heading: spec.heading.clone(),
        }
    }

    pub fn scenario(spec: &Specification, scenario: &Scenario, table_row: Option<usize>) -> Self {
        Item::Scenario {
            file_name: spec.file_name.clone(),
            heading: scenario.heading.clone(),
            line: scenario.line,
            table_row,
        }
    }

    pub fn step(file_name: &str, step: &Step) -> Self {
        Item::Step {
            file_name: file_name.to_string(),
            text: step.text.clone(),
            line: step.line,
        }
    }

    pub fn concept(file_name: &str, concept: &Concept) -> Self {
        Item::Concept {
            file_name: file_name.to_string(),
            text: concept.text.clone(),
            line: concept.line,
        }
    }
}

/// Validated item tree as exchanged with the parse stage
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTree {
    pub specs: Vec<Specification>,
    #[serde(default)]
    pub parse_errors: Vec<ParseError>,
}

impl ItemTree {
    pub fn parse_ok(&self) -> bool {
        self.parse_errors.is_empty()
    }

    /// Parse errors tied to a file become build errors of that spec
    pub fn build_errors(&self) -> BuildErrors {
        let mut errors = BuildErrors::new();
        for err in &self.parse_errors {
            if !err.file_name.is_empty() {
                errors.add_spec_error(err.file_name.clone(), err.clone());
            }
        }
        errors
    }
}
