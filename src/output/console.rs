//! Console reporter
//!
//! Prints spec, scenario and step outcomes as their end events arrive, and
//! the run summary once the suite is done.

use tokio::task::JoinHandle;

use crate::event::{EventBus, EventResult, ExecutionEvent, Topic};
use crate::models::{ScenarioResult, SpecResult, Status, StepResult};
use crate::results::ExecutionStatus;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Formats execution events for a terminal
#[derive(Clone, Debug)]
pub struct ConsoleReporter {
    colorize: bool,
    /// Prefix lines with the stream that produced them
    show_stream: bool,
}

impl ConsoleReporter {
    pub fn new(show_stream: bool) -> Self {
        Self {
            colorize: true,
            show_stream,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn status(&self, status: Status) -> String {
        let label = format!("{} {}", status.symbol(), status);
        if !self.colorize {
            return label;
        }
        let color = match status {
            Status::Passed => GREEN,
            Status::Failed => RED,
            Status::Skipped => YELLOW,
        };
        format!("{color}{label}{RESET}")
    }

    fn prefix(&self, stream: usize) -> String {
        if self.show_stream {
            format!("[stream {}] ", stream + 1)
        } else {
            String::new()
        }
    }

    pub fn format_spec(&self, result: &SpecResult) -> String {
        let mut output = format!(
            "{} {} ({}) [{}ms]",
            self.status(result.status()),
            result.heading,
            result.file_name,
            result.duration_ms
        );
        if let Some(failure) = &result.failure {
            output.push_str(&format!("\n    {}", failure.message));
        }
        for err in &result.errors {
            output.push_str(&format!("\n    {err}"));
        }
        output
    }

    pub fn format_scenario(&self, result: &ScenarioResult) -> String {
        let mut output = format!("  {} {}", self.status(result.status), result.heading);
        if let Some(row) = result.table_row {
            output.push_str(&format!(" (row {})", row + 1));
        }
        output.push_str(&format!(" [{}ms]", result.duration_ms));
        if result.attempts > 1 {
            output.push_str(&format!(" after {} attempts", result.attempts));
        }
        match (&result.failure, &result.skip_reason) {
            (Some(failure), _) => output.push_str(&format!("\n      {}", failure.message)),
            (None, Some(reason)) if result.status == Status::Skipped => {
                output.push_str(&format!("\n      {reason}"))
            }
            _ => {}
        }
        output
    }

    /// Only failed steps are worth a line of their own
    pub fn format_step(&self, result: &StepResult) -> Option<String> {
        if result.status != Status::Failed || result.is_concept {
            return None;
        }
        let message = result
            .failure
            .as_ref()
            .map(|f| f.message.as_str())
            .unwrap_or("");
        Some(format!(
            "    {} {}:{} {}",
            self.status(result.status),
            result.line,
            result.text,
            message
        ))
    }

    pub fn format_event(&self, event: &ExecutionEvent) -> Option<String> {
        let line = match event.result.as_deref()? {
            EventResult::Spec(result) => self.format_spec(result),
            EventResult::Scenario(result) => self.format_scenario(result),
            EventResult::Step(result) => self.format_step(result)?,
            EventResult::Suite(_) => return None,
        };
        Some(format!("{}{}", self.prefix(event.stream), line))
    }

    pub fn format_summary(&self, status: &ExecutionStatus, execution_time_ms: u64) -> String {
        let mut lines = status.summary_lines(execution_time_ms);
        if self.colorize && status.specs_failed + status.sce_failed > 0 {
            lines[0] = format!("{RED}{}{RESET}", lines[0]);
        }
        lines.join("\n")
    }

    pub fn print_summary(&self, status: &ExecutionStatus, execution_time_ms: u64) {
        println!("\n{}", self.format_summary(status, execution_time_ms));
    }

    /// Print end events of `bus` until it is closed
    pub fn attach(self, bus: &EventBus) -> JoinHandle<()> {
        bus.add_listener(&[Topic::SpecEnd, Topic::ScenarioEnd, Topic::StepEnd], move |event| {
            if let Some(line) = self.format_event(&event) {
                println!("{line}");
            }
        })
    }
}
