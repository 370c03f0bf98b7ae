//! Terminal output for execution results

mod console;

pub use console::ConsoleReporter;
