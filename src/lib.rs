//! steprun: execution engine for test specifications
//!
//! Takes a validated item tree, drives out-of-process language runners
//! over a JSON-lines protocol, one runner per execution stream, and
//! aggregates their results into a single suite result.

pub mod cli;
pub mod config;
pub mod errors;
pub mod event;
pub mod executor;
pub mod filter;
pub mod manifest;
pub mod models;
pub mod output;
pub mod resolver;
pub mod results;
pub mod runner;
pub mod utils;
pub mod validation;

#[cfg(test)]
mod testing;
