//! Thin IO surfaces for the CLI: command input and report output.

pub mod csv;
pub mod jsonl;
