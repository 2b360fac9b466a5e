//! I/O helpers for refiner commands.

pub mod collaborator;
pub mod command;
pub mod config;
pub mod process;
pub mod prompt;
pub mod run_report;
