//! Command Line Interface (CLI) layer for texchange.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for the analysis run and the
//! post-processing subcommands. It wires user-provided options to the
//! library functionality exposed via `texchange::api`.
//!
//! If you are embedding texchange into another application, prefer using
//! the high-level `texchange::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
