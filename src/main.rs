//! texchange CLI entrypoint.
//!
//! Provides a thin wrapper over the `cli` module: parse args, dispatch to
//! the analysis run or a post-processing subcommand, and exit with
//! appropriate status. For programmatic use, prefer the library API
//! (`texchange::api`).

use clap::Parser;

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
