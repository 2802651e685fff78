//! # winfs-injector CLI
//!
//! This is the binary entry point for the `winfs-injector` command-line tool.
//!
//! It parses the command-line arguments using `clap`, provisions a private
//! working directory, and runs the injection pipeline from the library crate.
//! Any error ends the process with exit code 1 and the error on stderr.

mod cli;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
