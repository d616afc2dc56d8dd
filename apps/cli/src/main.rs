//! docweave CLI: run documentation build pipelines over XML topic sources.
//!
//! Loads a pipeline file, builds the component indexes, and runs every topic
//! in a manifest through the declared components.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
