use std::process::ExitCode;

use clap::Parser;

use servicewindow::cli::{self, Arguments};

fn main() -> anyhow::Result<ExitCode> {
    let arguments = Arguments::parse();
    cli::run(arguments)
}
