use clap::Parser;
use csvtidy::cli::{self, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Cli::parse();
    cli::run(args)
}
