// Entrypoint for the CLI application.
// Parses arguments, sets up logging and hands over to `cli::run`. Errors
// that escape a command are printed with their context chain.

use clap::Parser;
use homebox_cli::cli::{self, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Cli::parse();
    cli::init_tracing(args.verbose);

    match cli::run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
