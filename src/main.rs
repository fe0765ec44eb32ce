#![forbid(unsafe_code)]

//! mstore — Mission Store CLI entry point.

use clap::Parser;

use mission_store::cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("mstore: {e}");
        std::process::exit(e.exit_code());
    }
}
