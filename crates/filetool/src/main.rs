//! filetool - append lines or bytes to files, safely under concurrent writers
//!
//! A thin CLI over `filetool-core`: every payload goes through the locked,
//! idempotent append engine.

use clap::Parser;
use filetool_core::FiletoolError;

mod commands;

use commands::Cli;

fn main() {
    filetool_core::logging::init();
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        match e.downcast_ref::<FiletoolError>() {
            Some(err) => eprintln!("Error: {}", err.cli_message()),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}
