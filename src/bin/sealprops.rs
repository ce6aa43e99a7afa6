//! sealprops CLI - interactive editor for encrypted properties files
//!
//! Loads a properties file (encrypted or plaintext), lets the operator add
//! or replace entries on stdin, and writes the result back encrypted.

use std::io;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sealprops::cli::{self, Cli, RunOptions};
use sealprops::editor::StreamIo;

fn main() {
    // Logs go to stderr so stdout carries only the edit dialogue.
    // SEALPROPS_LOG=sealprops=debug for details; values are never logged.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(cli::LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let args = Cli::parse_from(cli::recognized_args(std::env::args_os()));

    let options = match RunOptions::try_from(args) {
        Ok(options) => options,
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    };

    let mut passphrase = cli::passphrase_reader(&options);
    let mut terminal = StreamIo::new(io::stdin().lock(), io::stdout());

    if let Err(e) = cli::run(&options, &mut *passphrase, &mut terminal) {
        eprintln!("Error: {}", e.chain());
        process::exit(1);
    }
}
