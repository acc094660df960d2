//! `cold-serve` binary entry point. See [`cold_serve::cli`].

use std::process::ExitCode;

use clap::Parser;
use cold_serve::cli::{run, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    run(Cli::parse()).await
}
