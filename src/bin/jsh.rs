// src/bin/jsh.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use jsh::{
    CancellationToken,
    cli::{Cli, bootstrap},
    engine,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Sets up logging, builds the execution context and hands it to the engine.
/// Every failure that escapes lands here and ends the process with code 1.
fn main() {
    let cancellation_token = Arc::new(AtomicBool::new(false));
    env_logger::init();

    match run_cli(Cli::parse(), cancellation_token) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run_cli(cli: Cli, cancellation_token: CancellationToken) -> Result<i32> {
    // Flags may carry inline code and env values; only their shape is logged.
    log::debug!(
        "CLI parsed: resume={}, key_fd={:?}, code={}, {} mount(s), {} env override(s), {} arg(s).",
        cli.resume.is_some(),
        cli.key_fd,
        cli.code.is_some(),
        cli.mounts.len(),
        cli.env.len(),
        cli.args.len()
    );

    let context = bootstrap::build_context(&cli)?;
    engine::run(context, cancellation_token)
}
