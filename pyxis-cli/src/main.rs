//! pyxis CLI - static type checking from the command line
//!
//! Exit status: 0 when no errors were found, 1 when the checked code has
//! errors, 2 for usage, configuration and build failures.

use anyhow::Result;
use colored::*;
use std::ffi::OsString;
use tracing::{error, info};

mod args;
mod config;
mod output;

use args::{process_cli, Cli, SystemProbe};
use output::{render, OutputStyle};

const EXIT_USAGE: i32 = 2;

fn main() {
    let argv: Vec<OsString> = std::env::args_os().skip(1).collect();
    let cli = match Cli::parse_args(argv) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    if cli.no_color {
        colored::control::set_override(false);
    }
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(EXIT_USAGE);
    }

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let (sources, options) = process_cli(cli, true, &SystemProbe)?;
    let style = OutputStyle {
        show_column_numbers: options.show_column_numbers,
        color: !cli.no_color,
    };
    let result = pyxis_build::build(&sources, options)?;
    for line in render(&result, sources.len(), style) {
        println!("{}", line);
    }
    info!(errors = result.error_count(), "check finished");
    Ok(result.exit_code())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    Ok(())
}
