// src/bin/cli.rs
use clap::Parser;
use parisclub_sync::cli;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let code = cli::run(cli::Args::parse())?;
    std::process::exit(code);
}
