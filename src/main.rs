#![allow(dead_code)]
#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use cli::Cli;
use clap::Parser;
use tracing_subscriber::{filter::Directive, EnvFilter};

fn main() -> Result<()> {
    let default: Directive = "conv_trainer=info".parse()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder().with_default_directive(default).from_env_lossy())
        .init();

    let cli = Cli::parse();
    cli.run()
}
