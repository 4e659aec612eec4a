mod cli;
mod command_line;
mod commands;
mod config;
mod journal;
mod logging;
mod model;
mod parser;
mod session;
mod ui;

use anyhow::Result;
use chrono::Local;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let config = config::SessionConfig::resolve(args.journal, Local::now().date_naive())?;
    logging::init(&config.log_path)?;
    commands::run(config)
}
