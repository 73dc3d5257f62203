//! GrantScout CLI: find funding opportunities for a project.
//!
//! Expands a project brief into search queries, gathers candidate sources
//! from the web and RSS feeds, and distills them into enriched
//! funding-opportunity records.

mod commands;

use std::process::ExitCode;

use clap::Parser;

use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }
    // .env is optional; real environment variables win.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    commands::init_tracing(&cli);

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("Error: {report:?}");
            ExitCode::from(commands::exit_code(&report))
        }
    }
}
