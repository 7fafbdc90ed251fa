//! Backlinkoo CLI: create backlink campaigns, generate articles with an LLM,
//! and publish them to Telegraph, Write.as or the Backlinkoo blog.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
