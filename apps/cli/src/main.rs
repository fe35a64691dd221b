//! pitchmatch CLI: match founder interviews against collected problem posts.
//!
//! Also loads the problem collection, provisions client collections and
//! structures free-form voice transcripts.

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
