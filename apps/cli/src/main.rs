//! RecipeForge CLI: find, rank and synthesize recipes.
//!
//! Looks recipes up in the local store, fills gaps from configured recipe
//! sites, and combines sources into new recipes with a drafting/critique
//! loop.

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
