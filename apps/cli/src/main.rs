//! zimport CLI: export the articles of a ZIM archive as a MediaWiki XML dump.
//!
//! Serves the archive with a local `kiwix-serve`, fetches its root page,
//! extracts the articles and writes `articles.html` plus
//! `mediawiki_dump.xml`.

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
