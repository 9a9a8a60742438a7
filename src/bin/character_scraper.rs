use anyhow::Result;
use animefinder::commands::{self, CharactersArgs};
use animefinder::logging;
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Scrape MyAnimeList character pages")]
struct Args {
    /// Enable debug output
    #[clap(short, long)]
    debug: bool,

    #[clap(flatten)]
    characters: CharactersArgs,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    logging::init_logging(args.debug);

    commands::characters(&args.characters)
}
