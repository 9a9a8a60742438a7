use anyhow::Result;
use animefinder::commands::{self, AnimeArgs};
use animefinder::logging;
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Scrape MyAnimeList anime records")]
struct Args {
    /// Enable debug output
    #[clap(short, long)]
    debug: bool,

    #[clap(flatten)]
    anime: AnimeArgs,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    logging::init_logging(args.debug);

    commands::anime(&args.anime)
}
