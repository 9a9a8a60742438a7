use anyhow::Result;
use animefinder::commands::{
    self, AnimeArgs, CharactersArgs, CollectCharactersArgs, DedupArgs, MissingArgs, OneArgs, SeasonAnimeArgs,
    SeasonArchiveArgs,
};
use animefinder::logging;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Animefinder - MyAnimeList scraper and CSV toolkit")]
struct Cli {
    /// Enable debug output
    #[clap(short, long, global = true)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect the season links from the season archive
    SeasonArchive(SeasonArchiveArgs),
    /// Collect the anime listed on each season page
    SeasonAnime(SeasonAnimeArgs),
    /// Deduplicate a CSV file by key
    Dedup(DedupArgs),
    /// Write the candidates that have not been scraped yet
    Missing(MissingArgs),
    /// Scrape anime records by id range or from a candidate list
    Anime(AnimeArgs),
    /// Scrape a single anime to JSON and CSV
    One(OneArgs),
    /// Build the character list from scraped anime
    CollectCharacters(CollectCharactersArgs),
    /// Scrape character pages
    Characters(CharactersArgs),
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    match &cli.command {
        Command::SeasonArchive(args) => commands::season_archive(args),
        Command::SeasonAnime(args) => commands::season_anime(args),
        Command::Dedup(args) => commands::dedup(args),
        Command::Missing(args) => commands::missing(args),
        Command::Anime(args) => commands::anime(args),
        Command::One(args) => commands::one(args),
        Command::CollectCharacters(args) => commands::collect_characters(args),
        Command::Characters(args) => commands::characters(args),
    }
}
