//! Command-line arguments and the runner behind each job.

use crate::anime_scraper::AnimeScraper;
use crate::character_scraper::CharacterScraper;
use crate::config::{BatchOptions, DelayRange, HttpConfig, ProxyConfig, RetryBudget, ScrapeConfig, SEASON_ARCHIVE_URL};
use crate::driver::{self, Batch, BatchDriver, BatchSummary, WorkItem};
use crate::error::ScrapeResult;
use crate::fetch::HttpFetcher;
use crate::models::{AnimeCandidate, AnimeRecord, CharacterListEntry, CharacterRecord, SeasonAnime, SeasonLink};
use crate::parser;
use crate::retry::{self, ThreadSleeper};
use crate::season_scraper::SeasonScraper;
use crate::store::{self, CsvAppender, DedupKey, DedupOptions, RecordSink};
use crate::tui::BatchTUI;
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Route requests through the proxy below
    #[clap(long, env = "USE_PROXY", value_parser = clap::builder::FalseyValueParser::new())]
    pub use_proxy: bool,

    /// Proxy host and port
    #[clap(long, env = "PROXY_HOST", default_value = "")]
    pub proxy_host: String,

    #[clap(long, env = "PROXY_USER", default_value = "", hide_env_values = true)]
    pub proxy_user: String,

    #[clap(long, env = "PROXY_PASS", default_value = "", hide_env_values = true)]
    pub proxy_pass: String,

    /// Request timeout in seconds
    #[clap(long, default_value = "30")]
    pub timeout: u64,
}

impl NetworkArgs {
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            timeout: Duration::from_secs(self.timeout),
            proxy: ProxyConfig {
                enabled: self.use_proxy,
                host: self.proxy_host.clone(),
                user: self.proxy_user.clone(),
                pass: self.proxy_pass.clone(),
            },
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Worker threads; 1 scrapes sequentially
    #[clap(long, env = "NUM_WORKERS")]
    pub workers: Option<usize>,

    /// Items handed to the worker pool at a time
    #[clap(long, default_value = "20")]
    pub batch_size: usize,

    /// Consecutive failures before a cooldown (0 never cools down)
    #[clap(long, default_value = "20")]
    pub failure_threshold: usize,

    /// Cooldown length in seconds
    #[clap(long, default_value = "10")]
    pub cooldown: u64,

    /// Shortest pause between requests, in milliseconds
    #[clap(long, default_value = "200")]
    pub delay_min: u64,

    /// Longest pause between requests, in milliseconds
    #[clap(long, default_value = "500")]
    pub delay_max: u64,
}

impl BatchArgs {
    pub fn options(&self, default_workers: usize) -> BatchOptions {
        BatchOptions {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown),
            delay: DelayRange::new(self.delay_min, self.delay_max),
            workers: self.workers.unwrap_or(default_workers).max(1),
            batch_size: self.batch_size,
            stop_after_not_found: None,
        }
    }
}

/// Row window over an input list.
#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// First row to process, 0-based
    #[clap(long, env = "START_INDEX", default_value = "0")]
    pub start_index: usize,

    /// Row to stop before; negative means the end of the list
    #[clap(long, env = "END_INDEX", allow_negative_numbers = true)]
    pub end_index: Option<i64>,
}

impl RangeArgs {
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let end = match self.end_index {
            Some(end) if end >= 0 => (end as usize).min(items.len()),
            _ => items.len(),
        };
        let start = self.start_index.min(end);
        &items[start..end]
    }
}

#[derive(Args, Debug, Clone)]
pub struct SeasonArchiveArgs {
    /// Archive page listing every season
    #[clap(long, default_value = SEASON_ARCHIVE_URL)]
    pub url: String,

    #[clap(short, long, default_value = "mal_season_links.csv")]
    pub output: PathBuf,

    /// Attempts before giving up on the archive page
    #[clap(long, default_value = "10")]
    pub attempts: u32,

    #[clap(flatten)]
    pub network: NetworkArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SeasonAnimeArgs {
    /// Season links CSV written by `season-archive`
    #[clap(long, default_value = "mal_season_links.csv")]
    pub links: PathBuf,

    /// Scrape only this season page
    #[clap(long)]
    pub season_url: Option<String>,

    /// Name to record for --season-url
    #[clap(long)]
    pub season_name: Option<String>,

    #[clap(short, long, default_value = "mal_all_season_anime.csv")]
    pub output: PathBuf,

    /// Attempts per season page before it counts as failed
    #[clap(long, default_value = "10")]
    pub attempts: u32,

    #[clap(flatten)]
    pub range: RangeArgs,

    #[clap(flatten)]
    pub network: NetworkArgs,

    #[clap(flatten)]
    pub batch: BatchArgs,
}

/// Layouts produced by the other jobs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPreset {
    /// Season anime: one row per anime id in `url`, keeping `title,url`
    SeasonAnime,
    /// Anime records: one row per `myanimelist_id`, without `csv_index`
    Anime,
    /// Season links: one row per `(name,url)`, sorted by `url`
    SeasonLinks,
}

impl DedupPreset {
    pub fn options(self) -> DedupOptions {
        match self {
            DedupPreset::SeasonAnime => DedupOptions {
                keep_columns: Some(vec!["title".to_string(), "url".to_string()]),
                ..DedupOptions::new(DedupKey::AnimeIdFromUrl("url".to_string()))
            },
            DedupPreset::Anime => DedupOptions {
                drop_columns: vec!["csv_index".to_string()],
                ..DedupOptions::new(DedupKey::Columns(vec!["myanimelist_id".to_string()]))
            },
            DedupPreset::SeasonLinks => DedupOptions {
                sort_by: Some("url".to_string()),
                ..DedupOptions::new(DedupKey::Columns(vec!["name".to_string(), "url".to_string()]))
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DedupArgs {
    pub input: PathBuf,

    pub output: PathBuf,

    #[clap(long, value_enum)]
    pub preset: Option<DedupPreset>,

    /// Key columns, comma separated
    #[clap(long, value_delimiter = ',')]
    pub key: Vec<String>,

    /// Key on the anime id found in this URL column
    #[clap(long)]
    pub anime_id_from: Option<String>,

    /// Columns to leave out
    #[clap(long, value_delimiter = ',')]
    pub drop: Vec<String>,

    /// Output only these columns
    #[clap(long, value_delimiter = ',')]
    pub keep: Vec<String>,

    /// Stable sort of the output by this column
    #[clap(long)]
    pub sort_by: Option<String>,
}

impl DedupArgs {
    /// Preset first, then any explicit flag on top of it.
    pub fn options(&self) -> Result<DedupOptions> {
        let key = if let Some(column) = &self.anime_id_from {
            Some(DedupKey::AnimeIdFromUrl(column.clone()))
        } else if !self.key.is_empty() {
            Some(DedupKey::Columns(self.key.clone()))
        } else {
            None
        };

        let mut options = match (self.preset, key) {
            (Some(preset), key) => {
                let mut options = preset.options();
                if let Some(key) = key {
                    options.key = key;
                }
                options
            }
            (None, Some(key)) => DedupOptions::new(key),
            (None, None) => bail!("dedup needs --preset, --key or --anime-id-from"),
        };

        if !self.drop.is_empty() {
            options.drop_columns = self.drop.clone();
        }
        if !self.keep.is_empty() {
            options.keep_columns = Some(self.keep.clone());
        }
        if self.sort_by.is_some() {
            options.sort_by = self.sort_by.clone();
        }
        Ok(options)
    }
}

#[derive(Args, Debug, Clone)]
pub struct MissingArgs {
    /// Candidate list (`title,url`)
    #[clap(long, default_value = "mal_all_season_anime_dedup.csv")]
    pub candidates: PathBuf,

    /// Output of the anime job
    #[clap(long, default_value = "mal_anime.csv")]
    pub scraped: PathBuf,

    #[clap(long, default_value = "myanimelist_id")]
    pub id_column: String,

    #[clap(short, long, default_value = "mal_missing_anime.csv")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct AnimeArgs {
    /// First id of an id scan
    #[clap(long, env = "START_ID")]
    pub start_id: Option<u32>,

    /// Last id of an id scan, inclusive
    #[clap(long, env = "END_ID")]
    pub end_id: Option<u32>,

    /// Scrape the rows of this candidate list instead of an id range
    #[clap(long)]
    pub candidates: Option<PathBuf>,

    #[clap(short, long, default_value = "mal_anime.csv")]
    pub output: PathBuf,

    /// End an id scan after this many consecutive missing ids
    #[clap(long)]
    pub stop_after_not_found: Option<usize>,

    /// Re-fetches allowed for an ordinary missing field
    #[clap(long, default_value = "5")]
    pub max_retries: u32,

    /// Re-fetches allowed for a missing character list
    #[clap(long, default_value = "2")]
    pub max_character_retries: u32,

    #[clap(flatten)]
    pub range: RangeArgs,

    #[clap(flatten)]
    pub network: NetworkArgs,

    #[clap(flatten)]
    pub batch: BatchArgs,
}

impl AnimeArgs {
    pub fn scrape_config(&self) -> ScrapeConfig {
        let mut batch = self.batch.options(1);
        batch.stop_after_not_found = self.stop_after_not_found;
        ScrapeConfig {
            http: self.network.http_config(),
            retry: RetryBudget {
                full: self.max_retries,
                limited: self.max_character_retries,
                ..Default::default()
            },
            batch,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct OneArgs {
    /// Anime id or URL
    pub anime: String,

    /// Directory for the JSON document
    #[clap(long, default_value = ".")]
    pub json_dir: PathBuf,

    /// CSV the record is appended to
    #[clap(long, default_value = "anime_summary.csv")]
    pub csv: PathBuf,

    #[clap(flatten)]
    pub network: NetworkArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CollectCharactersArgs {
    /// Output of the anime job
    #[clap(long, default_value = "mal_anime.csv")]
    pub input: PathBuf,

    #[clap(short, long, default_value = "mal_characters_list.csv")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CharactersArgs {
    /// Character list (`character_id,name,url`)
    #[clap(long, default_value = "mal_characters_list.csv")]
    pub input: PathBuf,

    #[clap(short, long, default_value = "mal_characters.csv")]
    pub output: PathBuf,

    /// Attempts per character page
    #[clap(long, default_value = "3")]
    pub attempts: u32,

    #[clap(flatten)]
    pub range: RangeArgs,

    #[clap(flatten)]
    pub network: NetworkArgs,

    #[clap(flatten)]
    pub batch: BatchArgs,
}

pub fn season_archive(args: &SeasonArchiveArgs) -> Result<()> {
    let fetcher = HttpFetcher::new(&args.network.http_config())?;
    let scraper = SeasonScraper::new(&fetcher);
    let delay = RetryBudget::default().delay;

    let links = retry::with_attempts(args.attempts, delay, &ThreadSleeper, || scraper.scrape_archive(&args.url))
        .with_context(|| format!("Failed to read season archive {}", args.url))?;

    let written = store::append_records(&args.output, &links)?;
    println!("Appended {} season links to {}", written, args.output.display());
    Ok(())
}

pub fn season_anime(args: &SeasonAnimeArgs) -> Result<()> {
    let links: Vec<SeasonLink> = match &args.season_url {
        Some(url) => vec![SeasonLink {
            name: args.season_name.clone().unwrap_or_else(|| url.clone()),
            url: url.clone(),
        }],
        None => store::read_records(&args.links)?,
    };
    let links = args.range.slice(&links);

    let done = store::load_key_set(&args.output, "season")?;
    let pending: Vec<SeasonLink> = links.iter().filter(|l| !done.contains(&l.name)).cloned().collect();
    let skipped = links.len() - pending.len();

    let fetcher = HttpFetcher::new(&args.network.http_config())?;
    let scraper = SeasonScraper::new(&fetcher);
    let options = args.batch.options(1);
    let delay = RetryBudget::default().delay;
    let sleeper = ThreadSleeper;
    let mut progress = BatchTUI::for_workers(options.workers);
    let mut sink = CsvAppender::<SeasonAnime>::open(&args.output)?;

    let summary = BatchDriver::new(options, &sleeper, &mut progress).run(
        Batch {
            name: "season anime",
            items: &pending,
            skipped,
        },
        |link| retry::with_attempts(args.attempts, delay, &sleeper, || scraper.scrape_season(link)),
        &mut sink,
    )?;

    println!(
        "Saved {} seasons ({} titles) to {}",
        summary.saved,
        sink.written(),
        args.output.display()
    );
    Ok(())
}

pub fn dedup(args: &DedupArgs) -> Result<()> {
    let options = args.options()?;
    let report = store::dedup_file(&args.input, &args.output, &options)?;

    println!("Original rows: {}", report.rows_in);
    println!("After dedup: {}", report.rows_out);
    println!("Removed: {} duplicates, {} without key", report.duplicates, report.unkeyed);
    println!("Saved to: {}", args.output.display());
    Ok(())
}

pub fn missing(args: &MissingArgs) -> Result<()> {
    let report = store::reconcile_files(&args.candidates, &args.scraped, &args.id_column, &args.output)?;

    println!("Candidates: {}", report.candidates);
    println!("Already scraped: {}", report.already_scraped);
    println!("Remaining: {} (saved to {})", report.remaining, args.output.display());
    if report.invalid > 0 || report.duplicates > 0 {
        println!("Dropped: {} without anime id, {} duplicates", report.invalid, report.duplicates);
    }
    Ok(())
}

pub fn anime(args: &AnimeArgs) -> Result<()> {
    let config = args.scrape_config();
    let fetcher = HttpFetcher::new(&config.http)?;
    let scraper = AnimeScraper::new(&fetcher);

    let summary = match &args.candidates {
        Some(path) => {
            let candidates = store::read_candidates(path)?;
            let candidates = args.range.slice(&candidates).to_vec();
            run_anime_batch(
                &args.output,
                &config,
                "anime candidates",
                candidates,
                |c: &AnimeCandidate| parser::anime_id_from_url(&c.url),
                |c: &AnimeCandidate| scraper.scrape_url(&c.url, parser::anime_id_from_url(&c.url)),
            )?
        }
        None => {
            let (Some(start), Some(end)) = (args.start_id, args.end_id) else {
                bail!("anime needs --candidates or both --start-id and --end-id");
            };
            if start > end {
                bail!("--start-id {} is after --end-id {}", start, end);
            }
            let ids: Vec<u32> = (start..=end).collect();
            run_anime_batch(
                &args.output,
                &config,
                "anime ids",
                ids,
                |id: &u32| Some(*id),
                |id: &u32| scraper.scrape(*id),
            )?
        }
    };

    println!("Saved {} anime to {}", summary.saved, args.output.display());
    Ok(())
}

fn run_anime_batch<I, K, J>(
    output: &Path,
    config: &ScrapeConfig,
    name: &str,
    items: Vec<I>,
    key: K,
    fetch: J,
) -> Result<BatchSummary>
where
    I: WorkItem + Sync,
    K: Fn(&I) -> Option<u32>,
    J: Fn(&I) -> ScrapeResult<AnimeRecord> + Sync,
{
    let known = store::load_id_set(output, "myanimelist_id")?;
    let (items, skipped) = driver::skip_known(items, &known, key);

    let sleeper = ThreadSleeper;
    let mut progress = BatchTUI::for_workers(config.batch.workers);
    let mut sink = CsvAppender::<AnimeRecord>::open(output)?;

    BatchDriver::new(config.batch.clone(), &sleeper, &mut progress).run(
        Batch {
            name,
            items: &items,
            skipped,
        },
        |item| {
            let record = fetch(item)?;
            let report = retry::fill_missing(record, &config.retry, &sleeper, || fetch(item));
            Ok(report.record)
        },
        &mut sink,
    )
}

pub fn one(args: &OneArgs) -> Result<()> {
    let url = parser::anime_url_from_ref(&args.anime);
    let id = parser::anime_id_from_url(&url);
    let fetcher = HttpFetcher::new(&args.network.http_config())?;
    let scraper = AnimeScraper::new(&fetcher);

    info!("fetching {}", url);
    let record = scraper
        .scrape_url(&url, id)
        .with_context(|| format!("Failed to scrape {}", url))?;
    let report = retry::fill_missing(record, &RetryBudget::default(), &ThreadSleeper, || {
        scraper.scrape_url(&url, id)
    });
    let record = report.record;

    let json_path = args.json_dir.join(format!("anime_{}.json", record.myanimelist_id));
    let json = serde_json::to_string_pretty(&record)?;
    fs::write(&json_path, json).with_context(|| format!("Failed to write {}", json_path.display()))?;

    CsvAppender::<AnimeRecord>::open(&args.csv)?.append(&record)?;

    println!("{} ({} characters)", record.display_title(), record.characters.len());
    println!("JSON saved to: {}", json_path.display());
    println!("CSV row appended to: {}", args.csv.display());
    Ok(())
}

pub fn collect_characters(args: &CollectCharactersArgs) -> Result<()> {
    let entries = store::collect_character_entries(&args.input)?;
    store::write_records(&args.output, &entries)?;
    println!("Saved {} unique characters to {}", entries.len(), args.output.display());
    Ok(())
}

pub fn characters(args: &CharactersArgs) -> Result<()> {
    let entries = store::read_character_list(&args.input)?;
    let entries = args.range.slice(&entries).to_vec();

    let known = store::load_id_set(&args.output, "character_id")?;
    let (entries, skipped) = driver::skip_known(entries, &known, |e: &CharacterListEntry| Some(e.character_id));

    let fetcher = HttpFetcher::new(&args.network.http_config())?;
    let scraper = CharacterScraper::new(&fetcher);
    let options = args.batch.options(5);
    let delay = RetryBudget::default().delay;
    let sleeper = ThreadSleeper;
    let mut progress = BatchTUI::for_workers(options.workers);
    let mut sink = CsvAppender::<CharacterRecord>::open(&args.output)?;

    let summary = BatchDriver::new(options, &sleeper, &mut progress).run(
        Batch {
            name: "characters",
            items: &entries,
            skipped,
        },
        |entry| retry::with_attempts(args.attempts, delay, &sleeper, || scraper.scrape(entry)),
        &mut sink,
    )?;

    println!("Saved {} characters to {}", summary.saved, args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup_args() -> DedupArgs {
        DedupArgs {
            input: PathBuf::from("in.csv"),
            output: PathBuf::from("out.csv"),
            preset: None,
            key: Vec::new(),
            anime_id_from: None,
            drop: Vec::new(),
            keep: Vec::new(),
            sort_by: None,
        }
    }

    #[test]
    fn range_slices_within_bounds() {
        let items: Vec<u32> = (0..10).collect();
        let range = |start, end| RangeArgs {
            start_index: start,
            end_index: end,
        };

        assert_eq!(range(0, None).slice(&items).len(), 10);
        assert_eq!(range(3, Some(5)).slice(&items), &[3, 4]);
        assert_eq!(range(8, Some(-1)).slice(&items), &[8, 9]);
        assert_eq!(range(7, Some(100)).slice(&items), &[7, 8, 9]);
        assert!(range(20, None).slice(&items).is_empty());
        assert!(range(6, Some(2)).slice(&items).is_empty());
    }

    #[test]
    fn dedup_needs_a_key() {
        assert!(dedup_args().options().is_err());
    }

    #[test]
    fn explicit_flags_override_preset() {
        let mut args = dedup_args();
        args.preset = Some(DedupPreset::Anime);
        args.sort_by = Some("title".to_string());

        let options = args.options().unwrap();
        assert_eq!(options.key, DedupKey::Columns(vec!["myanimelist_id".to_string()]));
        assert_eq!(options.drop_columns, vec!["csv_index"]);
        assert_eq!(options.sort_by.as_deref(), Some("title"));
    }

    #[test]
    fn season_anime_preset_keys_on_url_id() {
        let options = DedupPreset::SeasonAnime.options();
        assert_eq!(options.key, DedupKey::AnimeIdFromUrl("url".to_string()));
        assert_eq!(options.keep_columns, Some(vec!["title".to_string(), "url".to_string()]));
    }

    #[test]
    fn batch_args_fall_back_to_job_default_workers() {
        let args = BatchArgs {
            workers: None,
            batch_size: 20,
            failure_threshold: 20,
            cooldown: 10,
            delay_min: 200,
            delay_max: 500,
        };
        assert_eq!(args.options(5).workers, 5);
        assert_eq!(args.options(1).cooldown, Duration::from_secs(10));
    }

    #[test]
    fn proxy_flags_reach_http_config() {
        let network = NetworkArgs {
            use_proxy: true,
            proxy_host: "proxy:8080".to_string(),
            proxy_user: "u".to_string(),
            proxy_pass: "p".to_string(),
            timeout: 5,
        };
        let http = network.http_config();
        assert_eq!(http.proxy.url().as_deref(), Some("http://u:p@proxy:8080"));
        assert_eq!(http.timeout, Duration::from_secs(5));
    }
}
