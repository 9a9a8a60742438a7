//! Flat CSV files: append-only record stores, work-list readers and the
//! dedup/reconcile maintenance passes.

use crate::models::{AnimeCandidate, CharacterListEntry, CharacterRef, SeasonAnime, SeasonPage};
use crate::parser;
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A record with a fixed column layout.
pub trait CsvRecord {
    const HEADERS: &'static [&'static str];

    fn to_csv_record(&self) -> Vec<String>;
}

/// Where finished records go.
pub trait RecordSink<R> {
    fn append(&mut self, record: &R) -> Result<()>;
}

impl<R: Clone> RecordSink<R> for Vec<R> {
    fn append(&mut self, record: &R) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Appends records to a CSV file, writing the header only when the file
/// is new or empty. Every record is flushed as soon as it is written so an
/// interrupted run keeps everything saved so far.
pub struct CsvAppender<R> {
    writer: csv::Writer<File>,
    path: PathBuf,
    written: usize,
    _record: PhantomData<fn(&R)>,
}

impl<R: CsvRecord> CsvAppender<R> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(R::HEADERS)?;
            writer.flush()?;
            debug!("created {}", path.display());
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            written: 0,
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written through this appender.
    pub fn written(&self) -> usize {
        self.written
    }

    fn write_row(&mut self, row: Vec<String>) -> Result<()> {
        self.writer
            .write_record(&row)
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

impl<R: CsvRecord> RecordSink<R> for CsvAppender<R> {
    fn append(&mut self, record: &R) -> Result<()> {
        self.write_row(record.to_csv_record())
    }
}

impl RecordSink<SeasonPage> for CsvAppender<SeasonAnime> {
    fn append(&mut self, page: &SeasonPage) -> Result<()> {
        for entry in &page.entries {
            self.write_row(entry.to_csv_record())?;
        }
        Ok(())
    }
}

/// Writes `records` to a fresh file, replacing whatever was there.
pub fn write_records<R: CsvRecord>(path: impl AsRef<Path>, records: &[R]) -> Result<()> {
    let path = path.as_ref();
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create output file: {}", path.display()))?;
    writer.write_record(R::HEADERS)?;
    for record in records {
        writer.write_record(record.to_csv_record())?;
    }
    writer.flush()?;
    info!("saved {} rows to {}", records.len(), path.display());
    Ok(())
}

/// Appends `records` to `path`, creating it with a header if needed.
/// Returns how many rows were written.
pub fn append_records<R: CsvRecord>(path: impl AsRef<Path>, records: &[R]) -> Result<usize> {
    let mut appender = CsvAppender::<R>::open(path)?;
    for record in records {
        appender.append(record)?;
    }
    info!("appended {} rows to {}", appender.written(), appender.path().display());
    Ok(appender.written())
}

/// Deserializes every row of a CSV file with a header line.
pub fn read_records<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("Failed to open input file: {}", path.display()))?;

    let mut records = Vec::new();
    for (line, result) in reader.deserialize().enumerate() {
        let record = result.with_context(|| format!("Bad row {} in {}", line + 2, path.display()))?;
        records.push(record);
    }
    debug!("loaded {} rows from {}", records.len(), path.display());
    Ok(records)
}

pub fn read_candidates(path: impl AsRef<Path>) -> Result<Vec<AnimeCandidate>> {
    read_records(path)
}

/// Reads a character work list. Rows without a usable id are skipped.
pub fn read_character_list(path: impl AsRef<Path>) -> Result<Vec<CharacterListEntry>> {
    let table = Table::read(path.as_ref())?;
    let id_col = table.column("character_id")?;
    let name_col = table.column("name")?;
    let url_col = table.column("url")?;

    let mut entries = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let Some(character_id) = parser::parse_id_cell(&row[id_col]) else {
            warn!("skipping character row without id: {:?}", row);
            continue;
        };
        entries.push(CharacterListEntry {
            character_id,
            name: row[name_col].clone(),
            url: row[url_col].clone(),
        });
    }
    Ok(entries)
}

/// Ids already present in `column` of an output file. A missing file has
/// none.
pub fn load_id_set(path: impl AsRef<Path>, column: &str) -> Result<HashSet<u32>> {
    let path = path.as_ref();
    if !path.exists() || fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true) {
        return Ok(HashSet::new());
    }

    let table = Table::read(path)?;
    let col = table.column(column)?;
    let ids: HashSet<u32> = table.rows.iter().filter_map(|row| parser::parse_id_cell(&row[col])).collect();
    debug!("{} known ids in {}", ids.len(), path.display());
    Ok(ids)
}

/// Distinct non-blank values of `column`. A missing file has none.
pub fn load_key_set(path: impl AsRef<Path>, column: &str) -> Result<HashSet<String>> {
    let path = path.as_ref();
    if !path.exists() || fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true) {
        return Ok(HashSet::new());
    }

    let table = Table::read(path)?;
    let col = table.column(column)?;
    Ok(table
        .rows
        .iter()
        .map(|row| row[col].trim().to_string())
        .filter(|value| !value.is_empty())
        .collect())
}

/// A CSV file held in memory as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open input file: {}", path.display()))?;

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.with_context(|| format!("Failed to read {}", path.display()))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<usize> {
        match self.headers.iter().position(|h| h == name) {
            Some(index) => Ok(index),
            None => bail!("no column {:?} (have {})", name, self.headers.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupKey {
    /// The combined values of these columns.
    Columns(Vec<String>),
    /// The anime id in the URL held by this column.
    AnimeIdFromUrl(String),
}

#[derive(Debug, Clone)]
pub struct DedupOptions {
    pub key: DedupKey,
    pub drop_columns: Vec<String>,
    /// Output only these columns, in this order.
    pub keep_columns: Option<Vec<String>>,
    pub sort_by: Option<String>,
}

impl DedupOptions {
    pub fn new(key: DedupKey) -> Self {
        Self {
            key,
            drop_columns: Vec::new(),
            keep_columns: None,
            sort_by: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Rows dropped because an earlier row had the same key.
    pub duplicates: usize,
    /// Rows without a derivable key. The first is kept like any other row.
    pub unkeyed: usize,
}

/// Keeps the first row per key. Applying it to its own output changes
/// nothing.
pub fn dedup_table(table: Table, options: &DedupOptions) -> Result<(Table, DedupReport)> {
    let key_columns: Vec<usize> = match &options.key {
        DedupKey::Columns(columns) => columns.iter().map(|c| table.column(c)).collect::<Result<_>>()?,
        DedupKey::AnimeIdFromUrl(column) => vec![table.column(column)?],
    };
    let sort_column = options.sort_by.as_deref().map(|c| table.column(c)).transpose()?;

    let mut report = DedupReport {
        rows_in: table.rows.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    // Keyless rows share one slot, so only the first of them survives.
    for row in table.rows {
        let key = row_key(&row, &options.key, &key_columns);
        if key.is_none() {
            report.unkeyed += 1;
        }
        if seen.insert(key) {
            rows.push(row);
        } else {
            report.duplicates += 1;
        }
    }

    if let Some(col) = sort_column {
        rows.sort_by(|a, b| compare_cells(&a[col], &b[col]));
    }

    let selected = select_columns(&table.headers, options)?;
    let headers = selected.iter().map(|&i| table.headers[i].clone()).collect();
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| selected.iter().map(|&i| row[i].clone()).collect())
        .collect();

    report.rows_out = rows.len();
    Ok((Table { headers, rows }, report))
}

pub fn dedup_file(input: impl AsRef<Path>, output: impl AsRef<Path>, options: &DedupOptions) -> Result<DedupReport> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let table = Table::read(input)?;
    let (deduped, report) = dedup_table(table, options)?;
    deduped.write(output)?;

    info!(
        "{} -> {}: {} rows in, {} out, {} duplicates, {} without key",
        input.display(),
        output.display(),
        report.rows_in,
        report.rows_out,
        report.duplicates,
        report.unkeyed
    );
    Ok(report)
}

fn row_key(row: &[String], key: &DedupKey, columns: &[usize]) -> Option<String> {
    match key {
        DedupKey::AnimeIdFromUrl(_) => parser::anime_id_from_url(&row[columns[0]]).map(|id| id.to_string()),
        DedupKey::Columns(_) => {
            let values: Vec<&str> = columns.iter().map(|&c| row[c].trim()).collect();
            if values.iter().all(|v| v.is_empty()) {
                return None;
            }
            Some(values.join("\u{1f}"))
        }
    }
}

fn select_columns(headers: &[String], options: &DedupOptions) -> Result<Vec<usize>> {
    let base: Vec<usize> = match &options.keep_columns {
        Some(keep) => keep
            .iter()
            .map(|name| match headers.iter().position(|h| h == name) {
                Some(i) => Ok(i),
                None => bail!("no column {:?} to keep", name),
            })
            .collect::<Result<_>>()?,
        None => (0..headers.len()).collect(),
    };
    Ok(base
        .into_iter()
        .filter(|&i| !options.drop_columns.contains(&headers[i]))
        .collect())
}

/// Numbers compare as numbers, everything else as text.
fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub candidates: usize,
    pub remaining: usize,
    pub already_scraped: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// Candidates whose anime id is not in `scraped`, in candidate order, one
/// per id. Candidates whose URL carries no id are dropped.
pub fn remaining_candidates(
    candidates: &[AnimeCandidate],
    scraped: &HashSet<u32>,
) -> (Vec<AnimeCandidate>, ReconcileReport) {
    let mut report = ReconcileReport {
        candidates: candidates.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut remaining = Vec::new();

    for candidate in candidates {
        let Some(id) = parser::anime_id_from_url(&candidate.url) else {
            report.invalid += 1;
            continue;
        };
        if scraped.contains(&id) {
            report.already_scraped += 1;
        } else if !seen.insert(id) {
            report.duplicates += 1;
        } else {
            remaining.push(candidate.clone());
        }
    }

    report.remaining = remaining.len();
    (remaining, report)
}

pub fn reconcile_files(
    candidates_path: impl AsRef<Path>,
    scraped_path: impl AsRef<Path>,
    scraped_column: &str,
    output: impl AsRef<Path>,
) -> Result<ReconcileReport> {
    let candidates = read_candidates(candidates_path)?;
    let scraped = load_id_set(scraped_path, scraped_column)?;
    let (remaining, report) = remaining_candidates(&candidates, &scraped);

    if report.invalid > 0 {
        warn!("{} candidates had no anime id in their URL", report.invalid);
    }
    info!(
        "{} candidates, {} already scraped, {} remaining",
        report.candidates, report.already_scraped, report.remaining
    );
    write_records(output, &remaining)?;
    Ok(report)
}

/// Unique characters referenced by an anime CSV, in first-seen order.
pub fn collect_character_entries(anime_csv: impl AsRef<Path>) -> Result<Vec<CharacterListEntry>> {
    let path = anime_csv.as_ref();
    let table = Table::read(path)?;
    let col = table.column("characters")?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut unreadable = 0;

    for row in &table.rows {
        let cell = row[col].trim();
        if cell.is_empty() {
            continue;
        }
        let Ok(characters) = serde_json::from_str::<Vec<CharacterRef>>(cell) else {
            unreadable += 1;
            continue;
        };
        for character in characters {
            let Some(character_id) = character.id.or_else(|| parser::character_id_from_url(&character.url)) else {
                continue;
            };
            if seen.insert(character_id) {
                entries.push(CharacterListEntry {
                    character_id,
                    name: character.name,
                    url: character.url,
                });
            }
        }
    }

    if unreadable > 0 {
        warn!("{} rows in {} had an unreadable characters cell", unreadable, path.display());
    }
    Ok(entries)
}
