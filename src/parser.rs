use crate::config::BASE_URL;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static ANIME_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/anime/(\d+)").expect("valid regex"));
static CHARACTER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/character/(\d+)").expect("valid regex"));
static RANK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\s*([\d,]+)").expect("valid regex"));
static COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d[\d,]*)").expect("valid regex"));
static SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(winter|spring|summer|fall)").expect("valid regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})").expect("valid regex"));
static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").expect("valid regex"));

pub fn anime_id_from_url(url: &str) -> Option<u32> {
    ANIME_ID_RE.captures(url)?.get(1)?.as_str().parse().ok()
}

pub fn character_id_from_url(url: &str) -> Option<u32> {
    CHARACTER_ID_RE.captures(url)?.get(1)?.as_str().parse().ok()
}

/// Accepts a bare id (`59027`) or a full anime URL.
pub fn anime_url_from_ref(anime_ref: &str) -> String {
    let anime_ref = anime_ref.trim();
    if !anime_ref.is_empty() && anime_ref.chars().all(|c| c.is_ascii_digit()) {
        anime_url(anime_ref.parse().unwrap_or_default())
    } else {
        anime_ref.to_string()
    }
}

pub fn anime_url(id: u32) -> String {
    format!("{}/anime/{}", BASE_URL, id)
}

/// Ranking and popularity widgets read like `Ranked: #1,234`.
pub fn extract_rank(text: &str) -> Option<String> {
    let digits = RANK_RE.captures(text)?.get(1)?.as_str();
    Some(format!("#{}", digits))
}

/// First run of digits (with thousands separators), e.g. member counts.
pub fn extract_count(text: &str) -> Option<String> {
    COUNT_RE
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().trim_end_matches(',').to_string())
}

/// Splits `Spring 1998` into its season and year.
pub fn split_premiered(premiered: &str) -> (Option<String>, Option<i32>) {
    let season = SEASON_RE.captures(premiered).and_then(|c| c.get(1)).map(|m| {
        let lower = m.as_str().to_lowercase();
        let mut chars = lower.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    });
    let year = YEAR_RE
        .captures(premiered)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    (season, year)
}

/// Parses `Apr 3, 1998 to Apr 24, 1999`. Partial or unknown dates give `None`.
pub fn parse_aired(aired: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let aired = normalize_whitespace(aired);
    let mut parts = aired.splitn(2, " to ");
    let from = parts.next().and_then(parse_date_string);
    let to = parts.next().and_then(parse_date_string);
    (from, to)
}

fn parse_date_string(date_str: &str) -> Option<NaiveDate> {
    let formats = [
        "%b %d, %Y", // Apr 3, 1998
        "%B %d, %Y", // April 3, 1998
        "%Y-%m-%d",
    ];

    let date_str = date_str.trim();
    for format in &formats {
        if let Ok(date) = NaiveDate::parse_from_str(date_str, format) {
            return Some(date);
        }
    }

    None
}

/// Text inside the first pair of parentheses.
pub fn parenthesized(text: &str) -> Option<String> {
    PAREN_RE
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().trim().to_string())
}

/// Reads an id cell. Spreadsheet tools sometimes write ids as `123.0`.
pub fn parse_id_cell(cell: &str) -> Option<u32> {
    let cell = cell.trim();
    if let Ok(id) = cell.parse::<u32>() {
        return Some(id);
    }
    let value = cell.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
