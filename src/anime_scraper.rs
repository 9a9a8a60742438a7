use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::PageFetcher;
use crate::fields::{self, InfoPanel};
use crate::html::{element_text, first_attr, first_text, has_class, text_excluding};
use crate::models::{AnimeRecord, CharacterRef, ExternalLink, RelatedEntry, StreamingPlatform};
use crate::parser;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: Lazy<Selector> = Lazy::new(|| Selector::parse($css).expect("valid selector"));
    };
}

selector!(PANEL_SEL, "h2, div.spaceit_pad");
selector!(LABEL_SEL, "span.dark_text");
selector!(ANCHOR_SEL, "a");
selector!(TITLE_SEL, "h1.title-name, h1.title");
selector!(DESCRIPTION_SEL, r#"p[itemprop="description"]"#);
selector!(IMAGE_SEL, "div.leftside img");
selector!(OG_URL_SEL, r#"meta[property="og:url"]"#);
selector!(CANONICAL_SEL, r#"link[rel="canonical"]"#);
selector!(SCORE_SEL, r#"[itemprop="aggregateRating"] [itemprop="ratingValue"]"#);
selector!(RANKED_SEL, r#"div[data-id="info2"]"#);
selector!(EXTERNAL_LINK_SEL, "div.external_links a.link");
selector!(CAPTION_SEL, ".caption");
selector!(STREAM_SEL, ".broadcast-item.available");
selector!(RELATED_SEL, "div.related-entries div.entry.borderClass");
selector!(RELATED_LINK_SEL, "a[href*='/anime/']");
selector!(RELATION_SEL, ".relation");
selector!(RELATED_TITLE_SEL, ".title a");
selector!(CHARACTER_LINK_SEL, "a[href*='/character/']");
selector!(CHARACTER_NAME_SEL, "h3.h3_character_name");

/// Panel labels whose value is a list of links.
const LIST_LABELS: &[&str] = &[
    "Genre",
    "Genres",
    "Theme",
    "Themes",
    "Studio",
    "Studios",
    "Producer",
    "Producers",
    "Licensor",
    "Licensors",
    "Demographic",
    "Demographics",
];

pub struct AnimeScraper<F> {
    fetcher: F,
}

impl<F: PageFetcher> AnimeScraper<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn scrape(&self, id: u32) -> ScrapeResult<AnimeRecord> {
        self.scrape_url(&parser::anime_url(id), Some(id))
    }

    /// Fetches the anime page and its characters page. A failing
    /// characters page leaves the character list empty.
    pub fn scrape_url(&self, url: &str, id: Option<u32>) -> ScrapeResult<AnimeRecord> {
        let body = self.fetcher.fetch(url)?;
        let mut record = parse_anime_page(&body, url);

        match id {
            Some(id) => record.myanimelist_id = id,
            None if record.myanimelist_id == 0 => {
                return Err(ScrapeError::MissingLandmark {
                    url: url.to_string(),
                    landmark: "anime id",
                });
            }
            None => {}
        }

        // Rate-limit and maintenance pages come back as 200 without the heading.
        if record.title.is_none() {
            return Err(ScrapeError::MissingLandmark {
                url: url.to_string(),
                landmark: "title heading",
            });
        }

        let characters_url = characters_url(&record.source_url);
        match self.fetcher.fetch(&characters_url) {
            Ok(body) => record.characters = parse_characters_page(&body),
            Err(e) => debug!("No characters for {}: {}", record.myanimelist_id, e),
        }

        Ok(record)
    }
}

pub fn characters_url(anime_url: &str) -> String {
    format!("{}/characters", anime_url.trim_end_matches('/'))
}

/// Reads everything the anime page offers into a record. The character
/// list is left empty; it lives on a separate page.
pub fn parse_anime_page(body: &str, request_url: &str) -> AnimeRecord {
    let document = Html::parse_document(body);

    let source_url = first_attr(&document, &OG_URL_SEL, "content")
        .or_else(|| first_attr(&document, &CANONICAL_SEL, "href"))
        .unwrap_or_else(|| request_url.to_string());
    let id = parser::anime_id_from_url(&source_url)
        .or_else(|| parser::anime_id_from_url(request_url))
        .unwrap_or_default();

    let mut record = AnimeRecord::new(id, source_url);
    record.title = first_text(&document, &TITLE_SEL);
    record.description = first_text(&document, &DESCRIPTION_SEL);
    record.image = first_attr(&document, &IMAGE_SEL, "data-src")
        .or_else(|| first_attr(&document, &IMAGE_SEL, "src"));

    record.alternative_titles = read_panel(&document, "Alternative Titles", Some("Information"));

    let mut info = read_panel(&document, "Information", Some("Statistics"));
    for (label, alias) in fields::fix_aliases(&mut info) {
        debug!("{}: filled {} from {}", id, label, alias);
    }
    apply_information(&mut record, &info);

    let stats = read_panel(&document, "Statistics", Some("Available At"));
    apply_statistics(&mut record, &document, &stats);

    record.related_entries = parse_related_entries(&document);
    record.external_links = parse_external_links(&document);
    record.streaming_platforms = parse_streaming_platforms(&document);

    record
}

fn apply_information(record: &mut AnimeRecord, info: &InfoPanel) {
    let get = |label: &str| info.get(label).cloned().filter(|v| !v.is_empty());

    record.media_type = get("Type");
    record.episodes = get("Episodes");
    record.status = get("Status");
    record.aired = get("Aired");
    record.premiered = get("Premiered");
    record.source = get("Source");
    record.genres = get("Genres");
    record.themes = get("Themes");
    record.studios = get("Studios");
    record.producers = get("Producers");
    record.demographic = get("Demographic");
    record.duration = get("Duration");
    record.rating = get("Rating");

    if let Some(premiered) = &record.premiered {
        let (season, year) = parser::split_premiered(premiered);
        record.released_season = season;
        record.released_year = year;
    }
    if let Some(aired) = &record.aired {
        let (from, to) = parser::parse_aired(aired);
        record.aired_from = from;
        record.aired_to = to;
    }
}

fn apply_statistics(record: &mut AnimeRecord, document: &Html, stats: &InfoPanel) {
    record.score = first_text(document, &SCORE_SEL).or_else(|| {
        stats
            .get("Score")
            .and_then(|v| v.split_whitespace().next())
            .map(str::to_string)
    });

    record.ranked = stats.get("Ranked").and_then(|v| parser::extract_rank(v)).or_else(|| {
        document
            .select(&RANKED_SEL)
            .next()
            .map(|div| text_excluding(div, |e| e.name() == "sup"))
            .and_then(|text| parser::extract_rank(&text))
    });

    record.popularity = stats.get("Popularity").and_then(|v| parser::extract_rank(v));
    record.members = stats.get("Members").and_then(|v| parser::extract_count(v));
    record.favorites = stats.get("Favorites").and_then(|v| parser::extract_count(v));
}

/// Reads `label: value` rows between the `start` heading and the `end`
/// heading (or the end of the page).
pub fn read_panel(document: &Html, start: &str, end: Option<&str>) -> InfoPanel {
    let mut panel = InfoPanel::new();
    let mut inside = false;

    for el in document.select(&PANEL_SEL) {
        if el.value().name() == "h2" {
            let heading = element_text(el);
            if !inside {
                inside = heading == start;
            } else if end.map_or(true, |end| heading == end) {
                break;
            }
            continue;
        }

        if inside {
            if let Some((label, value)) = read_panel_row(el) {
                panel.insert(label, value);
            }
        }
    }

    panel
}

fn read_panel_row(row: ElementRef<'_>) -> Option<(String, String)> {
    let label = row.select(&LABEL_SEL).next()?;
    let key = element_text(label).replace(':', "").trim().to_string();
    if key.is_empty() {
        return None;
    }

    let text = text_excluding(row, |e| {
        e.name() == "sup" || (e.name() == "span" && has_class(e, "dark_text"))
    });

    let value = if LIST_LABELS.contains(&key.as_str()) && !text.starts_with("None found") {
        let anchors: Vec<String> = row
            .select(&ANCHOR_SEL)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        if anchors.is_empty() {
            text
        } else {
            anchors.join(", ")
        }
    } else {
        text
    };

    Some((key, value))
}

fn parse_related_entries(document: &Html) -> Vec<RelatedEntry> {
    let mut entries = Vec::new();

    for entry in document.select(&RELATED_SEL) {
        let Some(link) = entry.select(&RELATED_LINK_SEL).next() else {
            continue;
        };
        let Some(title) = entry.select(&RELATED_TITLE_SEL).next() else {
            continue;
        };

        let relation_text = entry.select(&RELATION_SEL).next().map(element_text).unwrap_or_default();
        let relation = relation_text.split('(').next().unwrap_or_default().trim().to_string();
        let url = link.value().attr("href").unwrap_or_default().to_string();

        entries.push(RelatedEntry {
            relation,
            entry_type: parser::parenthesized(&relation_text),
            title: element_text(title),
            id: parser::anime_id_from_url(&url),
            url,
        });
    }

    entries
}

fn parse_external_links(document: &Html) -> Vec<ExternalLink> {
    document
        .select(&EXTERNAL_LINK_SEL)
        .map(|link| {
            let name = link
                .select(&CAPTION_SEL)
                .next()
                .map(element_text)
                .unwrap_or_else(|| element_text(link));
            ExternalLink {
                name,
                url: link.value().attr("href").unwrap_or_default().to_string(),
            }
        })
        .collect()
}

fn parse_streaming_platforms(document: &Html) -> Vec<StreamingPlatform> {
    document
        .select(&STREAM_SEL)
        .map(|item| {
            let platform = item
                .value()
                .attr("title")
                .map(str::to_string)
                .or_else(|| item.select(&CAPTION_SEL).next().map(element_text))
                .unwrap_or_default();
            StreamingPlatform {
                platform,
                url: item.value().attr("href").unwrap_or_default().to_string(),
            }
        })
        .collect()
}

/// Character links from an anime's `/characters` page.
pub fn parse_characters_page(body: &str) -> Vec<CharacterRef> {
    let document = Html::parse_document(body);
    let mut characters = Vec::new();

    for link in document.select(&CHARACTER_LINK_SEL) {
        let Some(name) = link.select(&CHARACTER_NAME_SEL).next() else {
            continue;
        };
        let url = link.value().attr("href").unwrap_or_default().to_string();
        characters.push(CharacterRef {
            id: parser::character_id_from_url(&url),
            name: element_text(name),
            url,
        });
    }

    characters
}
