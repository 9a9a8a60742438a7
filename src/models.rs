use crate::store::CsvRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A character as listed on an anime's `/characters` page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRef {
    #[serde(alias = "character_id")]
    pub id: Option<u32>,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntry {
    pub relation: String,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub title: String,
    pub id: Option<u32>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingPlatform {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimeRecord {
    pub myanimelist_id: u32,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(rename = "Type")]
    pub media_type: Option<String>,
    #[serde(rename = "Episodes")]
    pub episodes: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "Aired")]
    pub aired: Option<String>,
    pub aired_from: Option<NaiveDate>,
    pub aired_to: Option<NaiveDate>,
    #[serde(rename = "Premiered")]
    pub premiered: Option<String>,
    #[serde(rename = "Released_Season")]
    pub released_season: Option<String>,
    #[serde(rename = "Released_Year")]
    pub released_year: Option<i32>,
    #[serde(rename = "Source")]
    pub source: Option<String>,
    #[serde(rename = "Genres")]
    pub genres: Option<String>,
    #[serde(rename = "Themes")]
    pub themes: Option<String>,
    #[serde(rename = "Studios")]
    pub studios: Option<String>,
    #[serde(rename = "Producers")]
    pub producers: Option<String>,
    #[serde(rename = "Demographic")]
    pub demographic: Option<String>,
    #[serde(rename = "Duration")]
    pub duration: Option<String>,
    #[serde(rename = "Rating")]
    pub rating: Option<String>,
    #[serde(rename = "Score")]
    pub score: Option<String>,
    #[serde(rename = "Ranked")]
    pub ranked: Option<String>,
    #[serde(rename = "Popularity")]
    pub popularity: Option<String>,
    #[serde(rename = "Members")]
    pub members: Option<String>,
    #[serde(rename = "Favorites")]
    pub favorites: Option<String>,
    /// Synonyms, Japanese, English and whatever else the panel lists.
    pub alternative_titles: BTreeMap<String, String>,
    pub characters: Vec<CharacterRef>,
    pub related_entries: Vec<RelatedEntry>,
    pub external_links: Vec<ExternalLink>,
    pub streaming_platforms: Vec<StreamingPlatform>,
    pub source_url: String,
}

impl AnimeRecord {
    pub fn new(myanimelist_id: u32, source_url: impl Into<String>) -> Self {
        Self {
            myanimelist_id,
            source_url: source_url.into(),
            ..Default::default()
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}

impl CsvRecord for AnimeRecord {
    const HEADERS: &'static [&'static str] = &[
        "myanimelist_id",
        "title",
        "description",
        "image",
        "Type",
        "Episodes",
        "Status",
        "Aired",
        "aired_from",
        "aired_to",
        "Premiered",
        "Released_Season",
        "Released_Year",
        "Source",
        "Genres",
        "Themes",
        "Studios",
        "Producers",
        "Demographic",
        "Duration",
        "Rating",
        "Score",
        "Ranked",
        "Popularity",
        "Members",
        "Favorites",
        "alternative_titles",
        "characters",
        "related_entries",
        "external_links",
        "streaming_platforms",
        "source_url",
    ];

    fn to_csv_record(&self) -> Vec<String> {
        vec![
            self.myanimelist_id.to_string(),
            text_cell(&self.title),
            text_cell(&self.description),
            text_cell(&self.image),
            text_cell(&self.media_type),
            text_cell(&self.episodes),
            text_cell(&self.status),
            text_cell(&self.aired),
            date_cell(self.aired_from),
            date_cell(self.aired_to),
            text_cell(&self.premiered),
            text_cell(&self.released_season),
            self.released_year.map(|y| y.to_string()).unwrap_or_default(),
            text_cell(&self.source),
            text_cell(&self.genres),
            text_cell(&self.themes),
            text_cell(&self.studios),
            text_cell(&self.producers),
            text_cell(&self.demographic),
            text_cell(&self.duration),
            text_cell(&self.rating),
            text_cell(&self.score),
            text_cell(&self.ranked),
            text_cell(&self.popularity),
            text_cell(&self.members),
            text_cell(&self.favorites),
            json_cell(&self.alternative_titles),
            json_cell(&self.characters),
            json_cell(&self.related_entries),
            json_cell(&self.external_links),
            json_cell(&self.streaming_platforms),
            self.source_url.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterAttribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub character_id: u32,
    pub full_name: String,
    pub alternate_name: String,
    /// Name as given in the input list.
    pub name: String,
    pub url: String,
    pub attributes: Vec<CharacterAttribute>,
    pub description: Option<String>,
}

impl CsvRecord for CharacterRecord {
    const HEADERS: &'static [&'static str] = &[
        "character_id",
        "full_name",
        "alternate_name",
        "name",
        "url",
        "attributes",
        "description",
    ];

    fn to_csv_record(&self) -> Vec<String> {
        let attributes = if self.attributes.is_empty() {
            String::new()
        } else {
            json_cell(&self.attributes)
        };
        vec![
            self.character_id.to_string(),
            self.full_name.clone(),
            self.alternate_name.clone(),
            self.name.clone(),
            self.url.clone(),
            attributes,
            text_cell(&self.description),
        ]
    }
}

/// A row of the character work list, as collected from anime records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterListEntry {
    pub character_id: u32,
    pub name: String,
    pub url: String,
}

impl CsvRecord for CharacterListEntry {
    const HEADERS: &'static [&'static str] = &["character_id", "name", "url"];

    fn to_csv_record(&self) -> Vec<String> {
        vec![self.character_id.to_string(), self.name.clone(), self.url.clone()]
    }
}

/// One season of the archive, e.g. `Summer 2025`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonLink {
    pub name: String,
    pub url: String,
}

impl CsvRecord for SeasonLink {
    const HEADERS: &'static [&'static str] = &["name", "url"];

    fn to_csv_record(&self) -> Vec<String> {
        vec![self.name.clone(), self.url.clone()]
    }
}

/// An anime listed on a season page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonAnime {
    pub season: String,
    pub title: String,
    pub url: String,
}

impl CsvRecord for SeasonAnime {
    const HEADERS: &'static [&'static str] = &["season", "title", "url"];

    fn to_csv_record(&self) -> Vec<String> {
        vec![self.season.clone(), self.title.clone(), self.url.clone()]
    }
}

/// Everything one season page produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonPage {
    pub season: String,
    pub entries: Vec<SeasonAnime>,
}

/// A row of the anime work list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeCandidate {
    pub title: String,
    pub url: String,
}

impl CsvRecord for AnimeCandidate {
    const HEADERS: &'static [&'static str] = &["title", "url"];

    fn to_csv_record(&self) -> Vec<String> {
        vec![self.title.clone(), self.url.clone()]
    }
}

fn text_cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn date_cell(value: Option<NaiveDate>) -> String {
    value.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn json_cell<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
