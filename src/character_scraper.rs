use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::PageFetcher;
use crate::html::{element_text, has_class};
use crate::models::{CharacterAttribute, CharacterListEntry, CharacterRecord};
use crate::parser;
use once_cell::sync::Lazy;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

static HEADER_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.normal_header").expect("valid selector"));
static H2_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").expect("valid selector"));
static SMALL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("small").expect("valid selector"));

/// Ad containers the site injects between the bio and the next section.
const AD_CLASS_MARKERS: &[&str] = &["sUaidzctQfngSNMH", "ad-"];

/// Keys at least this long are prose, not attribute labels.
const MAX_ATTRIBUTE_KEY_CHARS: usize = 50;
const MIN_DESCRIPTION_CHARS: usize = 20;

pub struct CharacterScraper<F> {
    fetcher: F,
}

impl<F: PageFetcher> CharacterScraper<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn scrape(&self, entry: &CharacterListEntry) -> ScrapeResult<CharacterRecord> {
        let body = self.fetcher.fetch(&entry.url)?;
        let mut record = parse_character_page(&body, entry.character_id, &entry.url)?;
        record.name = entry.name.clone();
        record.url = entry.url.clone();
        Ok(record)
    }
}

/// Parses a character page. The name header is the one landmark every
/// character page has; without it the page is rejected.
pub fn parse_character_page(body: &str, character_id: u32, url: &str) -> ScrapeResult<CharacterRecord> {
    let document = Html::parse_document(body);

    let header = find_name_header(&document, url).ok_or_else(|| ScrapeError::MissingLandmark {
        url: url.to_string(),
        landmark: "character name header",
    })?;

    let full_name = header
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| text.trim())
        .find(|text| !text.is_empty())
        .unwrap_or_default()
        .to_string();

    let alternate_name = header
        .select(&SMALL_SEL)
        .next()
        .map(element_text)
        .and_then(|text| parser::parenthesized(&text))
        .unwrap_or_default();

    let (attributes, description) = split_bio(&text_after_header(header));

    Ok(CharacterRecord {
        character_id,
        full_name,
        alternate_name,
        attributes,
        description,
        ..Default::default()
    })
}

fn find_name_header<'a>(document: &'a Html, url: &str) -> Option<ElementRef<'a>> {
    if let Some(header) = document.select(&HEADER_SEL).next() {
        return Some(header);
    }

    // Layout variants without the class: match the slug from the URL.
    let slug = url
        .split("/character/")
        .nth(1)?
        .split('/')
        .nth(1)?
        .replace('_', " ")
        .to_lowercase();
    if slug.is_empty() {
        return None;
    }
    document
        .select(&H2_SEL)
        .find(|h2| element_text(*h2).to_lowercase().replace('_', " ").contains(&slug))
}

/// Text of the header's following siblings up to the next section, with
/// `<br>` turned into line breaks and spoilers inlined.
fn text_after_header(header: ElementRef<'_>) -> String {
    let mut out = String::new();

    for sibling in header.next_siblings() {
        match sibling.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let name = element.name();
                if matches!(name, "table" | "h2" | "h3") || (name == "div" && is_section_break(element)) {
                    break;
                }
                if name == "br" {
                    out.push('\n');
                } else if let Some(el) = ElementRef::wrap(sibling) {
                    if name == "div" && has_class(element, "spoiler") {
                        out.push(' ');
                    }
                    render_text(el, &mut out);
                }
            }
            _ => {}
        }
    }

    out
}

fn is_section_break(element: &scraper::node::Element) -> bool {
    has_class(element, "normal_header")
        || element
            .classes()
            .any(|class| AD_CLASS_MARKERS.iter().any(|marker| class.contains(marker)))
}

fn render_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => match element.name() {
                "br" => out.push('\n'),
                "input" | "script" | "style" => {}
                _ => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        render_text(child_el, out);
                    }
                }
            },
            _ => {}
        }
    }
}

/// Leading `Key: value` lines become attributes; everything from the
/// first line that is not one is the description.
pub fn split_bio(text: &str) -> (Vec<CharacterAttribute>, Option<String>) {
    let mut attributes = Vec::new();
    let mut description_lines = Vec::new();
    let mut in_description = false;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !in_description {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                let value = value.trim();
                if key.chars().count() < MAX_ATTRIBUTE_KEY_CHARS && !value.is_empty() {
                    attributes.push(CharacterAttribute {
                        name: key.to_string(),
                        value: value.to_string(),
                    });
                    continue;
                }
            }
        }
        in_description = true;
        description_lines.push(line);
    }

    let description = parser::normalize_whitespace(&description_lines.join(" "));
    let description = (description.chars().count() > MIN_DESCRIPTION_CHARS).then_some(description);

    (attributes, description)
}
