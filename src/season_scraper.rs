use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::PageFetcher;
use crate::html::element_text;
use crate::models::{SeasonAnime, SeasonLink, SeasonPage};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static ARCHIVE_LINK_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table.anime-seasonal-byseason a[href*='/anime/season/']").expect("valid selector")
});
static SEASON_TITLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.h2_anime_title a[href*='/anime/']").expect("valid selector"));

pub struct SeasonScraper<F> {
    fetcher: F,
}

impl<F: PageFetcher> SeasonScraper<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn scrape_archive(&self, url: &str) -> ScrapeResult<Vec<SeasonLink>> {
        let body = self.fetcher.fetch(url)?;
        let links = parse_archive_page(&body);
        if links.is_empty() {
            return Err(ScrapeError::MissingLandmark {
                url: url.to_string(),
                landmark: "season archive table",
            });
        }
        Ok(links)
    }

    /// Every season has titles, so an empty page counts as a failed load.
    pub fn scrape_season(&self, link: &SeasonLink) -> ScrapeResult<SeasonPage> {
        let body = self.fetcher.fetch(&link.url)?;
        let entries = parse_season_page(&body, &link.name);
        if entries.is_empty() {
            return Err(ScrapeError::MissingLandmark {
                url: link.url.clone(),
                landmark: "anime titles",
            });
        }
        Ok(SeasonPage {
            season: link.name.clone(),
            entries,
        })
    }
}

pub fn parse_archive_page(body: &str) -> Vec<SeasonLink> {
    let document = Html::parse_document(body);

    document
        .select(&ARCHIVE_LINK_SEL)
        .filter_map(|a| {
            let name = element_text(a);
            let url = a.value().attr("href")?.trim().to_string();
            (!name.is_empty() && !url.is_empty()).then_some(SeasonLink { name, url })
        })
        .collect()
}

pub fn parse_season_page(body: &str, season: &str) -> Vec<SeasonAnime> {
    let document = Html::parse_document(body);

    document
        .select(&SEASON_TITLE_SEL)
        .filter_map(|a| {
            let url = a.value().attr("href")?.trim().to_string();
            Some(SeasonAnime {
                season: season.to_string(),
                title: element_text(a),
                url,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_archive_links() {
        let body = r#"
            <table class="anime-seasonal-byseason">
              <tr><td><a href="https://myanimelist.net/anime/season/2025/summer">Summer 2025</a></td>
                  <td><a href="https://myanimelist.net/anime/season/2025/spring">Spring 2025</a></td></tr>
            </table>
            <a href="https://myanimelist.net/anime/season/2025/fall">Outside the table</a>
        "#;
        let links = parse_archive_page(body);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].name, "Summer 2025");
        assert_eq!(links[1].url, "https://myanimelist.net/anime/season/2025/spring");
    }

    #[test]
    fn parses_season_titles() {
        let body = r#"
            <div class="seasonal-anime">
              <h2 class="h2_anime_title"><a href="https://myanimelist.net/anime/59027/Spy_x_Family_Season_3" class="link-title">Spy x Family Season 3</a></h2>
            </div>
            <div class="seasonal-anime">
              <h2 class="h2_anime_title"><a href="https://myanimelist.net/anime/52991/Sousou_no_Frieren" class="link-title">Sousou no Frieren</a></h2>
            </div>
        "#;
        let entries = parse_season_page(body, "Fall 2025");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].season, "Fall 2025");
        assert_eq!(entries[1].title, "Sousou no Frieren");
    }
}
