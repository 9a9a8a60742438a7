#![allow(dead_code)]

use animefinder::error::{ScrapeError, ScrapeResult};
use animefinder::fetch::PageFetcher;
use animefinder::retry::Sleeper;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Debug)]
pub enum Reply {
    Page(String),
    Status(u16),
}

/// Serves canned replies per URL. Queued replies are used in order and
/// the last one repeats. Unknown URLs are 404s.
#[derive(Default)]
pub struct StubFetcher {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: impl Into<String>) -> Self {
        self.reply(url, Reply::Page(body.into()))
    }

    pub fn status(self, url: &str, status: u16) -> Self {
        self.reply(url, Reply::Status(status))
    }

    fn reply(self, url: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl PageFetcher for StubFetcher {
    fn fetch(&self, url: &str) -> ScrapeResult<String> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Page(body)) => Ok(body),
            Some(Reply::Status(status)) if status != 404 => Err(ScrapeError::Status {
                url: url.to_string(),
                status,
            }),
            _ => Err(ScrapeError::NotFound { url: url.to_string() }),
        }
    }
}

pub struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _: Duration) {}
}

pub fn anime_url(id: u32, slug: &str) -> String {
    format!("https://myanimelist.net/anime/{}/{}", id, slug)
}

/// An anime page in the site's layout. `genre_label` is the label the
/// genre row carries (`Genres` or `Genre`); `rating` of `None` leaves the
/// row out.
pub fn anime_page(id: u32, slug: &str, genre_label: &str, rating: Option<&str>) -> String {
    let rating_row = rating
        .map(|r| format!(r#"<div class="spaceit_pad"><span class="dark_text">Rating:</span> {}</div>"#, r))
        .unwrap_or_default();
    let title = slug.replace('_', " ");

    format!(
        r#"<html><head>
          <meta property="og:url" content="{url}" />
        </head><body>
          <h1 class="title-name"><strong>{title}</strong></h1>
          <div class="leftside">
            <img data-src="https://cdn.myanimelist.net/images/anime/{id}.jpg" />
            <h2>Alternative Titles</h2>
            <div class="spaceit_pad"><span class="dark_text">English:</span> {title}</div>
            <h2>Information</h2>
            <div class="spaceit_pad"><span class="dark_text">Type:</span> <a href="/topanime.php?type=tv">TV</a></div>
            <div class="spaceit_pad"><span class="dark_text">Episodes:</span> Unknown</div>
            <div class="spaceit_pad"><span class="dark_text">Status:</span> Currently Airing</div>
            <div class="spaceit_pad"><span class="dark_text">Aired:</span> Oct 4, 2025 to ?</div>
            <div class="spaceit_pad"><span class="dark_text">Premiered:</span> <a href="/anime/season/2025/fall">Fall 2025</a></div>
            <div class="spaceit_pad"><span class="dark_text">Producers:</span> <a href="/anime/producer/1">Aniplex</a>, <a href="/anime/producer/2">Dentsu</a></div>
            <div class="spaceit_pad"><span class="dark_text">Studios:</span> <a href="/anime/producer/3">Madhouse</a></div>
            <div class="spaceit_pad"><span class="dark_text">Source:</span> Manga</div>
            <div class="spaceit_pad"><span class="dark_text">{genre_label}:</span>
              <span itemprop="genre" style="display: none">Adventure</span><a href="/anime/genre/2">Adventure</a>,
              <span itemprop="genre" style="display: none">Fantasy</span><a href="/anime/genre/10">Fantasy</a>
            </div>
            <div class="spaceit_pad"><span class="dark_text">Theme:</span> <a href="/anime/genre/29">Mythology</a></div>
            <div class="spaceit_pad"><span class="dark_text">Demographic:</span> <a href="/anime/genre/27">Shounen</a></div>
            <div class="spaceit_pad"><span class="dark_text">Duration:</span> 24 min. per ep.</div>
            {rating_row}
            <h2>Statistics</h2>
            <div class="spaceit_pad"><span class="dark_text">Score:</span> 9.01 (scored by 100,000 users)</div>
            <div class="spaceit_pad po-r js-statistics-info di-ib" data-id="info2">
              <span class="dark_text">Ranked:</span> #1<sup>2</sup>
            </div>
            <div class="spaceit_pad"><span class="dark_text">Popularity:</span> #150</div>
            <div class="spaceit_pad"><span class="dark_text">Members:</span> 1,200,000</div>
            <div class="spaceit_pad"><span class="dark_text">Favorites:</span> 40,000</div>
            <h2>Available At</h2>
          </div>
          <p itemprop="description">A journey after the end of another journey.</p>
        </body></html>"#,
        url = anime_url(id, slug),
        title = title,
        id = id,
        genre_label = genre_label,
        rating_row = rating_row,
    )
}

pub fn characters_page(characters: &[(u32, &str)]) -> String {
    let rows: Vec<String> = characters
        .iter()
        .map(|(id, name)| {
            format!(
                r#"<tr><td><a href="https://myanimelist.net/character/{id}/X"><h3 class="h3_character_name">{name}</h3></a></td></tr>"#,
                id = id,
                name = name
            )
        })
        .collect();
    format!("<html><body><table>{}</table></body></html>", rows.join(""))
}

pub fn character_page(name: &str, bio: &str) -> String {
    format!(
        r#"<html><body><table><tr><td>
          <h2 class="normal_header">{name} <span><small>({name})</small></span></h2>
          {bio}
          <div class="normal_header">Animeography</div>
        </td></tr></table></body></html>"#,
        name = name,
        bio = bio
    )
}
