pub mod anime_scraper;
pub mod character_scraper;
pub mod commands;
pub mod config;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod fields;
pub mod html;
pub mod logging;
pub mod models;
pub mod parser;
pub mod retry;
pub mod season_scraper;
pub mod store;
pub mod tui;

pub use error::{ScrapeError, ScrapeResult};
