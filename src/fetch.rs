use crate::config::HttpConfig;
use crate::error::{ScrapeError, ScrapeResult};
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use tracing::debug;

/// Source of page bodies. Implemented over HTTP for real runs and by
/// in-memory stubs in tests.
pub trait PageFetcher: Sync {
    fn fetch(&self, url: &str) -> ScrapeResult<String>;
}

impl<F: PageFetcher + ?Sized> PageFetcher for &F {
    fn fetch(&self, url: &str) -> ScrapeResult<String> {
        (**self).fetch(url)
    }
}

pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(proxy_url) = config.proxy.url() {
            let proxy = reqwest::Proxy::all(&proxy_url).context("Invalid proxy configuration")?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            user_agents: config.user_agents.clone(),
        })
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or("Mozilla/5.0")
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> ScrapeResult<String> {
        let user_agent = self.pick_user_agent();
        debug!(url, user_agent, "GET");

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .map_err(|source| ScrapeError::Network {
                url: url.to_string(),
                source,
            })?;

        classify_status(url, response.status().as_u16())?;

        response.text().map_err(|source| ScrapeError::Network {
            url: url.to_string(),
            source,
        })
    }
}

/// Maps a status code onto the fetch outcome: 200 is a page, 404 is a
/// confirmed absence, anything else is a transient failure.
pub fn classify_status(url: &str, status: u16) -> ScrapeResult<()> {
    match status {
        200 => Ok(()),
        404 => Err(ScrapeError::NotFound {
            url: url.to_string(),
        }),
        _ => Err(ScrapeError::Status {
            url: url.to_string(),
            status,
        }),
    }
}
