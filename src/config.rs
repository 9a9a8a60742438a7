use rand::Rng;
use std::time::Duration;

pub const BASE_URL: &str = "https://myanimelist.net";
pub const SEASON_ARCHIVE_URL: &str = "https://myanimelist.net/anime/season/archive";

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/130.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
];

/// Randomized pause between requests, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const NONE: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn pick(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub user: String,
    pub pass: String,
}

impl ProxyConfig {
    /// Proxy URL with the credentials embedded, or `None` when proxying is off.
    pub fn url(&self) -> Option<String> {
        if !self.enabled || self.host.is_empty() {
            return None;
        }
        if self.user.is_empty() {
            Some(format!("http://{}", self.host))
        } else {
            Some(format!("http://{}:{}@{}", self.user, self.pass, self.host))
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agents: Vec<String>,
    pub proxy: ProxyConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agents: USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            proxy: ProxyConfig::default(),
        }
    }
}

/// How many extra fetches a record may spend on its missing fields.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    /// Budget for ordinary fields.
    pub full: u32,
    /// Budget for fields that are expensive or often legitimately empty.
    pub limited: u32,
    pub delay: DelayRange,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            full: 5,
            limited: 2,
            delay: DelayRange::new(100, 500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Consecutive non-successes that trigger a cooldown.
    pub failure_threshold: usize,
    pub cooldown: Duration,
    /// Politeness delay after each item.
    pub delay: DelayRange,
    /// 1 runs the sequential driver.
    pub workers: usize,
    /// Items handed to the worker pool at a time.
    pub batch_size: usize,
    /// Stop an open-ended scan after this many consecutive not-found ids.
    pub stop_after_not_found: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 20,
            cooldown: Duration::from_secs(10),
            delay: DelayRange::new(200, 500),
            workers: 1,
            batch_size: 20,
            stop_after_not_found: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeConfig {
    pub http: HttpConfig,
    pub retry: RetryBudget,
    pub batch: BatchOptions,
}
