use thiserror::Error;

/// Why fetching or parsing a single page failed.
///
/// Partial pages are not errors: a page that loads but lacks some fields
/// produces a record with empty fields, which the retry loop deals with.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The site confirmed the resource does not exist. Never retried.
    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The page loaded but an element every valid page has was absent.
    #[error("{url} has no {landmark}")]
    MissingLandmark { url: String, landmark: &'static str },
}

impl ScrapeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScrapeError::NotFound { .. })
    }

    /// Short label for the operator display.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::NotFound { .. } => "not found",
            ScrapeError::Status { .. } => "bad status",
            ScrapeError::Network { .. } => "network",
            ScrapeError::MissingLandmark { .. } => "unexpected page",
        }
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
