use thiserror::Error;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("listing fetch failed with status {status}: {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Build the HTTP client used for every listing request of a run.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_client(config: &Config) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(FetchError::Client)
}

/// Fetch one listing page and return its HTML.
///
/// # Errors
///
/// Any transport failure, timeout or non-success status is an error. Nothing
/// is retried.
pub async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    debug!(url, "Fetching listing page");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(FetchError::Status {
            status: response.status(),
            url: url.to_string(),
        });
    }

    response.text().await.map_err(|source| FetchError::Body {
        url: url.to_string(),
        source,
    })
}
