use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{redirect, Client};

use crate::error::{FetchError, Result};
use crate::urls::parse_http_url;

const MAX_REDIRECTS: usize = 10;

/// Network seam for everything that downloads pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Download a page body. Non-2xx responses are errors.
    async fn fetch_page(&self, url: &str) -> std::result::Result<String, FetchError>;

    /// HTTP status of a URL after redirects, without reading the body.
    async fn check_status(&self, url: &str) -> std::result::Result<u16, FetchError>;
}

pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        if let Ok(agent) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for ContentFetcher {
    async fn fetch_page(&self, url: &str) -> std::result::Result<String, FetchError> {
        parse_http_url(url)?;

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            tracing::debug!("Failed to fetch {}: {}", url, response.status());
            return Err(FetchError::Network(format!("HTTP {}", response.status())));
        }

        Ok(response.text().await?)
    }

    async fn check_status(&self, url: &str) -> std::result::Result<u16, FetchError> {
        parse_http_url(url)?;
        let response = self.client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}
