use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Identity, Method, RequestBuilder};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum HttpClientError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("Failed to create HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Reusable JSON client bound to a single vendor base URL.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HttpClientError> {
        Self::build(base_url, Client::builder().timeout(timeout))
    }

    /// Same as [`HttpClient::new`], presenting `identity` as the TLS client certificate.
    pub fn with_identity(
        base_url: &str,
        timeout: Duration,
        identity: Identity,
    ) -> Result<Self, HttpClientError> {
        Self::build(base_url, Client::builder().timeout(timeout).identity(identity))
    }

    fn build(base_url: &str, builder: ClientBuilder) -> Result<Self, HttpClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            client: builder.default_headers(headers).build()?,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join `path` onto the base URL. Leading slashes are ignored so the
    /// base path is never replaced. Backslashes are sent literally, the URL
    /// parser would otherwise read them as separators.
    pub fn format_url(&self, path: &str) -> Result<Url, url::ParseError> {
        let path = path.trim_start_matches('/').replace('\\', "%5C");
        self.base_url.join(&path)
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }
}

fn normalize_base_url(base_url: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
