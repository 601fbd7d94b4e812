use anyhow::Result;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, instrument};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("cinetrivia/0.1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Response> {
        debug!("Making GET request");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            error!("HTTP request failed with status: {}", response.status());
            return Err(anyhow::anyhow!("HTTP request failed: {}", response.status()));
        }

        Ok(response)
    }

    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        let json = response.json::<T>().await?;
        Ok(json)
    }

    // Provider calls need custom headers and their own status handling,
    // so they build requests directly.
    pub fn request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
