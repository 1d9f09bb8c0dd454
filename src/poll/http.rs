//! HTTP transport for the five backend endpoints, on `reqwest`.

use crate::poll::{Backend, FetchError, Source};
use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, HeaderValue};
use std::time::Duration;

const USER_AGENT: &str = concat!("fleetwatch/", env!("CARGO_PKG_VERSION"));

/// Talks to `{base_url}/{stats,agents,tasks,pipelines,logs}`.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, source: Source) -> String {
        format!("{}/{}", self.base_url, source.path())
    }
}

impl Backend for HttpBackend {
    async fn get(&self, source: Source) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(self.url_for(source))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        // A body cut off mid-stream is still "no usable response".
        let body = response.bytes().await.map_err(network_error)?;
        Ok(body.to_vec())
    }
}

fn network_error(err: reqwest::Error) -> FetchError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    FetchError::Network(reason)
}
