// 🌐 Recorder client - station side of POST /swipe

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::capture::{ForwardOutcome, SwipeForwarder};
use crate::recorder::RecordRequest;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

pub struct RecorderClient {
    client: reqwest::blocking::Client,
    swipe_url: String,
}

impl RecorderClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(RecorderClient {
            client,
            swipe_url: swipe_url(server_url),
        })
    }

    pub fn swipe_url(&self) -> &str {
        &self.swipe_url
    }
}

fn swipe_url(server_url: &str) -> String {
    format!("{}/swipe", server_url.trim_end_matches('/'))
}

impl SwipeForwarder for RecorderClient {
    fn forward(&self, request: &RecordRequest) -> Result<ForwardOutcome> {
        let response = self
            .client
            .post(&self.swipe_url)
            .json(request)
            .send()
            .with_context(|| format!("POST {} failed", self.swipe_url))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(ForwardOutcome::UnknownIdentity),
            status if status.is_success() => {
                let body: MessageBody = response
                    .json()
                    .context("Recorder returned an unreadable body")?;
                Ok(ForwardOutcome::Recorded(body.message))
            }
            status => {
                let body = response.text().unwrap_or_default();
                anyhow::bail!("recorder answered {}: {}", status, body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swipe_url_joins_path() {
        assert_eq!(swipe_url("http://10.0.0.2:8000"), "http://10.0.0.2:8000/swipe");
        assert_eq!(swipe_url("http://10.0.0.2:8000/"), "http://10.0.0.2:8000/swipe");
    }

    #[test]
    fn test_unreachable_recorder_is_an_error() {
        // Port 9 (discard) is not listening on loopback in test environments
        let client = RecorderClient::new("http://127.0.0.1:9").unwrap();
        let result = client.forward(&RecordRequest::new("1234567"));
        assert!(result.is_err());
    }
}
