// src/simulation/http_task.rs
//! Task executor that fetches one URL per unit id.

use super::task::{TaskExecutor, TaskOutcome};
use crate::error::{ArbiterError, Result, RetryPolicy};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpTaskExecutor {
    client: Client,
    url_template: String,
    retry: RetryPolicy,
}

impl HttpTaskExecutor {
    /// `url_template` must contain `{id}`.
    pub fn new(url_template: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        if !url_template.contains("{id}") {
            return Err(ArbiterError::InvalidInput(format!(
                "task URL template '{}' has no {{id}} placeholder",
                url_template
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArbiterError::ConfigurationMissing(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url_template: url_template.to_string(),
            retry,
        })
    }

    pub fn url_for(&self, unit_id: u64) -> Result<Url> {
        let raw = self.url_template.replace("{id}", &unit_id.to_string());
        Url::parse(&raw).map_err(|e| ArbiterError::InvalidInput(format!("task URL '{}': {}", raw, e)))
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        classify_status(status, url)?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(ArbiterError::DataNotFound(format!("{} returned an empty body", url)));
        }
        Ok(body)
    }
}

fn classify_status(status: StatusCode, url: &Url) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Err(ArbiterError::DataNotFound(format!("{} -> {}", url, status)))
    } else if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        Err(ArbiterError::TransientConnectivity(format!("{} -> {}", url, status)))
    } else {
        Err(ArbiterError::NonRecoverable(format!("{} -> {}", url, status)))
    }
}

#[async_trait]
impl TaskExecutor for HttpTaskExecutor {
    fn name(&self) -> &str {
        "http"
    }

    async fn run(&self, unit_id: u64) -> TaskOutcome {
        let url = match self.url_for(unit_id) {
            Ok(url) => url,
            Err(e) => return TaskOutcome::FatalFailure(e.to_string()),
        };
        match self.retry.execute(|| self.fetch(&url)).await {
            Ok(body) => {
                debug!("unit {}: {} bytes from {}", unit_id, body.len(), url);
                TaskOutcome::Success(body)
            }
            Err(e) => e.into(),
        }
    }
}
