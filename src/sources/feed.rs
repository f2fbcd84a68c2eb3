//! Raw payload feeds: local JSON files and HTTP endpoints.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::RawFeed;
use crate::config::{AppConfig, FeedConfig};

/// Build the feed a config entry points at. A `path` wins over a URL.
pub fn feed_from_config(cfg: &FeedConfig) -> Result<Box<dyn RawFeed>> {
    if let Some(path) = &cfg.path {
        return Ok(Box::new(FileFeed::new(path)));
    }
    let url = match (&cfg.url, &cfg.url_env) {
        (Some(url), _) => url.clone(),
        (None, Some(env)) => AppConfig::resolve_env(env)?,
        (None, None) => bail!("feed has neither path nor url"),
    };
    Ok(Box::new(HttpFeed::new(url, Duration::from_secs(cfg.timeout_secs))?))
}

// ---------------------------------------------------------------------------
// File feed
// ---------------------------------------------------------------------------

/// Reads a payload already written to disk by an upstream fetcher.
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RawFeed for FileFeed {
    async fn fetch(&self) -> Result<Option<Value>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(path = %self.path.display(), "Feed file missing");
            return Ok(None);
        }
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read feed {}", self.path.display()))?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse feed {}", self.path.display()))?;
        Ok(Some(value))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// HTTP feed
// ---------------------------------------------------------------------------

/// GETs a JSON payload with a bounded timeout.
pub struct HttpFeed {
    http: Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("PROPEDGE/0.1.0")
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl RawFeed for HttpFeed {
    async fn fetch(&self) -> Result<Option<Value>> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?;

        if !resp.status().is_success() {
            bail!("GET {} returned {}", self.url, resp.status());
        }

        let body = resp.text().await.context("Failed to read feed body")?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&body).context("Failed to parse feed body")?;
        Ok(Some(value))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
