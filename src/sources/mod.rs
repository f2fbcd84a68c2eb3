//! Market sources and the projection feed.
//!
//! Defines the `RawFeed` and `SourceAdapter` traits and provides
//! implementations for:
//! - Sportsbook: fixed-odds prop lines quoted in American odds
//! - Exchange: prediction-market YES/NO contracts quoted in cents or probabilities
//!
//! Each source is fetched and normalised independently. A source that is
//! unreachable, slow, or returns garbage contributes no quotes; it never
//! fails the run.

pub mod exchange;
pub mod feed;
pub mod projections;
pub mod sportsbook;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{SourceConfig, SourceKind};
use crate::types::QuoteMap;
use exchange::ExchangeAdapter;
use feed::feed_from_config;
use sportsbook::SportsbookAdapter;

/// Fetches one raw payload for a run.
///
/// `Ok(None)` means the source had nothing to offer (absent file, empty
/// body) and is treated the same as an empty payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RawFeed: Send + Sync {
    async fn fetch(&self) -> Result<Option<Value>>;

    /// Human-readable location for logging.
    fn describe(&self) -> String;
}

/// Maps one source's raw payload shape into canonical quotes.
pub trait SourceAdapter: Send + Sync {
    /// Identifier stamped on every quote this adapter produces.
    fn source_id(&self) -> &str;

    /// Normalise a raw payload. Entities missing from the payload are
    /// simply absent; a payload of the wrong shape yields an empty map.
    fn normalize(&self, raw: &Value) -> QuoteMap;
}

/// A configured market source: where to fetch and how to read it.
pub struct MarketSource {
    pub adapter: Box<dyn SourceAdapter>,
    pub feed: Box<dyn RawFeed>,
    pub timeout: Duration,
}

impl MarketSource {
    pub fn new(adapter: Box<dyn SourceAdapter>, feed: Box<dyn RawFeed>, timeout: Duration) -> Self {
        Self { adapter, feed, timeout }
    }

    /// Build a source from its config entry.
    pub fn from_config(cfg: &SourceConfig) -> Result<Self> {
        let adapter: Box<dyn SourceAdapter> = match cfg.kind {
            SourceKind::Sportsbook => Box::new(SportsbookAdapter::new(&cfg.id)),
            SourceKind::Exchange => {
                Box::new(ExchangeAdapter::new(&cfg.id).with_scale(cfg.price_scale))
            }
        };
        let feed = feed_from_config(&cfg.feed)?;
        Ok(Self::new(adapter, feed, Duration::from_secs(cfg.feed.timeout_secs)))
    }

    pub fn id(&self) -> &str {
        self.adapter.source_id()
    }

    /// Fetch and normalise, degrading every failure to an empty map.
    pub async fn quotes(&self) -> QuoteMap {
        let id = self.id();
        let raw = match tokio::time::timeout(self.timeout, self.feed.fetch()).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => {
                warn!(source = id, feed = %self.feed.describe(), "Source returned no payload");
                return QuoteMap::new();
            }
            Ok(Err(e)) => {
                warn!(source = id, error = %e, "Source fetch failed, continuing without");
                return QuoteMap::new();
            }
            Err(_) => {
                warn!(
                    source = id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Source timed out, continuing without"
                );
                return QuoteMap::new();
            }
        };
        self.adapter.normalize(&raw)
    }
}

/// Quotes gathered from one source for one run.
#[derive(Debug, Clone)]
pub struct SourceQuotes {
    pub source: String,
    pub quotes: QuoteMap,
}

/// Fetch all sources concurrently and wait for every one of them.
///
/// Output order follows the input order so downstream iteration is stable.
pub async fn collect_quotes(sources: &[MarketSource]) -> Vec<SourceQuotes> {
    let fetched = join_all(sources.iter().map(|s| async move {
        SourceQuotes {
            source: s.id().to_string(),
            quotes: s.quotes().await,
        }
    }))
    .await;

    for sq in &fetched {
        info!(source = %sq.source, quotes = sq.quotes.len(), "Source normalised");
    }
    fetched
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
