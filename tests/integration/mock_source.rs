//! Mock feeds and venues for integration testing.
//!
//! Deterministic `RawFeed` and `ExecutionVenue` implementations that serve
//! fixed payloads, record what they were asked, and can be forced to fail,
//! all in-memory with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use propedge::engine::executor::{ExecutionVenue, VenueAck};
use propedge::engine::orders::Order;
use propedge::sources::RawFeed;
use propedge::types::ExecutionMode;

/// A feed serving a fixed payload.
#[derive(Clone)]
pub struct MockFeed {
    name: String,
    payload: Arc<Mutex<Option<Value>>>,
    /// If set, every fetch returns this error.
    force_error: Arc<Mutex<Option<String>>>,
    fetches: Arc<AtomicUsize>,
}

impl MockFeed {
    pub fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            payload: Arc::new(Mutex::new(Some(payload))),
            force_error: Arc::new(Mutex::new(None)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A feed with nothing to offer.
    pub fn empty(name: &str) -> Self {
        let feed = Self::new(name, Value::Null);
        *feed.payload.lock().unwrap() = None;
        feed
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RawFeed for MockFeed {
    async fn fetch(&self) -> Result<Option<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        Ok(self.payload.lock().unwrap().clone())
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}

/// A venue that records submissions and rejects orders for listed entities.
#[derive(Clone, Default)]
pub struct RecordingVenue {
    reject_entities: Vec<String>,
    submitted: Arc<Mutex<Vec<String>>>,
}

impl RecordingVenue {
    pub fn rejecting(entities: &[&str]) -> Self {
        Self {
            reject_entities: entities.iter().map(|e| e.to_string()).collect(),
            submitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionVenue for RecordingVenue {
    fn name(&self) -> String {
        "recording".to_string()
    }

    async fn submit(&self, order: &Order) -> Result<VenueAck> {
        self.submitted.lock().unwrap().push(order.id.clone());
        if self.reject_entities.contains(&order.key().entity) {
            return Ok(VenueAck::Rejected("entity blocked".into()));
        }
        Ok(match order.mode {
            ExecutionMode::Take => VenueAck::Filled,
            ExecutionMode::Make => VenueAck::Accepted,
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// p1 points 27.8 ± 4.1, p2 rebounds 6.0 ± 1.5, p3 assists (low confidence).
pub fn projections() -> Value {
    json!({
        "projections": [
            { "player": "P1", "stat": "points", "projection": 27.8, "stdev": 4.1, "confidence": 0.71 },
            { "player": "P2", "stat": "rebounds", "projection": 6.0, "stdev": 1.5, "confidence": 0.8 },
            { "player": "P3", "stat": "assists", "projection": 12.0, "stdev": 2.0, "confidence": 0.4 }
        ]
    })
}

pub fn sportsbook() -> Value {
    json!({
        "props": [
            { "player": "p1", "stat": "pts", "line": 26.5,
              "over": { "odds": -115, "limit": 120 }, "under": { "odds": -105, "limit": 120 } },
            { "player": "p2", "stat": "reb", "line": 8.5,
              "over": { "odds": -110, "limit": 200 }, "under": { "odds": -110, "limit": 200 } },
            { "player": "p3", "stat": "ast", "line": 8.5,
              "over": { "odds": -110, "limit": 200 }, "under": { "odds": -110, "limit": 200 } }
        ]
    })
}

pub fn exchange() -> Value {
    json!({
        "markets": [
            { "ticker": "P1-PTS", "subject": "p1", "metric": "points", "strike": 26.5,
              "yes_ask": 48, "yes_ask_size": 300, "no_ask": 55, "no_ask_size": 300 }
        ]
    })
}
