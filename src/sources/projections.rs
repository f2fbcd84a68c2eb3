//! Projection feed adapter.
//!
//! Maps the upstream model's output into canonical `Estimate`s. Accepts
//! either a bare array or `{ "projections": [...] }`, with common field
//! aliases. Malformed rows are skipped rather than failing the feed.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{Estimate, EstimateMap, PropKey};

#[derive(Debug, Deserialize)]
struct ProjectionRow {
    #[serde(alias = "player", alias = "player_id", alias = "entity_id")]
    entity: String,
    #[serde(alias = "stat", alias = "prop_type", alias = "market")]
    prop: String,
    #[serde(alias = "projection", alias = "mean", alias = "estimate")]
    value: f64,
    #[serde(default, alias = "stdev", alias = "sd", alias = "std")]
    std_dev: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

fn rows(raw: &Value) -> Option<&Vec<Value>> {
    match raw {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("projections").and_then(Value::as_array),
        _ => None,
    }
}

/// Normalise a raw projection payload.
///
/// A missing standard deviation is kept as 0.0, which the edge evaluator
/// treats as disqualifying. Confidence is clamped into [0, 1].
pub fn normalize(raw: &Value) -> EstimateMap {
    let mut estimates = EstimateMap::new();
    let Some(items) = rows(raw) else {
        warn!("Unrecognised projection payload");
        return estimates;
    };

    let mut skipped = 0usize;
    for item in items {
        let row: ProjectionRow = match serde_json::from_value(item.clone()) {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Skipping malformed projection row");
                skipped += 1;
                continue;
            }
        };
        if !row.value.is_finite() {
            skipped += 1;
            continue;
        }

        let key = PropKey::new(&row.entity, &row.prop);
        let estimate = Estimate {
            key: key.clone(),
            value: row.value,
            std_dev: row.std_dev.filter(|s| s.is_finite()).unwrap_or(0.0),
            confidence: row.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        };
        estimates.entry(key).or_insert(estimate);
    }

    info!(estimates = estimates.len(), skipped, "Projections normalised");
    estimates
}
