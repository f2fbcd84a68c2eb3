//! Edge evaluation.
//!
//! Compares projection estimates to quoted lines from every source and
//! keeps the (entity, prop, source) triples whose divergence, measured in
//! standard deviations, clears the configured thresholds.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::config::ThresholdConfig;
use crate::sources::SourceQuotes;
use crate::types::{Direction, Estimate, EstimateMap, ExecutionMode, PriceQuote, PropKey, QuoteSide};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Edge gates. Scores are in percent-of-one-standard-deviation units.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub min_edge: f64,
    pub make_edge: f64,
    pub take_edge: f64,
    pub min_confidence: f64,
    pub min_size: f64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            min_edge: 15.0,
            make_edge: 15.0,
            take_edge: 35.0,
            min_confidence: 0.6,
            min_size: 50.0,
        }
    }
}

impl From<&ThresholdConfig> for EdgeConfig {
    fn from(t: &ThresholdConfig) -> Self {
        Self {
            min_edge: t.min_edge,
            make_edge: t.make_edge,
            take_edge: t.take_edge,
            min_confidence: t.min_confidence,
            min_size: t.min_size,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A scored, directional opportunity for one (entity, prop, source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub key: PropKey,
    pub source: String,
    pub direction: Direction,
    /// `estimate.value - quote.line`.
    pub raw_edge: f64,
    /// `raw_edge / std_dev * 100`.
    pub edge_score: f64,
    pub mode: ExecutionMode,
    pub estimate: Estimate,
    pub quote: PriceQuote,
}

impl Candidate {
    /// The quoted side this candidate bets into.
    pub fn quote_side(&self) -> Option<&QuoteSide> {
        self.quote.side(self.direction)
    }
}

/// Ordering used for daily caps: strongest edge first, then most confident.
/// Key and source break remaining ties so output is fully deterministic.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.edge_score
        .abs()
        .partial_cmp(&a.edge_score.abs())
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.estimate
                .confidence
                .partial_cmp(&a.estimate.confidence)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.key.cmp(&b.key))
        .then_with(|| a.source.cmp(&b.source))
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct EdgeEvaluator {
    config: EdgeConfig,
}

impl EdgeEvaluator {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Score every (entity, prop, source) triple where both an estimate and
    /// a quote exist, returning survivors in rank order. Multiple sources
    /// for the same prop yield independent candidates.
    pub fn evaluate(&self, estimates: &EstimateMap, sources: &[SourceQuotes]) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for sq in sources {
            for (key, quote) in &sq.quotes {
                let Some(estimate) = estimates.get(key) else {
                    continue;
                };
                if let Some(c) = self.evaluate_pair(estimate, quote) {
                    candidates.push(c);
                }
            }
        }

        candidates.sort_by(rank);
        candidates
    }

    /// Score a single estimate/quote pair.
    pub fn evaluate_pair(&self, estimate: &Estimate, quote: &PriceQuote) -> Option<Candidate> {
        // Zero, negative or NaN spread cannot be normalised.
        if !(estimate.std_dev > 0.0) {
            debug!(key = %estimate.key, source = %quote.source, "No usable std_dev");
            return None;
        }

        let raw_edge = estimate.value - quote.line;
        // Exactly zero falls to UNDER.
        let direction = if raw_edge > 0.0 { Direction::Over } else { Direction::Under };
        let edge_score = (raw_edge / estimate.std_dev) * 100.0;
        let abs_score = edge_score.abs();

        if abs_score < self.config.min_edge {
            return None;
        }

        if estimate.confidence < self.config.min_confidence {
            debug!(
                key = %estimate.key,
                confidence = estimate.confidence,
                "Confidence below minimum"
            );
            return None;
        }

        let available = quote.side(direction).map_or(0.0, |s| s.size);
        if available < self.config.min_size {
            debug!(
                key = %estimate.key,
                source = %quote.source,
                direction = %direction,
                available,
                "Insufficient size on chosen side"
            );
            return None;
        }

        let mode = if abs_score >= self.config.take_edge {
            ExecutionMode::Take
        } else if abs_score >= self.config.make_edge {
            ExecutionMode::Make
        } else {
            return None;
        };

        debug!(
            key = %estimate.key,
            source = %quote.source,
            direction = %direction,
            mode = %mode,
            raw_edge = format!("{raw_edge:.2}"),
            edge_score = format!("{edge_score:.1}"),
            "Edge detected"
        );

        Some(Candidate {
            key: estimate.key.clone(),
            source: quote.source.clone(),
            direction,
            raw_edge,
            edge_score,
            mode,
            estimate: estimate.clone(),
            quote: quote.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
