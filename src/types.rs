//! Shared types for PROPEDGE.
//!
//! These types form the data model used across all modules. Sources,
//! strategy and engine code depend on them without depending on each other.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Alias table for prop-type names as they appear across feeds.
const PROP_ALIASES: &[(&str, &str)] = &[
    ("pts", "points"),
    ("point", "points"),
    ("reb", "rebounds"),
    ("rebs", "rebounds"),
    ("ast", "assists"),
    ("asts", "assists"),
    ("pra", "points_rebounds_assists"),
    ("pts+reb+ast", "points_rebounds_assists"),
    ("3pm", "threes"),
    ("3ptm", "threes"),
    ("threes_made", "threes"),
    ("stl", "steals"),
    ("blk", "blocks"),
    ("sog", "shots_on_goal"),
    ("ks", "strikeouts"),
    ("so", "strikeouts"),
];

/// Canonical (entity, prop) key shared by projections and quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropKey {
    pub entity: String,
    pub prop: String,
}

impl PropKey {
    /// Build a key, canonicalising both halves so that every feed keys the
    /// same entity/prop identically.
    pub fn new(entity: &str, prop: &str) -> Self {
        Self {
            entity: entity.trim().to_lowercase(),
            prop: canonical_prop(prop),
        }
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.prop)
    }
}

/// Lowercase, collapse separators, and resolve known aliases.
pub fn canonical_prop(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();
    PROP_ALIASES
        .iter()
        .find(|(alias, _)| *alias == cleaned)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(cleaned)
}

// ---------------------------------------------------------------------------
// Estimate
// ---------------------------------------------------------------------------

/// One statistical projection for one entity/prop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub key: PropKey,
    /// Point estimate of the measured quantity.
    pub value: f64,
    /// Standard deviation of the estimate. Must be > 0 to be usable.
    pub std_dev: f64,
    /// Model confidence (0–1).
    pub confidence: f64,
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} est={:.2} sd={:.2} conf={:.0}%",
            self.key,
            self.value,
            self.std_dev,
            self.confidence * 100.0,
        )
    }
}

pub type EstimateMap = HashMap<PropKey, Estimate>;

// ---------------------------------------------------------------------------
// Prices & quotes
// ---------------------------------------------------------------------------

/// A canonical price, stored as decimal odds (total return per unit staked).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub decimal: f64,
}

impl Price {
    /// From American odds (-115, +120). Values in (-100, 100) are invalid.
    pub fn from_american(american: f64) -> Option<Self> {
        if american >= 100.0 {
            Some(Self { decimal: 1.0 + american / 100.0 })
        } else if american <= -100.0 {
            Some(Self { decimal: 1.0 + 100.0 / american.abs() })
        } else {
            None
        }
    }

    /// From an implied probability, strictly inside (0, 1).
    pub fn from_probability(p: f64) -> Option<Self> {
        if p > 0.0 && p < 1.0 {
            Some(Self { decimal: 1.0 / p })
        } else {
            None
        }
    }

    /// Break-even probability implied by the price.
    pub fn implied_probability(&self) -> f64 {
        1.0 / self.decimal
    }

    /// Net winnings per unit staked (the Kelly `b`).
    pub fn net_payout(&self) -> f64 {
        self.decimal - 1.0
    }

    /// American odds, rounded to the nearest whole number.
    pub fn american(&self) -> i64 {
        if self.decimal >= 2.0 {
            ((self.decimal - 1.0) * 100.0).round() as i64
        } else {
            (-100.0 / (self.decimal - 1.0)).round() as i64
        }
    }
}

/// Unit an exchange quotes its asks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceScale {
    /// Decided once per payload: cents if any ask exceeds 1, else probability.
    #[default]
    Auto,
    Probability,
    Cents,
}

impl PriceScale {
    /// Fix an `Auto` scale from every ask in one payload.
    pub fn resolve(self, asks: impl IntoIterator<Item = f64>) -> Self {
        match self {
            PriceScale::Auto if asks.into_iter().any(|a| a > 1.0) => PriceScale::Cents,
            PriceScale::Auto => PriceScale::Probability,
            fixed => fixed,
        }
    }

    /// Convert one ask. A price of 1.0 on the probability scale (or 100
    /// cents) pays nothing and is rejected.
    pub fn price(self, raw: f64) -> Option<Price> {
        match self {
            PriceScale::Cents => Price::from_probability(raw / 100.0),
            PriceScale::Probability | PriceScale::Auto => Price::from_probability(raw),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.american();
        if a > 0 {
            write!(f, "+{a}")
        } else {
            write!(f, "{a}")
        }
    }
}

/// One side of a quoted market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteSide {
    pub price: Price,
    /// Size available at this price.
    pub size: f64,
}

/// One market quotation for an entity/prop from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub key: PropKey,
    pub source: String,
    /// Threshold value the over/under is measured against.
    pub line: f64,
    pub over: Option<QuoteSide>,
    pub under: Option<QuoteSide>,
}

impl PriceQuote {
    /// The quoted side matching a bet direction.
    pub fn side(&self, direction: Direction) -> Option<&QuoteSide> {
        match direction {
            Direction::Over => self.over.as_ref(),
            Direction::Under => self.under.as_ref(),
        }
    }
}

impl fmt::Display for PriceQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_side = |s: &Option<QuoteSide>| match s {
            Some(q) => format!("{} x{:.0}", q.price, q.size),
            None => "-".to_string(),
        };
        write!(
            f,
            "[{}] {} line={} o:{} u:{}",
            self.source,
            self.key,
            self.line,
            fmt_side(&self.over),
            fmt_side(&self.under),
        )
    }
}

pub type QuoteMap = HashMap<PropKey, PriceQuote>;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Bet direction relative to the quoted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Over,
    Under,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Over => Direction::Under,
            Direction::Under => Direction::Over,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Over => write!(f, "OVER"),
            Direction::Under => write!(f, "UNDER"),
        }
    }
}

/// Execution mode: TAKE crosses immediately, MAKE rests awaiting a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    Take,
    Make,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Take => write!(f, "TAKE"),
            ExecutionMode::Make => write!(f, "MAKE"),
        }
    }
}

/// Graded result of a settled wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Push,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "WIN"),
            Outcome::Loss => write!(f, "LOSS"),
            Outcome::Push => write!(f, "PUSH"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PROPEDGE.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Invalid transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: String,
        from: String,
        to: String,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No estimates available for this run")]
    NoEstimates,

    #[error("Settlement would overdraw bankroll: have ${bankroll}, payout ${payout}")]
    LedgerOverdraft {
        bankroll: rust_decimal::Decimal,
        payout: rust_decimal::Decimal,
    },

    #[error("Order already settled: {0}")]
    AlreadySettled(String),

    #[error("Order {order_id} cannot be settled in state {state}")]
    NotSettleable { order_id: String, state: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
