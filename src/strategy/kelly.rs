//! Kelly criterion position sizing.
//!
//! Converts a scored candidate into a whole-unit wager using fractional
//! Kelly against a bankroll snapshot. The win probability comes from the
//! estimate's normal distribution; the payout comes from the posted price.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::edge::Candidate;
use crate::config::SizingConfig;
use crate::engine::ledger::LedgerSnapshot;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly). Lower = more conservative.
    pub multiplier: f64,
    pub min_units: u32,
    pub max_units: u32,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: 0.25,
            min_units: 1,
            max_units: 5,
        }
    }
}

impl From<&SizingConfig> for KellyConfig {
    fn from(s: &SizingConfig) -> Self {
        Self {
            multiplier: s.kelly_fraction,
            min_units: s.min_units,
            max_units: s.max_units,
        }
    }
}

// ---------------------------------------------------------------------------
// Probability helpers
// ---------------------------------------------------------------------------

/// Standard normal CDF via the Abramowitz–Stegun 7.1.26 erf approximation
/// (absolute error below 1.5e-7).
pub fn normal_cdf(x: f64) -> f64 {
    let z = x / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + 0.327_591_1 * z.abs());
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-z * z).exp();
    let erf = if z >= 0.0 { erf } else { -erf };
    0.5 * (1.0 + erf)
}

/// Probability the realised value lands on the candidate's side of the line.
pub fn win_probability(candidate: &Candidate) -> f64 {
    normal_cdf(candidate.raw_edge.abs() / candidate.estimate.std_dev)
}

/// Full-Kelly fraction `(b p - q) / b`. Non-positive means no bet.
pub fn full_kelly(win_prob: f64, net_payout: f64) -> f64 {
    if net_payout <= 0.0 {
        return 0.0;
    }
    (net_payout * win_prob - (1.0 - win_prob)) / net_payout
}

// ---------------------------------------------------------------------------
// Sizer
// ---------------------------------------------------------------------------

/// A candidate plus the capital committed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizedWager {
    pub candidate: Candidate,
    pub win_probability: f64,
    /// Raw Kelly fraction before damping.
    pub full_kelly: f64,
    /// Damped fraction of bankroll.
    pub kelly_fraction: f64,
    pub units: u32,
    pub unit_value: Decimal,
    pub dollars: Decimal,
}

pub struct PositionSizer {
    config: KellyConfig,
}

impl PositionSizer {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Size one candidate. Returns `None` when Kelly says no bet or the
    /// clamped unit count is zero.
    pub fn size(&self, candidate: &Candidate, snapshot: &LedgerSnapshot) -> Option<SizedWager> {
        if snapshot.unit_value <= Decimal::ZERO {
            return None;
        }
        let side = candidate.quote_side()?;

        let p = win_probability(candidate);
        let kelly = full_kelly(p, side.price.net_payout());
        if kelly <= 0.0 {
            debug!(
                key = %candidate.key,
                source = %candidate.source,
                win_prob = format!("{:.3}", p),
                price = %side.price,
                "Negative Kelly, no bet"
            );
            return None;
        }

        let fraction = kelly * self.config.multiplier;
        let bankroll = snapshot.bankroll.to_f64().unwrap_or(0.0);
        let unit_value = snapshot.unit_value.to_f64().unwrap_or(0.0);
        let raw_units = (fraction * bankroll / unit_value).floor();
        let units = (raw_units as i64).clamp(self.config.min_units as i64, self.config.max_units as i64);
        if units <= 0 {
            debug!(key = %candidate.key, raw_units, "Sized to zero units");
            return None;
        }
        let units = units as u32;
        let dollars = snapshot.unit_value * Decimal::from(units);

        debug!(
            key = %candidate.key,
            source = %candidate.source,
            win_prob = format!("{:.3}", p),
            raw_kelly = format!("{:.2}%", kelly * 100.0),
            fractional = format!("{:.2}%", fraction * 100.0),
            units,
            dollars = %dollars,
            "Wager sized"
        );

        Some(SizedWager {
            candidate: candidate.clone(),
            win_probability: p,
            full_kelly: kelly,
            kelly_fraction: fraction,
            units,
            unit_value: snapshot.unit_value,
            dollars,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
