//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Source URLs and keys may be referenced by env-var name and resolved at
//! runtime. `validate` must pass before any run starts.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::storage::RunStore;
use crate::types::{EngineError, PriceScale};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub bankroll: BankrollConfig,
    #[serde(default)]
    pub orders: OrderConfig,
    pub projections: FeedConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Root directory for per-date run artifacts.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            artifact_root: default_artifact_root(),
        }
    }
}

/// Edge, confidence and liquidity gates.
#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdConfig {
    /// Minimum |edge_score| to survive filtering.
    #[serde(default = "default_min_edge")]
    pub min_edge: f64,
    /// Minimum |edge_score| for a resting (MAKE) order.
    #[serde(default = "default_min_edge")]
    pub make_edge: f64,
    /// Minimum |edge_score| for an immediate (TAKE) order.
    #[serde(default = "default_take_edge")]
    pub take_edge: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Minimum available size on the chosen side.
    #[serde(default = "default_min_size")]
    pub min_size: f64,
    /// Maximum candidates sized per run.
    #[serde(default = "default_daily_cap")]
    pub daily_cap: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_edge: default_min_edge(),
            make_edge: default_min_edge(),
            take_edge: default_take_edge(),
            min_confidence: default_min_confidence(),
            min_size: default_min_size(),
            daily_cap: default_daily_cap(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SizingConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    #[serde(default = "default_min_units")]
    pub min_units: u32,
    #[serde(default = "default_max_units")]
    pub max_units: u32,
    /// Re-read the ledger before every candidate instead of once per run.
    #[serde(default)]
    pub snapshot_per_candidate: bool,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: default_kelly_fraction(),
            min_units: default_min_units(),
            max_units: default_max_units(),
            snapshot_per_candidate: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BankrollConfig {
    /// Applied once at ledger genesis, never again.
    #[serde(default = "default_starting_bankroll")]
    pub starting_bankroll: Decimal,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
    /// Flat fee charged per settled order.
    #[serde(default)]
    pub fee_per_order: Decimal,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            starting_bankroll: default_starting_bankroll(),
            ledger_path: default_ledger_path(),
            fee_per_order: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrderConfig {
    #[serde(default = "default_time_in_force")]
    pub time_in_force_secs: i64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            time_in_force_secs: default_time_in_force(),
        }
    }
}

/// Where a raw payload comes from: a local file or an HTTP endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Env var holding the URL, resolved when `url` is absent.
    #[serde(default)]
    pub url_env: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Sportsbook,
    Exchange,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Exchange ask unit: `auto`, `probability` or `cents`.
    #[serde(default)]
    pub price_scale: PriceScale,
    #[serde(flatten)]
    pub feed: FeedConfig,
}

fn default_name() -> String {
    "PROPEDGE".to_string()
}
fn default_artifact_root() -> String {
    "runs".to_string()
}
fn default_min_edge() -> f64 {
    15.0
}
fn default_take_edge() -> f64 {
    35.0
}
fn default_min_confidence() -> f64 {
    0.6
}
fn default_min_size() -> f64 {
    50.0
}
fn default_daily_cap() -> usize {
    25
}
fn default_kelly_fraction() -> f64 {
    0.25
}
fn default_min_units() -> u32 {
    1
}
fn default_max_units() -> u32 {
    5
}
fn default_starting_bankroll() -> Decimal {
    dec!(5000)
}
fn default_ledger_path() -> String {
    "ledger.json".to_string()
}
fn default_time_in_force() -> i64 {
    3600
}
fn default_timeout() -> u64 {
    15
}
fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Reject inconsistent parameters. A run must not start if this fails.
    pub fn validate(&self) -> Result<(), EngineError> {
        let t = &self.thresholds;
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if t.make_edge > t.take_edge {
            return invalid(format!(
                "make_edge ({}) must not exceed take_edge ({})",
                t.make_edge, t.take_edge
            ));
        }
        if t.min_edge < 0.0 || t.make_edge < 0.0 {
            return invalid("edge thresholds must be non-negative".into());
        }
        if !(0.0..=1.0).contains(&t.min_confidence) {
            return invalid(format!("min_confidence {} outside [0, 1]", t.min_confidence));
        }
        if t.min_size < 0.0 {
            return invalid("min_size must be non-negative".into());
        }

        let s = &self.sizing;
        if !(s.kelly_fraction > 0.0 && s.kelly_fraction <= 1.0) {
            return invalid(format!("kelly_fraction {} outside (0, 1]", s.kelly_fraction));
        }
        if s.min_units > s.max_units {
            return invalid(format!(
                "min_units ({}) exceeds max_units ({})",
                s.min_units, s.max_units
            ));
        }

        if self.bankroll.starting_bankroll <= Decimal::ZERO {
            return invalid("starting_bankroll must be positive".into());
        }
        if self.bankroll.fee_per_order < Decimal::ZERO {
            return invalid("fee_per_order must be non-negative".into());
        }
        if self.orders.time_in_force_secs <= 0 {
            return invalid("time_in_force_secs must be positive".into());
        }

        if !self.projections.has_location() {
            return invalid("projections need a path, url or url_env".into());
        }
        // Source ids name the per-run quote files, so they must stay distinct
        // after file-name sanitising.
        let mut files: HashMap<String, &str> = HashMap::new();
        for source in &self.sources {
            if !source.feed.has_location() {
                return invalid(format!("source {} needs a path, url or url_env", source.id));
            }
            if let Some(other) = files.insert(RunStore::quotes_file(&source.id), &source.id) {
                return invalid(format!(
                    "source ids {:?} and {:?} collide on the same quotes file",
                    other, source.id
                ));
            }
        }

        Ok(())
    }

    /// Sources switched on in config.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

impl FeedConfig {
    fn has_location(&self) -> bool {
        self.path.is_some() || self.url.is_some() || self.url_env.is_some()
    }
}
