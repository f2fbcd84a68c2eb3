//! Prediction-market exchange contracts.
//!
//! Each market is a binary contract on "entity's prop exceeds `strike`".
//! YES maps to the over side and NO to the under side. Ask prices are
//! quoted either as probabilities (0–1) or whole cents (1–99), set by the
//! source's `price_scale` or detected once per payload; the ask size is the
//! number of contracts resting at that price.
//!
//! ```json
//! { "markets": [ { "ticker": "...", "subject": "...", "metric": "points",
//!                  "strike": 26.5, "yes_ask": 53, "yes_ask_size": 200,
//!                  "no_ask": 49, "no_ask_size": 150, "status": "open" } ] }
//! ```

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::SourceAdapter;
use crate::types::{PriceQuote, PriceScale, PropKey, QuoteMap, QuoteSide};

#[derive(Debug, Deserialize)]
struct ExchangeMarket {
    #[serde(default)]
    ticker: String,
    #[serde(alias = "entity", alias = "player")]
    subject: String,
    #[serde(alias = "prop", alias = "stat")]
    metric: String,
    #[serde(alias = "line")]
    strike: f64,
    #[serde(default)]
    yes_ask: Option<f64>,
    #[serde(default)]
    yes_ask_size: f64,
    #[serde(default)]
    no_ask: Option<f64>,
    #[serde(default)]
    no_ask_size: f64,
    #[serde(default = "default_status")]
    status: String,
}

fn default_status() -> String {
    "open".to_string()
}

fn side(scale: PriceScale, ask: Option<f64>, size: f64) -> Option<QuoteSide> {
    ask.and_then(|a| scale.price(a)).map(|price| QuoteSide { price, size })
}

pub struct ExchangeAdapter {
    id: String,
    scale: PriceScale,
}

impl ExchangeAdapter {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            scale: PriceScale::Auto,
        }
    }

    pub fn with_scale(mut self, scale: PriceScale) -> Self {
        self.scale = scale;
        self
    }
}

impl SourceAdapter for ExchangeAdapter {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn normalize(&self, raw: &Value) -> QuoteMap {
        let mut quotes = QuoteMap::new();
        let Some(rows) = raw.get("markets").and_then(Value::as_array) else {
            warn!(source = %self.id, "Unrecognised exchange payload");
            return quotes;
        };

        let markets: Vec<ExchangeMarket> = rows
            .iter()
            .filter_map(|row| match serde_json::from_value::<ExchangeMarket>(row.clone()) {
                Ok(m) => Some(m),
                Err(e) => {
                    debug!(source = %self.id, error = %e, "Skipping malformed market");
                    None
                }
            })
            .filter(|m| m.status.eq_ignore_ascii_case("open") && m.strike.is_finite())
            .collect();

        let scale = self
            .scale
            .resolve(markets.iter().flat_map(|m| [m.yes_ask, m.no_ask]).flatten());
        debug!(source = %self.id, ?scale, markets = markets.len(), "Exchange price scale");

        for market in markets {
            let over = side(scale, market.yes_ask, market.yes_ask_size);
            let under = side(scale, market.no_ask, market.no_ask_size);
            if over.is_none() && under.is_none() {
                debug!(source = %self.id, ticker = %market.ticker, "No asks on either side");
                continue;
            }

            let key = PropKey::new(&market.subject, &market.metric);
            // Several strikes per prop are common; keep the deepest book.
            let depth = over.map_or(0.0, |s| s.size) + under.map_or(0.0, |s| s.size);
            if let Some(existing) = quotes.get(&key) {
                let existing_depth = existing.over.map_or(0.0, |s| s.size)
                    + existing.under.map_or(0.0, |s| s.size);
                if existing_depth >= depth {
                    continue;
                }
            }
            quotes.insert(
                key.clone(),
                PriceQuote {
                    key,
                    source: self.id.clone(),
                    line: market.strike,
                    over,
                    under,
                },
            );
        }
        quotes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_cents() {
        let adapter = ExchangeAdapter::new("exch");
        let raw = json!({
            "markets": [
                { "ticker": "A", "subject": "P1", "metric": "points", "strike": 26.5,
                  "yes_ask": 40, "yes_ask_size": 200, "no_ask": 62, "no_ask_size": 150 }
            ]
        });
        let quotes = adapter.normalize(&raw);
        let q = &quotes[&PropKey::new("p1", "points")];
        assert_eq!(q.source, "exch");
        assert!((q.over.unwrap().price.decimal - 2.5).abs() < 1e-12);
        assert_eq!(q.over.unwrap().size, 200.0);
        assert!((q.under.unwrap().price.implied_probability() - 0.62).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_probabilities() {
        let adapter = ExchangeAdapter::new("exch");
        let raw = json!({
            "markets": [
                { "subject": "P1", "metric": "points", "strike": 26.5,
                  "yes_ask": 0.4, "yes_ask_size": 200, "no_ask": 0.62, "no_ask_size": 150 }
            ]
        });
        let q = &adapter.normalize(&raw)[&PropKey::new("p1", "points")];
        assert!((q.over.unwrap().price.decimal - 2.5).abs() < 1e-12);
        assert!((q.under.unwrap().price.implied_probability() - 0.62).abs() < 1e-12);
    }

    #[test]
    fn test_ask_of_one_dollar_drops_side() {
        let adapter = ExchangeAdapter::new("exch");
        let raw = json!({
            "markets": [
                { "subject": "P1", "metric": "points", "strike": 26.5,
                  "yes_ask": 1.0, "yes_ask_size": 300, "no_ask": 0.02, "no_ask_size": 300 }
            ]
        });
        let q = &adapter.normalize(&raw)[&PropKey::new("p1", "points")];
        assert!(q.over.is_none());
        assert!((q.under.unwrap().price.decimal - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_cents_scale() {
        let adapter = ExchangeAdapter::new("exch").with_scale(PriceScale::Cents);
        let raw = json!({
            "markets": [
                { "subject": "P1", "metric": "points", "strike": 26.5,
                  "yes_ask": 1.0, "yes_ask_size": 10, "no_ask": 0.5, "no_ask_size": 10 }
            ]
        });
        let q = &adapter.normalize(&raw)[&PropKey::new("p1", "points")];
        assert!((q.over.unwrap().price.decimal - 100.0).abs() < 1e-9);
        assert!((q.under.unwrap().price.decimal - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_market_skipped_others_kept() {
        let adapter = ExchangeAdapter::new("exch");
        let raw = json!({
            "markets": [
                { "subject": "P1", "metric": "points", "strike": 26.5,
                  "yes_ask": 48, "yes_ask_size": 300 },
                { "subject": "P2", "metric": "points",
                  "yes_ask": 48, "yes_ask_size": 300 }
            ]
        });
        let quotes = adapter.normalize(&raw);
        assert_eq!(quotes.len(), 1);
        assert!(quotes.contains_key(&PropKey::new("p1", "points")));
    }

    #[test]
    fn test_closed_markets_skipped() {
        let adapter = ExchangeAdapter::new("exch");
        let raw = json!({
            "markets": [
                { "subject": "P1", "metric": "points", "strike": 26.5,
                  "yes_ask": 40, "yes_ask_size": 200, "status": "settled" }
            ]
        });
        assert!(adapter.normalize(&raw).is_empty());
    }

    #[test]
    fn test_deepest_strike_wins() {
        let adapter = ExchangeAdapter::new("exch");
        let raw = json!({
            "markets": [
                { "subject": "P1", "metric": "points", "strike": 24.5,
                  "yes_ask": 60, "yes_ask_size": 10 },
                { "subject": "P1", "metric": "pts", "strike": 26.5,
                  "yes_ask": 45, "yes_ask_size": 300 },
                { "subject": "P1", "metric": "points", "strike": 28.5,
                  "yes_ask": 30, "yes_ask_size": 20 }
            ]
        });
        let quotes = adapter.normalize(&raw);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[&PropKey::new("p1", "points")].line, 26.5);
    }

    #[test]
    fn test_unusable_asks_skipped() {
        let adapter = ExchangeAdapter::new("exch");
        let raw = json!({
            "markets": [
                { "subject": "P1", "metric": "points", "strike": 26.5,
                  "yes_ask": 100, "yes_ask_size": 10, "no_ask": 0, "no_ask_size": 10 }
            ]
        });
        assert!(adapter.normalize(&raw).is_empty());
    }

    #[test]
    fn test_wrong_shape_is_empty() {
        let adapter = ExchangeAdapter::new("exch");
        assert!(adapter.normalize(&json!({ "markets": [ { "foo": 1 } ] })).is_empty());
        assert!(adapter.normalize(&json!({ "markets": "nope" })).is_empty());
    }
}
