//! Fixed-odds sportsbook prop lines.
//!
//! Payload shape (fields we read; everything else is ignored):
//!
//! ```json
//! { "props": [ { "player": "...", "stat": "points", "line": 26.5,
//!                "over":  { "odds": -115, "limit": 120 },
//!                "under": { "odds": -105, "limit": 120 } } ] }
//! ```
//!
//! Prices are American odds; `limit` is the maximum stake the book accepts.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::SourceAdapter;
use crate::types::{Price, PriceQuote, PropKey, QuoteMap, QuoteSide};

#[derive(Debug, Deserialize)]
struct BookProp {
    #[serde(alias = "player_id", alias = "entity")]
    player: String,
    #[serde(alias = "market", alias = "prop")]
    stat: String,
    line: f64,
    #[serde(default)]
    over: Option<BookSide>,
    #[serde(default)]
    under: Option<BookSide>,
    /// Suspended props are skipped.
    #[serde(default)]
    suspended: bool,
}

#[derive(Debug, Deserialize)]
struct BookSide {
    odds: f64,
    #[serde(default, alias = "max_stake")]
    limit: f64,
}

impl BookSide {
    fn to_quote_side(&self) -> Option<QuoteSide> {
        Price::from_american(self.odds).map(|price| QuoteSide { price, size: self.limit })
    }
}

pub struct SportsbookAdapter {
    id: String,
}

impl SportsbookAdapter {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl SourceAdapter for SportsbookAdapter {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn normalize(&self, raw: &Value) -> QuoteMap {
        let mut quotes = QuoteMap::new();
        let Some(rows) = raw.get("props").and_then(Value::as_array) else {
            warn!(source = %self.id, "Unrecognised sportsbook payload");
            return quotes;
        };

        for row in rows {
            let prop: BookProp = match serde_json::from_value(row.clone()) {
                Ok(p) => p,
                Err(e) => {
                    debug!(source = %self.id, error = %e, "Skipping malformed prop");
                    continue;
                }
            };
            if prop.suspended || !prop.line.is_finite() {
                continue;
            }
            let over = prop.over.as_ref().and_then(BookSide::to_quote_side);
            let under = prop.under.as_ref().and_then(BookSide::to_quote_side);
            if over.is_none() && under.is_none() {
                debug!(source = %self.id, player = %prop.player, "Prop has no valid prices");
                continue;
            }

            let key = PropKey::new(&prop.player, &prop.stat);
            if quotes.contains_key(&key) {
                debug!(source = %self.id, key = %key, "Duplicate prop, keeping first");
                continue;
            }
            quotes.insert(
                key.clone(),
                PriceQuote {
                    key,
                    source: self.id.clone(),
                    line: prop.line,
                    over,
                    under,
                },
            );
        }
        quotes
    }
}
