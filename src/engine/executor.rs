//! Execution venues.
//!
//! The order book submits each new order to a venue and maps the
//! acknowledgement onto the state machine. Only the paper venue ships;
//! real venues plug in behind the same trait.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::engine::orders::Order;
use crate::types::ExecutionMode;

/// A venue's answer to one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueAck {
    /// Matched in full on arrival.
    Filled,
    /// Resting, awaiting a counterparty.
    Accepted,
    Rejected(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    fn name(&self) -> String;

    async fn submit(&self, order: &Order) -> Result<VenueAck>;
}

/// Dry-run venue. TAKE orders fill against the posted price, MAKE orders
/// rest until a fill signal or expiry.
#[derive(Debug, Default)]
pub struct PaperVenue;

impl PaperVenue {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    fn name(&self) -> String {
        "paper".to_string()
    }

    async fn submit(&self, order: &Order) -> Result<VenueAck> {
        let w = &order.wager;
        let price = order.price().map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        info!(
            order_id = %order.id,
            key = %w.candidate.key,
            direction = %w.candidate.direction,
            mode = %order.mode,
            price = %price,
            units = w.units,
            amount = format!("${:.2}", w.dollars),
            "[PAPER] Submitting order"
        );
        Ok(match order.mode {
            ExecutionMode::Take => VenueAck::Filled,
            ExecutionMode::Make => VenueAck::Accepted,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
