//! Order lifecycle: state machine, reconciliation and the order book.
//!
//! ```text
//!   NEW ──accept──▶ OPEN ──fill──▶ FILLED
//!    │                │
//!    └───match────────┼──────────▶ FILLED
//!                     └──tif────▶ EXPIRED
//! ```
//!
//! FILLED and EXPIRED are terminal. Any other requested transition is
//! rejected with `EngineError::InvalidTransition` and the order is left
//! exactly as it was. `NEW -> FILLED` only happens when the venue matches
//! an order on arrival; external fill signals apply to `OPEN` orders only.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::executor::{ExecutionVenue, VenueAck};
use crate::strategy::kelly::SizedWager;
use crate::types::{EngineError, ExecutionMode, Outcome, Price, PropKey};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    New,
    Open,
    Filled,
    Expired,
}

/// Every valid (from, to) pair.
pub const TRANSITIONS: &[(OrderState, OrderState)] = &[
    (OrderState::New, OrderState::Open),
    (OrderState::New, OrderState::Filled),
    (OrderState::Open, OrderState::Filled),
    (OrderState::Open, OrderState::Expired),
];

impl OrderState {
    pub const ALL: [OrderState; 4] = [
        OrderState::New,
        OrderState::Open,
        OrderState::Filled,
        OrderState::Expired,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Expired)
    }

    pub fn can_transition_to(&self, to: OrderState) -> bool {
        TRANSITIONS.contains(&(*self, to))
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::New => "NEW",
            OrderState::Open => "OPEN",
            OrderState::Filled => "FILLED",
            OrderState::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// One applied state change, kept on the order for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: OrderState,
    pub to: OrderState,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// The unit of execution: one sized wager sent to one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub wager: SizedWager,
    pub mode: ExecutionMode,
    pub time_in_force_secs: i64,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<StateChange>,
}

impl Order {
    /// A fresh `NEW` order for a sized wager.
    pub fn from_wager(wager: SizedWager, time_in_force_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            mode: wager.candidate.mode,
            wager,
            time_in_force_secs,
            state: OrderState::New,
            created_at: now,
            history: Vec::new(),
        }
    }

    pub fn key(&self) -> &PropKey {
        &self.wager.candidate.key
    }

    /// The posted price on the order's side.
    pub fn price(&self) -> Option<Price> {
        self.wager.candidate.quote_side().map(|s| s.price)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// An `OPEN` order whose age is strictly past its time-in-force.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.state == OrderState::Open && self.age(now) > Duration::seconds(self.time_in_force_secs)
    }

    /// Move to `to` if the table allows it; otherwise leave the order as is.
    pub fn transition(&mut self, to: OrderState, at: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.state.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                order_id: self.id.clone(),
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.history.push(StateChange {
            from: self.state,
            to,
            at,
        });
        self.state = to;
        Ok(())
    }

    /// Signed profit/loss for a graded outcome at the posted price, less
    /// the flat fee.
    pub fn settlement_payout(&self, outcome: Outcome, fee: Decimal) -> Decimal {
        let stake = self.wager.dollars;
        match outcome {
            Outcome::Win => {
                let b = self
                    .price()
                    .and_then(|p| Decimal::from_f64(p.net_payout()))
                    .unwrap_or(Decimal::ZERO);
                (stake * b).round_dp(2) - fee
            }
            Outcome::Loss => -stake - fee,
            Outcome::Push => -fee,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// A transition the reconciler wants applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub order_id: String,
    pub from: OrderState,
    pub to: OrderState,
}

/// External notice that a resting order was matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillSignal {
    pub order_id: String,
}

/// Pure reconciliation: which `OPEN` orders have outlived their
/// time-in-force at `now`. Callable from any scheduler.
pub fn reconcile(orders: &[Order], now: DateTime<Utc>) -> Vec<Transition> {
    orders
        .iter()
        .filter(|o| o.is_stale(now))
        .map(|o| Transition {
            order_id: o.id.clone(),
            from: o.state,
            to: OrderState::Expired,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// Counts from placing one batch of wagers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementSummary {
    pub created: usize,
    pub filled: usize,
    pub opened: usize,
    /// Rejected or errored submissions, still `NEW`.
    pub pending: usize,
}

/// Owns the run's orders. Placement, fills and reconciliation all hold the
/// book lock, so creation and reconciliation of the same order never overlap.
pub struct OrderBook {
    orders: Mutex<Vec<Order>>,
}

impl OrderBook {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders: Mutex::new(orders),
        }
    }

    /// Create one order per wager and submit each to the venue.
    pub async fn place(
        &self,
        wagers: &[SizedWager],
        venue: &dyn ExecutionVenue,
        time_in_force_secs: i64,
        now: DateTime<Utc>,
    ) -> PlacementSummary {
        let mut orders = self.orders.lock().await;
        let mut summary = PlacementSummary::default();

        for wager in wagers {
            let mut order = Order::from_wager(wager.clone(), time_in_force_secs, now);
            summary.created += 1;

            let target = match venue.submit(&order).await {
                Ok(VenueAck::Filled) => Some(OrderState::Filled),
                Ok(VenueAck::Accepted) => Some(OrderState::Open),
                Ok(VenueAck::Rejected(reason)) => {
                    warn!(order_id = %order.id, key = %order.key(), reason = %reason, "Venue rejected order");
                    None
                }
                Err(e) => {
                    warn!(order_id = %order.id, key = %order.key(), error = %e, "Order submission failed");
                    None
                }
            };

            match target.map(|to| order.transition(to, now)) {
                Some(Ok(())) if order.state == OrderState::Filled => summary.filled += 1,
                Some(Ok(())) => summary.opened += 1,
                Some(Err(e)) => {
                    warn!(error = %e, "Venue acknowledgement ignored");
                    summary.pending += 1;
                }
                None => summary.pending += 1,
            }

            debug!(
                order_id = %order.id,
                key = %order.key(),
                mode = %order.mode,
                state = %order.state,
                "Order placed"
            );
            orders.push(order);
        }

        info!(
            venue = %venue.name(),
            created = summary.created,
            filled = summary.filled,
            opened = summary.opened,
            pending = summary.pending,
            "Placement complete"
        );
        summary
    }

    /// Apply a single transition by id.
    pub async fn transition(
        &self,
        order_id: &str,
        to: OrderState,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;
        order.transition(to, at)
    }

    /// Apply external fill signals to resting orders. Unknown ids and
    /// orders that are not `OPEN` are logged and skipped. Returns the number
    /// of orders filled.
    pub async fn apply_fills(&self, fills: &[FillSignal], at: DateTime<Utc>) -> usize {
        let mut orders = self.orders.lock().await;
        let mut filled = 0;
        for fill in fills {
            let result = match orders.iter_mut().find(|o| o.id == fill.order_id) {
                None => Err(EngineError::OrderNotFound(fill.order_id.clone())),
                Some(order) if order.state != OrderState::Open => {
                    Err(EngineError::InvalidTransition {
                        order_id: order.id.clone(),
                        from: order.state.to_string(),
                        to: OrderState::Filled.to_string(),
                    })
                }
                Some(order) => order.transition(OrderState::Filled, at),
            };
            match result {
                Ok(()) => {
                    info!(order_id = %fill.order_id, "Fill applied");
                    filled += 1;
                }
                Err(e) => warn!(error = %e, "Fill signal skipped"),
            }
        }
        filled
    }

    /// Expire stale `OPEN` orders. Idempotent: a second pass at the same
    /// `now` finds nothing to do.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Vec<Transition> {
        let mut orders = self.orders.lock().await;
        let transitions = reconcile(&orders, now);

        let mut applied = Vec::with_capacity(transitions.len());
        for t in transitions {
            let Some(order) = orders.iter_mut().find(|o| o.id == t.order_id) else {
                continue;
            };
            match order.transition(t.to, now) {
                Ok(()) => {
                    info!(order_id = %t.order_id, key = %order.key(), "Order expired");
                    applied.push(t);
                }
                Err(e) => warn!(error = %e, "Reconciliation transition rejected"),
            }
        }
        applied
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.orders.lock().await.clone()
    }

    pub fn into_orders(self) -> Vec<Order> {
        self.orders.into_inner()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
