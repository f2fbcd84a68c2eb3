//! Run orchestration.
//!
//! One `run` per date: projections and sources are fetched concurrently,
//! then evaluation → sizing → order placement → slip, persisting each
//! stage's output under the date's artifact directory. `reconcile_orders`
//! and `settle_orders` are separate, repeatable passes over a date's orders.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::executor::{ExecutionVenue, PaperVenue};
use crate::engine::ledger::BankrollLedger;
use crate::engine::orders::{FillSignal, Order, OrderBook, Transition};
use crate::engine::slip;
use crate::sources::feed::feed_from_config;
use crate::sources::{collect_quotes, projections, MarketSource, RawFeed, SourceQuotes};
use crate::storage::{self, RunStore};
use crate::strategy::StrategyOrchestrator;
use crate::types::{EngineError, EstimateMap, Outcome, PriceQuote};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub date: NaiveDate,
    pub estimates: usize,
    /// (source id, quote count), in configured order.
    pub quotes: Vec<(String, usize)>,
    pub candidates: usize,
    pub wagers: usize,
    /// Candidates Kelly declined to stake.
    pub kelly_rejected: usize,
    /// Candidates ranked below the daily cap.
    pub capped: usize,
    pub orders: usize,
    pub filled: usize,
    pub open: usize,
    pub pending: usize,
    pub committed: Decimal,
    pub bankroll: Decimal,
    pub unit_value: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub date: NaiveDate,
    pub fills: usize,
    pub expired: Vec<Transition>,
    pub orders: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettleReport {
    pub date: NaiveDate,
    pub settled: usize,
    pub skipped: usize,
    pub pnl: Decimal,
    pub bankroll: Decimal,
}

/// External grading for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSignal {
    pub order_id: String,
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    config: AppConfig,
    projections: Box<dyn RawFeed>,
    sources: Vec<MarketSource>,
    strategy: StrategyOrchestrator,
    ledger: Arc<BankrollLedger>,
    venue: Box<dyn ExecutionVenue>,
    store: RunStore,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        projections: Box<dyn RawFeed>,
        sources: Vec<MarketSource>,
        ledger: Arc<BankrollLedger>,
        venue: Box<dyn ExecutionVenue>,
    ) -> Self {
        Self {
            strategy: StrategyOrchestrator::from_config(&config),
            store: RunStore::new(&config.engine.artifact_root),
            config,
            projections,
            sources,
            ledger,
            venue,
        }
    }

    /// Wire feeds and sources from config, with the paper venue.
    pub fn from_config(config: AppConfig, ledger: Arc<BankrollLedger>) -> Result<Self> {
        let projections = feed_from_config(&config.projections).context("Projection feed")?;
        let sources = config
            .enabled_sources()
            .map(|cfg| {
                MarketSource::from_config(cfg).with_context(|| format!("Source {}", cfg.id))
            })
            .collect::<Result<Vec<_>>>()?;
        for skipped in config.sources.iter().filter(|s| !s.enabled) {
            info!(source = %skipped.id, "Source disabled in config");
        }
        Ok(Self::new(config, projections, sources, ledger, Box::new(PaperVenue::new())))
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    async fn load_estimates(&self) -> Result<EstimateMap> {
        let timeout = Duration::from_secs(self.config.projections.timeout_secs);
        let raw = tokio::time::timeout(timeout, self.projections.fetch())
            .await
            .with_context(|| format!("Projection feed timed out: {}", self.projections.describe()))?
            .with_context(|| format!("Projection feed failed: {}", self.projections.describe()))?;
        let estimates = raw.as_ref().map(projections::normalize).unwrap_or_default();
        if estimates.is_empty() {
            return Err(EngineError::NoEstimates.into());
        }
        Ok(estimates)
    }

    /// Execute one full run for `date`.
    pub async fn run(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<RunReport> {
        if self.store.exists(date, storage::ORDERS_FILE) {
            bail!("Orders already exist for {date}; use reconcile or settle");
        }
        info!(%date, sources = self.sources.len(), "Starting run");

        // 1. Inputs: projections and every source, concurrently.
        let (estimates, quotes) = tokio::join!(self.load_estimates(), collect_quotes(&self.sources));
        let estimates = estimates?;
        info!(count = estimates.len(), "Estimates loaded");
        for sq in &quotes {
            self.store
                .save(date, &RunStore::quotes_file(&sq.source), &sorted_quotes(sq))?;
        }

        // 2. Evaluate, cap and size.
        let selection = self.strategy.select_wagers(&estimates, &quotes, &self.ledger);
        if selection.candidates.is_empty() {
            warn!(%date, "No candidates cleared the edge filters; nothing to bet today");
        }
        self.store.save(date, storage::CANDIDATES_FILE, &selection.candidates)?;
        self.store.save(date, storage::WAGERS_FILE, &selection.wagers)?;
        self.store.save(date, storage::DECISIONS_FILE, &selection.decisions)?;

        // 3. Orders.
        let book = OrderBook::new(Vec::new());
        let placed = book
            .place(
                &selection.wagers,
                self.venue.as_ref(),
                self.config.orders.time_in_force_secs,
                now,
            )
            .await;
        let orders = book.into_orders();
        self.store.save(date, storage::ORDERS_FILE, &orders)?;

        // 4. Slip and ledger snapshot.
        write_slip(&self.store, date, &orders)?;
        self.store.save(date, storage::LEDGER_FILE, &self.ledger.export())?;

        let snapshot = self.ledger.read();
        Ok(RunReport {
            date,
            estimates: estimates.len(),
            quotes: quotes.iter().map(|sq| (sq.source.clone(), sq.quotes.len())).collect(),
            candidates: selection.candidates.len(),
            wagers: selection.wagers.len(),
            kelly_rejected: selection.kelly_rejected(),
            capped: selection.capped(),
            orders: orders.len(),
            filled: placed.filled,
            open: placed.opened,
            pending: placed.pending,
            committed: orders.iter().map(|o| o.wager.dollars).sum(),
            bankroll: snapshot.bankroll,
            unit_value: snapshot.unit_value,
        })
    }
}

fn sorted_quotes(sq: &SourceQuotes) -> Vec<&PriceQuote> {
    let mut quotes: Vec<&PriceQuote> = sq.quotes.values().collect();
    quotes.sort_by(|a, b| a.key.cmp(&b.key));
    quotes
}

fn write_slip(store: &RunStore, date: NaiveDate, orders: &[Order]) -> Result<()> {
    let compiled = slip::compile(date, orders)?;
    store.save_text(date, storage::SLIP_JSON_FILE, &compiled.json)?;
    store.save_text(date, storage::SLIP_TEXT_FILE, &compiled.text)?;
    Ok(())
}

fn load_orders(store: &RunStore, date: NaiveDate) -> Result<Vec<Order>> {
    match store.load::<Vec<Order>>(date, storage::ORDERS_FILE)? {
        Some(orders) => Ok(orders),
        None => bail!("No orders recorded for {date}"),
    }
}

// ---------------------------------------------------------------------------
// Reconcile & settle
// ---------------------------------------------------------------------------

/// Apply fill signals, expire stale `OPEN` orders, and rewrite the date's
/// orders and slip.
pub async fn reconcile_orders(
    store: &RunStore,
    date: NaiveDate,
    fills: &[FillSignal],
    now: DateTime<Utc>,
) -> Result<ReconcileReport> {
    let book = OrderBook::new(load_orders(store, date)?);
    let filled = book.apply_fills(fills, now).await;
    let expired = book.reconcile(now).await;
    let orders = book.into_orders();

    store.save(date, storage::ORDERS_FILE, &orders)?;
    write_slip(store, date, &orders)?;

    info!(%date, fills = filled, expired = expired.len(), "Reconciliation complete");
    Ok(ReconcileReport {
        date,
        fills: filled,
        expired,
        orders: orders.len(),
    })
}

/// Apply graded outcomes for a date's filled orders to the ledger.
///
/// Unknown, unfilled or already-settled orders are skipped with a warning;
/// each accepted outcome is persisted before the next is applied.
pub fn settle_orders(
    store: &RunStore,
    ledger: &BankrollLedger,
    date: NaiveDate,
    outcomes: &[OutcomeSignal],
    fee: Decimal,
) -> Result<SettleReport> {
    let orders = load_orders(store, date)?;
    let mut settled = 0;
    let mut skipped = 0;
    let mut pnl = Decimal::ZERO;

    for signal in outcomes {
        let Some(order) = orders.iter().find(|o| o.id == signal.order_id) else {
            warn!(error = %EngineError::OrderNotFound(signal.order_id.clone()), "Outcome skipped");
            skipped += 1;
            continue;
        };
        let payout = order.settlement_payout(signal.outcome, fee);
        match ledger.settle(order, signal.outcome, payout) {
            Ok(record) => {
                settled += 1;
                pnl += record.payout;
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Outcome skipped");
                skipped += 1;
            }
        }
    }

    store.save(date, storage::LEDGER_FILE, &ledger.export())?;
    let bankroll = ledger.read().bankroll;
    info!(%date, settled, skipped, pnl = %pnl, bankroll = %bankroll, "Settlement complete");
    Ok(SettleReport {
        date,
        settled,
        skipped,
        pnl,
        bankroll,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
