//! Slip compiler: the day's orders as JSON and as a fixed-width table.
//!
//! Pure formatting. Rows keep input order, struct field order fixes the
//! JSON layout, and every float is rounded to a fixed number of places
//! before it is written, so identical orders always give identical bytes.

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write as _;

use crate::engine::orders::{Order, OrderState};
use crate::types::{Direction, ExecutionMode};

fn round(x: f64, places: i32) -> f64 {
    let m = 10f64.powi(places);
    let r = (x * m).round() / m;
    // Avoid "-0.0" in output.
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlipRow {
    pub order_id: String,
    pub entity: String,
    pub prop: String,
    pub direction: Direction,
    pub estimate: f64,
    pub line: f64,
    pub edge_score: f64,
    pub confidence: f64,
    pub units: u32,
    pub dollars: Decimal,
    /// American odds as text, e.g. "-115" or "+120".
    pub price: String,
    pub decimal_odds: f64,
    pub available_size: f64,
    pub source: String,
    pub mode: ExecutionMode,
    pub state: OrderState,
}

impl SlipRow {
    pub fn from_order(order: &Order) -> Self {
        let c = &order.wager.candidate;
        let side = c.quote_side();
        Self {
            order_id: order.id.clone(),
            entity: c.key.entity.clone(),
            prop: c.key.prop.clone(),
            direction: c.direction,
            estimate: round(c.estimate.value, 2),
            line: round(c.quote.line, 2),
            edge_score: round(c.edge_score, 1),
            confidence: round(c.estimate.confidence, 2),
            units: order.wager.units,
            dollars: order.wager.dollars.round_dp(2),
            price: side.map(|s| s.price.to_string()).unwrap_or_else(|| "-".into()),
            decimal_odds: side.map(|s| round(s.price.decimal, 3)).unwrap_or(0.0),
            available_size: side.map(|s| round(s.size, 2)).unwrap_or(0.0),
            source: c.source.clone(),
            mode: order.mode,
            state: order.state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slip {
    pub date: NaiveDate,
    pub orders: usize,
    pub total_units: u32,
    pub total_dollars: Decimal,
    pub rows: Vec<SlipRow>,
}

/// Both renderings of one slip.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSlip {
    pub json: String,
    pub text: String,
}

pub fn build(date: NaiveDate, orders: &[Order]) -> Slip {
    let rows: Vec<SlipRow> = orders.iter().map(SlipRow::from_order).collect();
    Slip {
        date,
        orders: rows.len(),
        total_units: rows.iter().map(|r| r.units).sum(),
        total_dollars: rows.iter().map(|r| r.dollars).sum(),
        rows,
    }
}

/// Render the machine- and human-readable slips for one date.
pub fn compile(date: NaiveDate, orders: &[Order]) -> Result<CompiledSlip> {
    let slip = build(date, orders);
    let mut json = serde_json::to_string_pretty(&slip)?;
    json.push('\n');
    Ok(CompiledSlip {
        json,
        text: render_text(&slip),
    })
}

fn render_text(slip: &Slip) -> String {
    let mut out = String::new();
    let rule = "-".repeat(122);

    // Writes to a String cannot fail.
    let _ = writeln!(out, "PROPEDGE SLIP  {}", slip.date);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<20} {:<12} {:<5} {:>6} {:>6} {:>6} {:>5} {:>3} {:>9} {:>6} {:>8} {:<12} {:<4} {:<7}",
        "ENTITY", "PROP", "DIR", "EST", "LINE", "EDGE", "CONF", "U", "STAKE", "PRICE", "SIZE", "SOURCE",
        "MODE", "STATE"
    );
    let _ = writeln!(out, "{rule}");
    for r in &slip.rows {
        let _ = writeln!(
            out,
            "{:<20} {:<12} {:<5} {:>6.2} {:>6.2} {:>6.1} {:>5.2} {:>3} {:>9} {:>6} {:>8.0} {:<12} {:<4} {:<7}",
            truncate(&r.entity, 20),
            truncate(&r.prop, 12),
            r.direction.to_string(),
            r.estimate,
            r.line,
            r.edge_score,
            r.confidence,
            r.units,
            format!("${:.2}", r.dollars),
            r.price,
            r.available_size,
            truncate(&r.source, 12),
            r.mode.to_string(),
            r.state.to_string(),
        );
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "orders: {}  units: {}  staked: ${:.2}",
        slip.orders, slip.total_units, slip.total_dollars
    );
    out
}

fn truncate(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
