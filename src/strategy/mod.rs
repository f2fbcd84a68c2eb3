//! Strategy engine: edge evaluation, daily cap and Kelly sizing.

pub mod edge;
pub mod kelly;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::engine::ledger::BankrollLedger;
use crate::sources::SourceQuotes;
use crate::types::EstimateMap;
use edge::{Candidate, EdgeConfig, EdgeEvaluator};
use kelly::{KellyConfig, PositionSizer, SizedWager};

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Record of every decision made (or skipped) during a strategy pass,
/// including the candidates that were passed on and why.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DecisionRecord {
    /// Candidate sized into a wager.
    Sized { wager: SizedWager },
    /// Candidate survived the edge filter but Kelly produced no stake.
    KellyRejected { candidate: Candidate },
    /// Candidate ranked below the daily cap and was never sized.
    Capped { candidate: Candidate },
}

/// Output of one strategy pass.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Every surviving candidate, in rank order, before the cap.
    pub candidates: Vec<Candidate>,
    pub wagers: Vec<SizedWager>,
    pub decisions: Vec<DecisionRecord>,
}

impl Selection {
    pub fn kelly_rejected(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d, DecisionRecord::KellyRejected { .. }))
            .count()
    }

    pub fn capped(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d, DecisionRecord::Capped { .. }))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Pipelines edge evaluation → daily cap → Kelly sizing.
pub struct StrategyOrchestrator {
    evaluator: EdgeEvaluator,
    sizer: PositionSizer,
    daily_cap: usize,
    snapshot_per_candidate: bool,
}

impl StrategyOrchestrator {
    pub fn new(
        evaluator: EdgeEvaluator,
        sizer: PositionSizer,
        daily_cap: usize,
        snapshot_per_candidate: bool,
    ) -> Self {
        Self {
            evaluator,
            sizer,
            daily_cap,
            snapshot_per_candidate,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            EdgeEvaluator::new(EdgeConfig::from(&config.thresholds)),
            PositionSizer::new(KellyConfig::from(&config.sizing)),
            config.thresholds.daily_cap,
            config.sizing.snapshot_per_candidate,
        )
    }

    /// Run the strategy for one set of run inputs.
    ///
    /// Steps:
    /// 1. Evaluate every (entity, prop, source) triple; survivors come back
    ///    ranked by |edge score| then confidence.
    /// 2. Keep the top `daily_cap`; the rest are logged as capped.
    /// 3. Size in rank order against the ledger. The bankroll is read once
    ///    for the whole pass unless `snapshot_per_candidate` is set.
    ///
    /// Sizing only reads the ledger; it never mutates it.
    pub fn select_wagers(
        &self,
        estimates: &EstimateMap,
        sources: &[SourceQuotes],
        ledger: &BankrollLedger,
    ) -> Selection {
        let mut decisions = Vec::new();

        // Step 1 – edge evaluation
        let candidates = self.evaluator.evaluate(estimates, sources);
        info!(
            estimates = estimates.len(),
            sources = sources.len(),
            candidates = candidates.len(),
            "Edge evaluation complete"
        );

        // Step 2 – daily cap
        let (kept, capped) = candidates.split_at(self.daily_cap.min(candidates.len()));
        if !capped.is_empty() {
            warn!(
                cap = self.daily_cap,
                dropped = capped.len(),
                "Daily cap reached, lower-ranked candidates skipped"
            );
        }

        // Step 3 – sizing
        let mut snapshot = ledger.read();
        debug!(%snapshot, "Sizing against ledger snapshot");
        let mut wagers = Vec::new();
        for candidate in kept {
            if self.snapshot_per_candidate {
                snapshot = ledger.read();
            }
            match self.sizer.size(candidate, &snapshot) {
                Some(wager) => {
                    info!(
                        key = %candidate.key,
                        source = %candidate.source,
                        direction = %candidate.direction,
                        mode = %candidate.mode,
                        edge = format!("{:.1}", candidate.edge_score),
                        units = wager.units,
                        dollars = %wager.dollars,
                        "Wager sized"
                    );
                    decisions.push(DecisionRecord::Sized { wager: wager.clone() });
                    wagers.push(wager);
                }
                None => {
                    debug!(
                        key = %candidate.key,
                        source = %candidate.source,
                        "Kelly rejected (no positive stake)"
                    );
                    decisions.push(DecisionRecord::KellyRejected {
                        candidate: candidate.clone(),
                    });
                }
            }
        }
        decisions.extend(
            capped
                .iter()
                .cloned()
                .map(|candidate| DecisionRecord::Capped { candidate }),
        );

        info!(
            wagers = wagers.len(),
            candidates = candidates.len(),
            "Strategy pass complete"
        );

        Selection {
            candidates,
            wagers,
            decisions,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
