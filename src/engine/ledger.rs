//! Bankroll ledger: durable capital record and settlement history.
//!
//! The ledger is an explicit handle, not a global. Reads take a shared
//! lock; settlements take the write lock, persist the next state, and only
//! then swap it in, so a failed write leaves the bankroll untouched and
//! concurrent settlements queue behind each other.
//!
//! A file-backed ledger also holds an exclusive advisory lock on
//! `<ledger>.lock` for every read-modify-write, and re-reads the file under
//! that lock, so settlements from separate processes serialise too.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::engine::orders::{Order, OrderState};
use crate::storage;
use crate::types::{Direction, EngineError, Outcome, PropKey};

/// Units per bankroll by convention.
pub const UNITS_PER_BANKROLL: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Immutable record of one applied settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub order_id: String,
    pub key: PropKey,
    pub source: String,
    pub direction: Direction,
    pub outcome: Outcome,
    pub stake: Decimal,
    /// Signed profit/loss applied to the bankroll.
    pub payout: Decimal,
    pub bankroll_after: Decimal,
    pub settled_at: DateTime<Utc>,
}

/// Persistent ledger state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub starting_bankroll: Decimal,
    pub bankroll: Decimal,
    pub created_at: DateTime<Utc>,
    pub history: Vec<SettlementRecord>,
}

impl LedgerState {
    /// Genesis state. Only ever used when no ledger exists yet.
    pub fn genesis(starting_bankroll: Decimal) -> Self {
        Self {
            starting_bankroll,
            bankroll: starting_bankroll,
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    pub fn total_pnl(&self) -> Decimal {
        self.history.iter().map(|r| r.payout).sum()
    }

    fn is_settled(&self, order_id: &str) -> bool {
        self.history.iter().any(|r| r.order_id == order_id)
    }
}

/// Point-in-time view used for sizing. Unit value is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub bankroll: Decimal,
    pub unit_value: Decimal,
    pub settlements: usize,
}

impl LedgerSnapshot {
    pub fn from_bankroll(bankroll: Decimal, settlements: usize) -> Self {
        Self {
            bankroll,
            unit_value: bankroll / UNITS_PER_BANKROLL,
            settlements,
        }
    }
}

impl fmt::Display for LedgerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bankroll=${:.2} unit=${:.2} settlements={}",
            self.bankroll, self.unit_value, self.settlements
        )
    }
}

/// Full ledger export written alongside each run's artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerExport {
    pub bankroll: Decimal,
    pub unit_value: Decimal,
    pub starting_bankroll: Decimal,
    pub total_pnl: Decimal,
    pub history: Vec<SettlementRecord>,
}

// ---------------------------------------------------------------------------
// Cross-process lock
// ---------------------------------------------------------------------------

/// Exclusive advisory lock beside the ledger file. Released on drop.
struct LedgerFileLock {
    file: File,
}

impl LedgerFileLock {
    fn acquire(ledger: &Path) -> Result<Self> {
        let mut name = ledger.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create ledger directory: {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open ledger lock: {}", path.display()))?;
        file.lock()
            .with_context(|| format!("Failed to lock ledger: {}", path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for LedgerFileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

// ---------------------------------------------------------------------------
// Ledger handle
// ---------------------------------------------------------------------------

pub struct BankrollLedger {
    path: Option<PathBuf>,
    state: RwLock<LedgerState>,
}

impl BankrollLedger {
    /// Open the ledger at `path`, creating it with `starting_bankroll` if it
    /// does not exist. An existing ledger ignores `starting_bankroll`.
    pub fn open(path: impl AsRef<Path>, starting_bankroll: Decimal) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let _lock = LedgerFileLock::acquire(&path)?;
        let state = match storage::read_json::<LedgerState>(&path)? {
            Some(s) => {
                if s.starting_bankroll != starting_bankroll {
                    debug!(
                        configured = %starting_bankroll,
                        genesis = %s.starting_bankroll,
                        "Configured starting bankroll ignored for existing ledger"
                    );
                }
                info!(
                    path = %path.display(),
                    bankroll = %s.bankroll,
                    settlements = s.history.len(),
                    "Ledger loaded"
                );
                s
            }
            None => {
                let s = LedgerState::genesis(starting_bankroll);
                storage::write_json(&path, &s).context("Failed to write ledger genesis")?;
                info!(path = %path.display(), bankroll = %s.bankroll, "Ledger created");
                s
            }
        };
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// A ledger that is never written to disk.
    pub fn in_memory(starting_bankroll: Decimal) -> Self {
        Self {
            path: None,
            state: RwLock::new(LedgerState::genesis(starting_bankroll)),
        }
    }

    /// Current bankroll and derived unit value.
    pub fn read(&self) -> LedgerSnapshot {
        // State is only ever replaced whole, so a poisoned lock still holds
        // a consistent value.
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        LedgerSnapshot::from_bankroll(state.bankroll, state.history.len())
    }

    pub fn history(&self) -> Vec<SettlementRecord> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.history.clone()
    }

    pub fn export(&self) -> LedgerExport {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        LedgerExport {
            bankroll: state.bankroll,
            unit_value: state.bankroll / UNITS_PER_BANKROLL,
            starting_bankroll: state.starting_bankroll,
            total_pnl: state.total_pnl(),
            history: state.history.clone(),
        }
    }

    /// Lock the ledger file and pull in settlements other handles wrote
    /// since this one last looked. In-memory ledgers have nothing to do.
    fn sync_from_disk(&self, state: &mut LedgerState) -> Result<Option<LedgerFileLock>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let lock = LedgerFileLock::acquire(path)?;
        if let Some(disk) = storage::read_json::<LedgerState>(path)? {
            if disk.history.len() != state.history.len() {
                debug!(
                    local = state.history.len(),
                    disk = disk.history.len(),
                    "Ledger refreshed from disk"
                );
            }
            *state = disk;
        }
        Ok(Some(lock))
    }

    /// Apply a realised profit/loss for a filled order.
    ///
    /// Each order settles at most once. The bankroll never goes negative.
    /// On any error nothing is written.
    pub fn settle(
        &self,
        order: &Order,
        outcome: Outcome,
        payout: Decimal,
    ) -> Result<SettlementRecord, EngineError> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let _lock = self
            .sync_from_disk(&mut guard)
            .map_err(|e| EngineError::Storage(format!("{e:#}")))?;

        if order.state != OrderState::Filled {
            return Err(EngineError::NotSettleable {
                order_id: order.id.clone(),
                state: order.state.to_string(),
            });
        }
        if guard.is_settled(&order.id) {
            return Err(EngineError::AlreadySettled(order.id.clone()));
        }

        let bankroll_after = guard.bankroll + payout;
        if bankroll_after < Decimal::ZERO {
            return Err(EngineError::LedgerOverdraft {
                bankroll: guard.bankroll,
                payout,
            });
        }

        let record = SettlementRecord {
            order_id: order.id.clone(),
            key: order.wager.candidate.key.clone(),
            source: order.wager.candidate.source.clone(),
            direction: order.wager.candidate.direction,
            outcome,
            stake: order.wager.dollars,
            payout,
            bankroll_after,
            settled_at: Utc::now(),
        };

        let mut next = guard.clone();
        next.bankroll = bankroll_after;
        next.history.push(record.clone());

        if let Some(path) = &self.path {
            if let Err(e) = storage::write_json(path, &next) {
                warn!(order_id = %order.id, error = %e, "Ledger write failed, settlement not applied");
                return Err(EngineError::Storage(e.to_string()));
            }
        }
        *guard = next;

        info!(
            order_id = %order.id,
            outcome = %outcome,
            payout = %payout,
            bankroll = %bankroll_after,
            "Settlement applied"
        );
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
