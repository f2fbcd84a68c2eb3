//! Core engine: ledger, order lifecycle, venues, slip and the run pipeline.

pub mod executor;
pub mod ledger;
pub mod orders;
pub mod pipeline;
pub mod slip;
