//! PROPEDGE: projection-vs-market prop wagering pipeline
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod sources;
pub mod strategy;
pub mod engine;
pub mod storage;
