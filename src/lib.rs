//! Two-stage reservation payment and refund engine.
//!
//! Deposit/final payment orchestration against an external gateway, refund
//! eligibility on the platform's civil clock, business-rule adjustments per
//! cancellation type, an append-only refund audit log, and a bounded-retry
//! no-show refund queue drained by background workers.

pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod payments;
pub mod services;
pub mod workers;
