//! # Chargeguard - EV Charge Supervisor
//!
//! A small, periodically scheduled job that watches a MyEnergi Zappi
//! charger and stops the charge when a session energy threshold is
//! reached, or - optionally - when the vehicle's battery level reported by
//! the Smartcar API crosses 80%. Status lines are relayed to a webhook.
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Environment-sourced configuration and validation
//! - `logging`: Structured logging and tracing
//! - `error`: Error types shared across modules
//! - `token`: Smartcar OAuth token lifecycle (store, refresh, manager)
//! - `auth`: One-time interactive authorization-code flow
//! - `zappi`: Charger status probing and the charging-decision engine
//! - `smartcar`: Vehicle API client and battery gate
//! - `notify`: Best-effort webhook notifications
//! - `supervisor`: Per-run orchestration

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod smartcar;
pub mod supervisor;
pub mod token;
pub mod zappi;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChargeGuardError, Result};
pub use supervisor::{ChargeSupervisor, RunSummary};
