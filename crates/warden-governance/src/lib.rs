//! # warden-governance
//!
//! The authorization system. Maps every action type to a complexity level
//! and a minimum maturity tier, evaluates agents against that table, caches
//! decisions with a bounded TTL cache, and feeds action outcomes to the
//! upstream maturity-promotion process.

pub mod action;
pub mod cache;
pub mod service;

pub use action::{ActionType, ExecutorKind};
pub use cache::{CacheStats, GovernanceCache};
pub use service::{
    CallSite, GovernanceDecision, GovernanceService, OutcomeRecorder, OutcomeSink,
};
