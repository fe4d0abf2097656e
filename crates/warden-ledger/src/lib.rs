//! # warden-ledger
//!
//! Durable audit trail of agent action attempts and their outcomes, plus
//! the job-history and episode tables that asynchronous work writes into.
//! Backed by SQLite in WAL mode; every row transition is crash-safe — a
//! process dying between `begin` and `finish` leaves a `running` row that
//! the reconciliation pass repairs.

pub mod execution;
pub mod store;

pub use execution::{AgentExecution, ExecutionStatus};
pub use store::{Episode, JobHistoryRecord, LedgerStore};
