//! # warden-proposal
//!
//! Agent-originated proposals: propose → governance check → dispatch to
//! one of four external executors → finalize → synthesize an episode for
//! downstream learning. The dispatch layer only selects and invokes — the
//! executors themselves live outside this core.

pub mod episode;
pub mod executor;
pub mod mock;
pub mod proposal;
pub mod service;

pub use episode::{extract_topics, format_outcome, synthesize_episode};
pub use executor::{ActionExecutor, ExecutorSet, HttpCallout, UnconfiguredExecutor};
pub use mock::MockExecutor;
pub use proposal::{Proposal, ProposalDraft, ProposalStatus, ProposedAction};
pub use service::{ProposalExecutionHandler, ProposalService};
