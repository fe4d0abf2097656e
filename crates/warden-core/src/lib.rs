//! # warden-core
//!
//! Core types and error types for the Warden governance core. This crate
//! defines the shared vocabulary used by every other crate in the workspace:
//! agent identity, maturity tiers, and the unified error enum.

pub mod error;
pub mod types;

pub use error::{Result, WardenError};
pub use types::*;
