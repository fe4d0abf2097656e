//! # warden-registry
//!
//! Read-side boundary to the external agent registry, plus the context
//! resolver that picks which agent handles a given request. The registry
//! itself (creation, maturity promotion) lives outside this core — we only
//! consume a read API.

pub mod directory;
pub mod resolver;

pub use directory::{AgentDirectory, InMemoryDirectory};
pub use resolver::{ContextResolver, ResolutionContext, ResolutionPath};
