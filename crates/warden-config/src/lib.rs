//! # warden-config
//!
//! Configuration for the Warden core (`warden.toml`). Every section has
//! defaults, so a missing or partial file always yields a runnable config.
//! Feature flags (governance switches, emergency bypass) can be flipped
//! through environment variables without touching the file.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::WardenConfig;
