//! DevilScout cache server.
//!
//! Loads configuration, builds the [`CacheContext`] and keeps every cache
//! fresh on its own schedule until shut down.

pub mod active;
pub mod config;
pub mod context;
pub mod observability;

pub use active::StaticActiveEvents;
pub use config::AppConfig;
pub use context::{CacheContext, ContextError};
