//! Versioned, background-refreshed caches for externally sourced data.
//!
//! The building blocks, leaves first:
//!
//! - [`VersionedCell`]: one derived value, published with build-then-swap
//! - [`ListValue`]: a comparator-ordered collection of child entities
//! - [`CacheStore`]: key→cell map plus the per-cache version counter
//! - [`OnDemandCache`]: fetches on first read, evicts idle keys
//! - [`PollingCache`]: follows a working set supplied by [`ActiveKeys`]
//! - [`Cascade`]: one-way refresh trigger into a [`DependentRefresh`] cache
//! - [`RefreshScheduler`]: one fixed-rate loop per cache
//!
//! Upstream calls from every cache go through a shared [`FetchPool`].

pub mod cascade;
pub mod cell;
pub mod error;
pub mod list;
pub mod on_demand;
pub mod polling;
pub mod pool;
pub mod scheduler;
pub mod source;
pub mod store;

#[cfg(test)]
mod testing;

pub use cascade::{Cascade, DependentRefresh};
pub use cell::{Cacheable, VersionedCell};
pub use error::{FetchError, FetchResult, MalformedDatum};
pub use list::{ListSpec, ListValue};
pub use on_demand::OnDemandCache;
pub use polling::PollingCache;
pub use pool::FetchPool;
pub use scheduler::{RefreshScheduler, SchedulerHandle, refresh_once};
pub use source::{ActiveKeys, DataSource};
pub use store::{Cache, CacheEntry, CacheStore, RefreshReport};
