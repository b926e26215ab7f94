//! Artifact resolution, caching and aggregation.
//!
//! The [`Depot`] engine answers two questions for a repository:
//! "give me this artifact" ([`Depot::resolve`]) and "what matches this
//! query" ([`Depot::search`]). Each repository is served by one of three
//! resolvers:
//!
//! - **hosted**: local storage only; artifacts arrive through [`Depot::deploy`]
//! - **proxy**: a caching proxy of one upstream registry; misses are fetched
//!   once, no matter how many callers ask concurrently
//! - **group**: an ordered list of member repositories; resolution falls back
//!   through the members, search merges and de-duplicates their results
//!
//! Group members are resolved through the engine on every request, so nested
//! groups and shared members work without any global state. A
//! [`ResolutionPath`] threaded through each call turns configuration cycles
//! into a per-request [`ResolutionError::ConfigurationCycle`].

pub mod depot;
pub mod error;
pub mod group;
pub mod hosted;
pub mod path;
pub mod provider;
pub mod proxy;
pub mod search;
pub mod single_flight;

#[cfg(test)]
mod testing;

// Re-exports for convenience.
pub use depot::{Depot, DepotOptions, Resolver};
pub use error::{ResolutionError, Result};
pub use group::{GroupResolver, Members};
pub use hosted::HostedResolver;
pub use path::ResolutionPath;
pub use provider::{RepositoryProvider, StaticRepositories};
pub use proxy::ProxyResolver;
pub use search::dedup_by_coordinate;
pub use single_flight::{FlightAborted, SingleFlight};
